//! Listener name patterns.
//!
//! A listener name may contain one `*`.  Everything before the first `*` is a
//! literal prefix that the candidate must start with; anything after it is
//! ignored.  Without a `*` the candidate must equal the name exactly.  There
//! is no glob support: `?`, `[`, and further `*` characters after the first
//! are never interpreted.

/// The wildcard marker.
pub const WILDCARD: char = '*';

/// A parsed listener name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamePattern {
    /// No wildcard: exact equality.
    Exact(String),
    /// Wildcard present: the literal text before it.
    Prefix(String),
}

impl NamePattern {
    /// Parses a listener name.
    pub fn parse(name: &str) -> Self {
        match name.find(WILDCARD) {
            Some(idx) => NamePattern::Prefix(name[..idx].to_string()),
            None => NamePattern::Exact(name.to_string()),
        }
    }

    /// Returns `true` if `candidate` is selected by this pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            NamePattern::Exact(name) => candidate == name,
            NamePattern::Prefix(prefix) => candidate.starts_with(prefix.as_str()),
        }
    }

    /// `true` for a pattern that contains the wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, NamePattern::Prefix(_))
    }
}

impl From<&str> for NamePattern {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}
