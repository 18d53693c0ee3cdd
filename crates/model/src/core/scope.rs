use serde::{Deserialize, Serialize};
use std::fmt;

/// Filter narrowing a harvest to a single item identifier.
///
/// `Global` and `Key(String::new())` are different scopes: `Global` only ever
/// equals `Global`, so a checkpoint written for an unfiltered harvest can never
/// be picked up by a harvest scoped to the empty key, or the other way around.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    Global,
    Key(String),
}

impl Scope {
    pub fn key(key: impl Into<String>) -> Self {
        Scope::Key(key.into())
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Key(key) => Some(key),
        }
    }
}

impl From<Option<String>> for Scope {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(key) => Scope::Key(key),
            None => Scope::Global,
        }
    }
}

impl From<Scope> for Option<String> {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Global => None,
            Scope::Key(key) => Some(key),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("<global>"),
            Scope::Key(key) => write!(f, "{key:?}"),
        }
    }
}
