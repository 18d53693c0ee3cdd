use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Opaque continuation token handed out by the provider for the next page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(Arc<str>);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Cursor {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens can be kilobytes long; keep log lines readable.
        let token = self.as_str();
        match token.char_indices().nth(24) {
            Some((idx, _)) => write!(f, "{}…", &token[..idx]),
            None => f.write_str(token),
        }
    }
}
