use std::str::FromStr;

/// Credential sent to the ingestion endpoint
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Static bearer token via the `Authorization` header
    Bearer(String),
    /// Don't use any authentication
    None,
}

impl Auth {
    /// Build from an optional token, treating a blank token as no credential
    ///
    /// A token given with its `Bearer ` scheme prefix is accepted as well.
    pub fn new(token: Option<String>) -> Self {
        match token.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => {
                let t = t.strip_prefix("Bearer ").unwrap_or(t).trim();
                Self::Bearer(t.to_string())
            }
            _ => Self::None,
        }
    }

    /// Value for the `Authorization` header, if any
    pub fn header_value(&self) -> Option<String> {
        match self {
            Self::Bearer(token) => Some(format!("Bearer {}", token)),
            Self::None => None,
        }
    }
}

impl std::fmt::Display for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => write!(f, "Bearer"),
            Self::None => write!(f, "None"),
        }
    }
}

// Keep tokens out of debug output
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => write!(f, "Bearer(***)"),
            Self::None => write!(f, "None"),
        }
    }
}

impl FromStr for Auth {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(Some(s.to_string())))
    }
}
