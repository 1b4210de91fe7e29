//! Verified identity claims.
//!
//! [`Claims`] is the JSON object returned by the identity provider's userinfo
//! endpoint for a validated bearer token. Emporio never interprets the token
//! itself; it only carries the provider's answer through the request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims returned by the identity provider for one validated token.
///
/// Claims are read-only once attached to a request.
///
/// # Example
///
/// ```
/// use emporio_core::Claims;
/// use serde_json::json;
///
/// let claims = Claims::try_from(json!({
///     "sub": "8f14e45f",
///     "preferred_username": "alice",
///     "scope": "openid profile"
/// }))
/// .unwrap();
///
/// assert_eq!(claims.subject(), Some("8f14e45f"));
/// assert_eq!(claims.scopes(), vec!["openid", "profile"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Wraps an already-parsed JSON object.
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Returns the raw value of a claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a claim as a string, if it is one.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// The `sub` claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// The `preferred_username` claim.
    #[must_use]
    pub fn preferred_username(&self) -> Option<&str> {
        self.get_str("preferred_username")
    }

    /// The `email` claim.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }

    /// Space-separated `scope` claim split into individual scopes.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.get_str("scope")
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Returns a string identifier suitable for logging.
    ///
    /// Never includes tokens or other secrets.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self.subject() {
            Some(sub) => format!("user:{sub}"),
            None => "unknown".to_string(),
        }
    }

    /// Number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the provider returned an empty object.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all claims.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl TryFrom<Value> for Claims {
    type Error = Value;

    /// Accepts only JSON objects; any other value is handed back unchanged.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}
