// File: miraibot-common/src/models/credential.rs

use std::fmt;
use serde::{Deserialize, Serialize};

/// One cookie of an authenticated session, in the "appstate" layout the
/// platform tooling exports.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl SessionCookie {
    pub fn new(key: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_cookie_path(),
            host_only: None,
            creation: None,
            last_accessed: None,
        }
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("key", &self.key)
            .field("value", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Serialized proof of an authenticated session (the "appstate").
///
/// Stored on disk as a bare JSON array of cookies. `Debug` never prints
/// cookie values, so the credential can be passed to `tracing` macros.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct SessionCredential {
    cookies: Vec<SessionCookie>,
}

impl SessionCredential {
    pub fn new(cookies: Vec<SessionCookie>) -> Self {
        Self { cookies }
    }

    pub fn cookies(&self) -> &[SessionCookie] {
        &self.cookies
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn cookie(&self, key: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }

    /// Account id the session acts as. A page/secondary profile (`i_user`)
    /// takes precedence over the primary login (`c_user`).
    pub fn identity_id(&self) -> Option<&str> {
        self.cookie("i_user")
            .or_else(|| self.cookie("c_user"))
            .filter(|v| !v.is_empty())
    }

    /// Value for an HTTP `Cookie` request header.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.key, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Insert or replace cookies by key, keeping the original order for
    /// the ones that already existed.
    pub fn merge(&mut self, updates: Vec<SessionCookie>) {
        for update in updates {
            match self.cookies.iter_mut().find(|c| c.key == update.key) {
                Some(existing) => *existing = update,
                None => self.cookies.push(update),
            }
        }
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("identity_id", &self.identity_id())
            .field("cookies", &self.cookies.len())
            .finish()
    }
}

/// Account identifier and secret, read from the environment right before an
/// interactive login.
#[derive(Clone)]
pub struct AccountSecrets {
    pub identifier: String,
    pub secret: String,
}

impl AccountSecrets {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for AccountSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSecrets")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionCredential {
        SessionCredential::new(vec![
            SessionCookie::new("c_user", "100012345", "facebook.com"),
            SessionCookie::new("xs", "secret-xs", "facebook.com"),
        ])
    }

    #[test]
    fn identity_prefers_i_user() {
        let mut cred = sample();
        assert_eq!(cred.identity_id(), Some("100012345"));
        cred.merge(vec![SessionCookie::new("i_user", "200099", "facebook.com")]);
        assert_eq!(cred.identity_id(), Some("200099"));
    }

    #[test]
    fn debug_output_is_redacted() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("secret-xs"));
        assert!(rendered.contains("100012345"));
    }

    #[test]
    fn merge_replaces_existing_keys_in_place() {
        let mut cred = sample();
        cred.merge(vec![
            SessionCookie::new("xs", "rotated", "facebook.com"),
            SessionCookie::new("fr", "new", "facebook.com"),
        ]);
        let keys: Vec<_> = cred.cookies().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["c_user", "xs", "fr"]);
        assert_eq!(cred.cookie("xs"), Some("rotated"));
    }

    #[test]
    fn appstate_json_layout() {
        let raw = r#"[{"key":"c_user","value":"42","domain":"facebook.com","path":"/","hostOnly":false,"creation":"2024-01-01T00:00:00.000Z","lastAccessed":"2024-01-02T00:00:00.000Z"}]"#;
        let cred: SessionCredential = serde_json::from_str(raw).unwrap();
        assert_eq!(cred.identity_id(), Some("42"));
        assert_eq!(cred.cookies()[0].host_only, Some(false));
        assert_eq!(cred.cookie_header(), "c_user=42");
    }
}
