// File: src/platforms/messenger/classify.rs

use serde::{Deserialize, Serialize};

use miraibot_common::models::{ErrorClassification, StreamError};

/// Known identifiers of one error class.
///
/// `codes` are compared exactly against the structured error code;
/// `patterns` are searched for in the raw error text when no code matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureSet {
    pub codes: Vec<String>,
    pub patterns: Vec<String>,
}

impl SignatureSet {
    fn new(codes: &[&str], patterns: &[&str]) -> Self {
        Self {
            codes: codes.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn matches_code(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    fn matches_text(&self, haystack: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| !p.is_empty() && haystack.contains(p.as_str()))
    }
}

/// Platform error signatures, loadable from the `signatures` section of the
/// config so they can be updated without a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureTable {
    pub challenge: SignatureSet,
    pub session_invalid: SignatureSet,
    pub transient: SignatureSet,
}

impl Default for SignatureTable {
    fn default() -> Self {
        Self {
            challenge: SignatureSet::new(
                &["601051028565049"],
                &["XCheckpointFBScrapingWarningController", "601051028565049"],
            ),
            session_invalid: SignatureSet::new(&["1357001", "HTTP401"], &["Not logged in."]),
            transient: SignatureSet::new(&["ECONNRESET"], &["ECONNRESET"]),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    table: SignatureTable,
}

impl ErrorClassifier {
    pub fn new(table: SignatureTable) -> Self {
        Self { table }
    }

    /// Structured codes win over text signatures. Within each pass the
    /// classes are tried in the order challenge, session-invalid, transient.
    pub fn classify(&self, error: &StreamError) -> ErrorClassification {
        if let Some(code) = error.code.as_deref() {
            if let Some(class) = self.lookup(|set| set.matches_code(code)) {
                return class;
            }
        }

        let raw = error.raw();
        self.lookup(|set| set.matches_text(&raw))
            .unwrap_or(ErrorClassification::Unknown)
    }

    fn lookup<F>(&self, pred: F) -> Option<ErrorClassification>
    where
        F: Fn(&SignatureSet) -> bool,
    {
        [
            (&self.table.challenge, ErrorClassification::Challenge),
            (&self.table.session_invalid, ErrorClassification::SessionInvalid),
            (&self.table.transient, ErrorClassification::Transient),
        ]
        .into_iter()
        .find(|(set, _)| pred(*set))
        .map(|(_, class)| class)
    }
}
