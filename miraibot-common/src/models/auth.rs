// File: miraibot-common/src/models/auth.rs

use crate::models::credential::SessionCredential;

/// What the login endpoint answered for one submission.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Logged in; the session to persist.
    Success(SessionCredential),
    /// The platform wants a two-factor code before it hands out a session.
    TwoFactorRequired(TwoFactorChallenge),
}

/// A pending two-factor challenge. The code read from the operator is
/// submitted against exactly this challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorChallenge {
    pub continuation: String,
    pub message: String,
}

impl TwoFactorChallenge {
    pub fn new(continuation: impl Into<String>) -> Self {
        Self {
            continuation: continuation.into(),
            message: "Enter the 2FA code from your phone".into(),
        }
    }
}

/// Counter of full authentication cycles spent by this process.
///
/// `attempts_used` never exceeds `max_attempts`; once they are equal the
/// budget is exhausted for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthAttempt {
    attempts_used: u32,
    max_attempts: u32,
}

impl AuthAttempt {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts_used: 0,
            max_attempts,
        }
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts_used >= self.max_attempts
    }

    /// Records one failed cycle. Returns `false` if no further cycle may run.
    pub fn record_failure(&mut self) -> bool {
        if self.attempts_used < self.max_attempts {
            self.attempts_used += 1;
        }
        !self.is_exhausted()
    }
}
