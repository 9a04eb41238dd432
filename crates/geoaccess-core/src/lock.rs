//! Lock policies and authorization tokens.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How long a granted lock lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockDuration {
    /// Milliseconds from the moment the lock is granted or refreshed.
    Millis(u64),
    /// Until the enclosing transaction commits, rolls back or closes.
    Transaction,
}

impl LockDuration {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            LockDuration::Millis(ms) => Some(Duration::from_millis(*ms)),
            LockDuration::Transaction => None,
        }
    }

    /// Milliseconds, with `-1` for transaction-scoped locks.
    pub fn as_millis(&self) -> i64 {
        match self {
            LockDuration::Millis(ms) => i64::try_from(*ms).unwrap_or(i64::MAX),
            LockDuration::Transaction => -1,
        }
    }
}

/// Lock request: an authorization token plus a lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureLock {
    authorization: Cow<'static, str>,
    duration: LockDuration,
}

impl FeatureLock {
    /// Locks that last as long as the enclosing transaction.
    pub const TRANSACTION: FeatureLock = FeatureLock {
        authorization: Cow::Borrowed("LOCK_TRANSACTION"),
        duration: LockDuration::Transaction,
    };

    pub fn new(authorization: impl Into<String>, duration: LockDuration) -> Self {
        Self {
            authorization: Cow::Owned(authorization.into()),
            duration,
        }
    }

    pub fn timed(authorization: impl Into<String>, millis: u64) -> Self {
        Self::new(authorization, LockDuration::Millis(millis))
    }

    /// A fresh lock with a token from `generator`.
    pub fn generate(generator: &dyn AuthorizationGenerator, duration: LockDuration) -> Self {
        Self::new(generator.generate(), duration)
    }

    pub fn authorization(&self) -> &str {
        &self.authorization
    }

    pub fn duration(&self) -> LockDuration {
        self.duration
    }

    pub fn is_transaction(&self) -> bool {
        self.duration == LockDuration::Transaction
    }
}

impl fmt::Display for FeatureLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FeatureLock[{}, {}ms]",
            self.authorization,
            self.duration.as_millis()
        )
    }
}

/// Source of authorization tokens. Passed to whatever hands out locks.
pub trait AuthorizationGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUID tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidAuthorizationGenerator;

impl AuthorizationGenerator for UuidAuthorizationGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// `prefix-1`, `prefix-2`, ... Deterministic, handy in tests.
#[derive(Debug)]
pub struct SequentialAuthorizationGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialAuthorizationGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl AuthorizationGenerator for SequentialAuthorizationGenerator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_lock() {
        let lock = FeatureLock::TRANSACTION;
        assert!(lock.is_transaction());
        assert_eq!(lock.duration().as_millis(), -1);
        assert_eq!(lock.authorization(), "LOCK_TRANSACTION");
        assert_eq!(lock.duration().as_duration(), None);
    }

    #[test]
    fn test_generators() {
        let seq = SequentialAuthorizationGenerator::new("auth");
        let a = FeatureLock::generate(&seq, LockDuration::Millis(1000));
        let b = FeatureLock::generate(&seq, LockDuration::Millis(1000));
        assert_eq!(a.authorization(), "auth-1");
        assert_eq!(b.authorization(), "auth-2");

        let uuid = UuidAuthorizationGenerator;
        assert_ne!(uuid.generate(), uuid.generate());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            FeatureLock::timed("abc", 500).to_string(),
            "FeatureLock[abc, 500ms]"
        );
    }
}
