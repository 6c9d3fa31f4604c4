//! Store configuration.

/// How a commit handles a leaf written both by itself and by a transaction
/// that committed after it began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Abort the commit with a conflict error.
    #[default]
    Strict,
    /// Keep the committing transaction's value for the conflicting leaf.
    LastWriterWins,
}

/// Configuration for an [`AppStore`](crate::AppStore).
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether a slice update outside any transaction opens one implicitly.
    pub update_auto_begin_transaction: bool,

    /// Whether every root activity body runs inside a transaction.
    pub activity_auto_begin_transaction: bool,

    /// Resolution of true write/write conflicts found during rebase.
    pub conflict_policy: ConflictPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update_auto_begin_transaction: true,
            activity_auto_begin_transaction: false,
            conflict_policy: ConflictPolicy::Strict,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether updates outside a transaction open one.
    #[must_use]
    pub const fn update_auto_begin_transaction(mut self, value: bool) -> Self {
        self.update_auto_begin_transaction = value;
        self
    }

    /// Sets whether activities run inside a transaction.
    #[must_use]
    pub const fn activity_auto_begin_transaction(mut self, value: bool) -> Self {
        self.activity_auto_begin_transaction = value;
        self
    }

    /// Sets the conflict policy.
    #[must_use]
    pub const fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.update_auto_begin_transaction);
        assert!(!config.activity_auto_begin_transaction);
        assert_eq!(config.conflict_policy, ConflictPolicy::Strict);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .update_auto_begin_transaction(false)
            .activity_auto_begin_transaction(true)
            .conflict_policy(ConflictPolicy::LastWriterWins);

        assert!(!config.update_auto_begin_transaction);
        assert!(config.activity_auto_begin_transaction);
        assert_eq!(config.conflict_policy, ConflictPolicy::LastWriterWins);
    }
}
