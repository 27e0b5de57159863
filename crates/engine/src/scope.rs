//! Scope providers: where the list of target accounts comes from.

use skyaudit_core::{Account, ScanConfig};

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("scope source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid account '{id}': {reason}")]
    InvalidAccount { id: String, reason: String },
}

/// Yields the accounts (with their regions) to scan.
#[async_trait::async_trait]
pub trait ScopeProvider: Send + Sync {
    async fn accounts(&self) -> Result<Vec<Account>, ScopeError>;
}

/// A fixed account list, usually taken from the scan config.
#[derive(Debug, Clone, Default)]
pub struct StaticScopes {
    accounts: Vec<Account>,
}

impl StaticScopes {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.accounts.clone())
    }
}

#[async_trait::async_trait]
impl ScopeProvider for StaticScopes {
    async fn accounts(&self) -> Result<Vec<Account>, ScopeError> {
        for account in &self.accounts {
            if account.id.is_empty() {
                return Err(ScopeError::InvalidAccount {
                    id: account.id.clone(),
                    reason: "empty account id".into(),
                });
            }
        }
        Ok(self.accounts.clone())
    }
}
