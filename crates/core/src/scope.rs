use std::fmt;

use serde::{Deserialize, Serialize};

/// Region label used for services that are not region-scoped (IAM, DNS, ...).
pub const GLOBAL_REGION: &str = "global";

/// A target cloud account (AWS account, Azure subscription, GCP project).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Provider key matched against `metadata.provider` of rule documents.
    pub provider: String,
    /// Opaque credential-set name handed to the client factory.
    #[serde(default)]
    pub credential_set: Option<String>,
    /// Regions to scan for regional services.
    #[serde(default)]
    pub regions: Vec<String>,
}

/// Coordinates of one unit of work: (provider, account, region, service).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanScope {
    pub provider: String,
    pub account_id: String,
    pub region: String,
    pub service: String,
}

impl ScanScope {
    pub fn new(
        provider: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            account_id: account_id.into(),
            region: region.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ScanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}",
            self.provider, self.account_id, self.region, self.service
        )
    }
}

/// Key under which provider clients are pooled: one credential set in one region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub account_id: String,
    pub credential_set: Option<String>,
    pub region: String,
}

impl ScopeKey {
    pub fn for_account(account: &Account, region: impl Into<String>) -> Self {
        Self {
            account_id: account.id.clone(),
            credential_set: account.credential_set.clone(),
            region: region.into(),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.credential_set {
            Some(creds) => write!(f, "{}[{}]@{}", self.account_id, creds, self.region),
            None => write!(f, "{}@{}", self.account_id, self.region),
        }
    }
}
