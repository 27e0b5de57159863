use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::result::CheckResult;
use crate::scope::Account;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| v.parse().ok())
}

// ── Top-level config ──────────────────────────────────────────

/// Run-scoped scan configuration.
///
/// Passed explicitly into the orchestrator; nothing here is process-global.
/// Parsed from TOML with environment overrides for the concurrency knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    #[serde(default)]
    pub filter: ScanFilter,

    /// Rule ids that are never evaluated.
    #[serde(default)]
    pub disabled_rules: Vec<String>,

    /// Accepted findings; matching results are marked `excepted`.
    #[serde(default)]
    pub exceptions: Vec<ExceptionRule>,

    /// Static scan targets (used by `StaticScopes`).
    #[serde(default)]
    pub accounts: Vec<Account>,
}

impl ScanConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Override concurrency settings from `SKYAUDIT_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        let c = &mut self.concurrency;
        if let Some(v) = env_parse("SKYAUDIT_MAX_ACCOUNTS") {
            c.max_concurrent_accounts = v;
        }
        if let Some(v) = env_parse("SKYAUDIT_MAX_UNITS") {
            c.max_concurrent_units = v;
        }
        if let Some(v) = env_parse("SKYAUDIT_ITEM_CONCURRENCY") {
            c.item_concurrency = v;
        }
        if let Some(v) = env_parse("SKYAUDIT_CALL_TIMEOUT_MS") {
            c.call_timeout_ms = v;
        }
        if let Some(v) = env_parse("SKYAUDIT_SHUTDOWN_GRACE_MS") {
            c.shutdown_grace_ms = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.concurrency;
        if c.max_concurrent_accounts == 0 {
            return Err(ConfigError::Invalid(
                "concurrency.max_concurrent_accounts must be at least 1".into(),
            ));
        }
        if c.max_concurrent_units == 0 {
            return Err(ConfigError::Invalid(
                "concurrency.max_concurrent_units must be at least 1".into(),
            ));
        }
        if c.item_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency.item_concurrency must be at least 1".into(),
            ));
        }
        if c.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "concurrency.call_timeout_ms must be greater than 0".into(),
            ));
        }
        for (i, account) in self.accounts.iter().enumerate() {
            if account.id.is_empty() || account.provider.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "accounts[{i}] needs both `id` and `provider`"
                )));
            }
        }
        for (i, exception) in self.exceptions.iter().enumerate() {
            if exception.rule_id.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "exceptions[{i}].rule_id must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// First exception covering this result, if any.
    pub fn exception_for(&self, result: &CheckResult) -> Option<&ExceptionRule> {
        self.exceptions.iter().find(|e| e.matches(result))
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        let c = &self.concurrency;
        tracing::info!("Scan config loaded:");
        tracing::info!(
            "  concurrency: accounts={}, units={}, items={}",
            c.max_concurrent_accounts,
            c.max_concurrent_units,
            c.item_concurrency
        );
        tracing::info!(
            "  timeouts:    call={}ms, shutdown_grace={}ms",
            c.call_timeout_ms,
            c.shutdown_grace_ms
        );
        tracing::info!(
            "  targets:     {} static account(s), {} disabled rule(s), {} exception(s)",
            self.accounts.len(),
            self.disabled_rules.len(),
            self.exceptions.len()
        );
    }
}

// ── Section configs ───────────────────────────────────────────

/// Worker-pool bounds and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Outer pool: accounts scanned at the same time.
    #[serde(default = "default_max_accounts")]
    pub max_concurrent_accounts: usize,
    /// Inner pool: (region, service) units in flight per account.
    #[serde(default = "default_max_units")]
    pub max_concurrent_units: usize,
    /// Per-item calls in flight inside one `for_each` step.
    #[serde(default = "default_item_concurrency")]
    pub item_concurrency: usize,
    /// Timeout applied to every single provider call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// How long in-flight units may keep running after cancellation.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_max_accounts() -> usize { 4 }
fn default_max_units() -> usize { 8 }
fn default_item_concurrency() -> usize { 4 }
fn default_call_timeout_ms() -> u64 { 30_000 }
fn default_shutdown_grace_ms() -> u64 { 10_000 }

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_accounts: default_max_accounts(),
            max_concurrent_units: default_max_units(),
            item_concurrency: default_item_concurrency(),
            call_timeout_ms: default_call_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl ConcurrencyConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Include/exclude filters for each scan dimension.
///
/// An empty include list means "everything"; excludes always win.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanFilter {
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub exclude_accounts: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub exclude_regions: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub exclude_services: Vec<String>,
}

fn allowed(value: &str, include: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|e| e == value) {
        return false;
    }
    include.is_empty() || include.iter().any(|i| i == value)
}

impl ScanFilter {
    pub fn allows_account(&self, account_id: &str) -> bool {
        allowed(account_id, &self.accounts, &self.exclude_accounts)
    }

    pub fn allows_region(&self, region: &str) -> bool {
        allowed(region, &self.regions, &self.exclude_regions)
    }

    pub fn allows_service(&self, service: &str) -> bool {
        allowed(service, &self.services, &self.exclude_services)
    }
}

/// An accepted finding. Unset selectors match anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExceptionRule {
    pub rule_id: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ExceptionRule {
    pub fn matches(&self, result: &CheckResult) -> bool {
        if self.rule_id != result.rule_id {
            return false;
        }
        if let Some(resource) = &self.resource_id {
            if result.resource_id.as_deref() != Some(resource.as_str()) {
                return false;
            }
        }
        if let Some(account) = &self.account_id {
            if account != &result.scope.account_id {
                return false;
            }
        }
        if let Some(region) = &self.region {
            if region != &result.scope.region {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScanScope;

    const SAMPLE: &str = r#"
disabled_rules = ["aws.iam.root_mfa"]

[concurrency]
max_concurrent_accounts = 2
call_timeout_ms = 5000

[filter]
regions = ["us-east-1", "eu-west-1"]
exclude_services = ["cloudtrail"]

[[accounts]]
id = "111111111111"
provider = "aws"
regions = ["us-east-1"]

[[exceptions]]
rule_id = "aws.s3.bucket.encryption"
resource_id = "legacy-logs"
reason = "accepted until migration"
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let config = ScanConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.concurrency.max_concurrent_accounts, 2);
        assert_eq!(config.concurrency.max_concurrent_units, 8);
        assert_eq!(config.concurrency.call_timeout(), Duration::from_millis(5000));
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.disabled_rules, vec!["aws.iam.root_mfa".to_string()]);
    }

    #[test]
    fn empty_config_is_valid() {
        let config = ScanConfig::from_toml("").unwrap();
        assert!(config.accounts.is_empty());
        assert_eq!(config.concurrency.item_concurrency, 4);
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let err = ScanConfig::from_toml("[concurrency]\nmax_concurrent_units = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn filter_excludes_win_over_includes() {
        let filter = ScanFilter {
            services: vec!["s3".into(), "ec2".into()],
            exclude_services: vec!["ec2".into()],
            ..Default::default()
        };
        assert!(filter.allows_service("s3"));
        assert!(!filter.allows_service("ec2"));
        assert!(!filter.allows_service("iam"));
        assert!(filter.allows_region("anywhere"));
    }

    #[test]
    fn exception_matches_on_set_selectors_only() {
        let config = ScanConfig::from_toml(SAMPLE).unwrap();
        let scope = ScanScope::new("aws", "111111111111", "us-east-1", "s3");

        let hit = CheckResult::fail("aws.s3.bucket.encryption", "aws-s3", "legacy-logs", scope.clone(), None);
        let miss = CheckResult::fail("aws.s3.bucket.encryption", "aws-s3", "prod-data", scope, None);

        assert!(config.exception_for(&hit).is_some());
        assert!(config.exception_for(&miss).is_none());
    }
}
