//! Shared types for the skyaudit scanning engine.
//!
//! Scan coordinates (accounts, regions, scopes), verdicts and check results,
//! and the run-scoped scan configuration.

pub mod config;
pub mod error;
pub mod result;
pub mod scope;

pub use config::{load_dotenv, ConcurrencyConfig, ExceptionRule, ScanConfig, ScanFilter};
pub use error::ConfigError;
pub use result::{CheckResult, Verdict, VerdictCounts};
pub use scope::{Account, ScanScope, ScopeKey, GLOBAL_REGION};
