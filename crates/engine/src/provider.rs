//! Provider client interfaces.
//!
//! Concrete cloud SDK bindings live outside this crate. A provider plugs in
//! a [`ClientFactory`] that builds [`ProviderClient`]s for a (package, scope)
//! pair; the engine only ever talks to the uniform `invoke` surface.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use skyaudit_core::ScopeKey;
use skyaudit_rules::template::TemplateError;

/// A single provider call failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("parameter rendering failed: {0}")]
    Render(#[from] TemplateError),
}

/// The registry could not produce a client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("no client factory registered for provider '{0}'")]
    UnknownProvider(String),

    #[error("failed to construct client for '{package}' in {scope}: {reason}")]
    Construction {
        package: String,
        scope: String,
        reason: String,
    },
}

impl ClientError {
    pub fn construction(package: &str, scope: &ScopeKey, reason: impl Into<String>) -> Self {
        Self::Construction {
            package: package.to_string(),
            scope: scope.to_string(),
            reason: reason.into(),
        }
    }
}

/// A constructed SDK client. Read-only after construction and shared
/// between every unit of one account.
///
/// `invoke` runs on the async runtime and the per-call timeout only fires at
/// an await point. Clients backed by a blocking SDK must run each call
/// through `tokio::task::spawn_blocking`, otherwise they stall runtime
/// workers and the timeout never triggers.
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    /// Run `action` with rendered `params` (a JSON object) and return the raw response.
    async fn invoke(&self, action: &str, params: &Value) -> Result<Value, CallError>;
}

/// Builds provider clients. One factory per cloud provider.
#[async_trait::async_trait]
pub trait ClientFactory: Send + Sync {
    /// SDK package backing a logical service. Services that share a package
    /// share one pooled client per scope.
    fn package_for(&self, service: &str) -> String {
        service.to_string()
    }

    async fn create(
        &self,
        package: &str,
        scope: &ScopeKey,
    ) -> Result<Arc<dyn ProviderClient>, ClientError>;
}
