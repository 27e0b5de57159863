//! Replay provider: serves recorded responses instead of calling a cloud.
//!
//! Fixture files (YAML or JSON) hold a list of recorded calls:
//!
//! ```yaml
//! construction_failures: [kms]      # packages whose client cannot be built
//! calls:
//!   - client: s3                    # package (= logical service by default)
//!     action: list_buckets
//!     region: us-east-1             # optional, matches the scope key
//!     account_id: "111111111111"    # optional
//!     params: { Bucket: logs }      # optional, subset match on rendered params
//!     response: { Buckets: [] }     # or `error: { kind: access_denied, message: ... }`
//!     delay_ms: 0                   # optional artificial latency
//! ```
//!
//! The first matching entry wins, so list specific entries (e.g. later pages
//! carrying a token param) before generic ones.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use skyaudit_core::ScopeKey;

use crate::provider::{CallError, ClientError, ClientFactory, ProviderClient};

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fixture parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Kind of a recorded provider failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordedErrorKind {
    Provider,
    Throttled,
    NotFound,
    AccessDenied,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedError {
    pub kind: RecordedErrorKind,
    #[serde(default)]
    pub message: String,
}

impl RecordedError {
    fn to_call_error(&self) -> CallError {
        let message = self.message.clone();
        match self.kind {
            RecordedErrorKind::Provider => CallError::Provider(message),
            RecordedErrorKind::Throttled => CallError::Throttled(message),
            RecordedErrorKind::NotFound => CallError::NotFound(message),
            RecordedErrorKind::AccessDenied => CallError::AccessDenied(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RecordedCall {
    pub client: String,
    pub action: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub error: Option<RecordedError>,
    #[serde(default)]
    pub delay_ms: u64,
}

impl RecordedCall {
    fn matches(&self, package: &str, scope: &ScopeKey, action: &str, params: &Value) -> bool {
        if self.client != package || self.action != action {
            return false;
        }
        if self.account_id.as_deref().is_some_and(|a| a != scope.account_id) {
            return false;
        }
        if self.region.as_deref().is_some_and(|r| r != scope.region) {
            return false;
        }
        match &self.params {
            None => true,
            Some(expected) => expected
                .iter()
                .all(|(k, v)| params.get(k) == Some(v)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FixtureSet {
    #[serde(default)]
    pub construction_failures: Vec<String>,
    #[serde(default)]
    pub calls: Vec<RecordedCall>,
}

impl FixtureSet {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, FixtureError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML or JSON fixture file (JSON parses as YAML).
    pub fn from_file(path: &Path) -> Result<Self, FixtureError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Append another set; its entries match after the existing ones.
    pub fn extend(&mut self, other: FixtureSet) {
        self.construction_failures.extend(other.construction_failures);
        self.calls.extend(other.calls);
    }
}

/// A call observed by a replay client.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub package: String,
    pub action: String,
    pub account_id: String,
    pub region: String,
    pub params: Value,
}

/// [`ClientFactory`] that builds replay clients over a fixture set.
#[derive(Clone)]
pub struct ReplayFactory {
    fixtures: Arc<FixtureSet>,
    failing: Arc<HashSet<String>>,
    log: Arc<Mutex<Vec<Invocation>>>,
}

impl ReplayFactory {
    pub fn new(fixtures: FixtureSet) -> Self {
        let failing = fixtures.construction_failures.iter().cloned().collect();
        Self {
            fixtures: Arc::new(fixtures),
            failing: Arc::new(failing),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, FixtureError> {
        FixtureSet::from_yaml_str(yaml).map(Self::new)
    }

    /// Every call served so far, in arrival order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait::async_trait]
impl ClientFactory for ReplayFactory {
    async fn create(
        &self,
        package: &str,
        scope: &ScopeKey,
    ) -> Result<Arc<dyn ProviderClient>, ClientError> {
        if self.failing.contains(package) {
            return Err(ClientError::construction(package, scope, "recorded construction failure"));
        }
        Ok(Arc::new(ReplayClient {
            package: package.to_string(),
            scope: scope.clone(),
            fixtures: self.fixtures.clone(),
            log: self.log.clone(),
        }))
    }
}

struct ReplayClient {
    package: String,
    scope: ScopeKey,
    fixtures: Arc<FixtureSet>,
    log: Arc<Mutex<Vec<Invocation>>>,
}

#[async_trait::async_trait]
impl ProviderClient for ReplayClient {
    async fn invoke(&self, action: &str, params: &Value) -> Result<Value, CallError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Invocation {
                package: self.package.clone(),
                action: action.to_string(),
                account_id: self.scope.account_id.clone(),
                region: self.scope.region.clone(),
                params: params.clone(),
            });

        let recorded = self
            .fixtures
            .calls
            .iter()
            .find(|c| c.matches(&self.package, &self.scope, action, params))
            .ok_or_else(|| {
                CallError::Provider(format!(
                    "no recorded response for {}.{action} in {} with params {params}",
                    self.package, self.scope
                ))
            })?;

        if recorded.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(recorded.delay_ms)).await;
        }

        match (&recorded.error, &recorded.response) {
            (Some(err), _) => Err(err.to_call_error()),
            (None, Some(response)) => Ok(response.clone()),
            (None, None) => Ok(Value::Object(Map::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIXTURE: &str = r#"
construction_failures: [kms]
calls:
  - client: s3
    action: get_bucket_encryption
    params: { Bucket: logs }
    error: { kind: not_found, message: no encryption configuration }
  - client: s3
    action: get_bucket_encryption
    region: eu-west-1
    response: { Rules: [{ Algorithm: "aws:kms" }] }
  - client: s3
    action: get_bucket_encryption
    response: { Rules: [{ Algorithm: AES256 }] }
"#;

    fn key(region: &str) -> ScopeKey {
        ScopeKey {
            account_id: "111".into(),
            credential_set: None,
            region: region.into(),
        }
    }

    #[tokio::test]
    async fn first_matching_entry_wins() {
        let factory = ReplayFactory::from_yaml_str(FIXTURE).unwrap();
        let client = factory.create("s3", &key("us-east-1")).await.unwrap();

        let err = client
            .invoke("get_bucket_encryption", &json!({"Bucket": "logs"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::NotFound(_)));

        let ok = client
            .invoke("get_bucket_encryption", &json!({"Bucket": "data"}))
            .await
            .unwrap();
        assert_eq!(ok["Rules"][0]["Algorithm"], "AES256");

        let eu = factory.create("s3", &key("eu-west-1")).await.unwrap();
        let ok = eu
            .invoke("get_bucket_encryption", &json!({"Bucket": "data"}))
            .await
            .unwrap();
        assert_eq!(ok["Rules"][0]["Algorithm"], "aws:kms");
        assert_eq!(factory.invocations().len(), 3);
    }

    #[tokio::test]
    async fn unrecorded_call_is_a_provider_error() {
        let factory = ReplayFactory::from_yaml_str(FIXTURE).unwrap();
        let client = factory.create("s3", &key("us-east-1")).await.unwrap();
        let err = client.invoke("delete_bucket", &json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::Provider(ref m) if m.contains("no recorded response")));
    }

    #[tokio::test]
    async fn recorded_construction_failure() {
        let factory = ReplayFactory::from_yaml_str(FIXTURE).unwrap();
        let err = factory.create("kms", &key("us-east-1")).await.err().unwrap();
        assert!(matches!(err, ClientError::Construction { ref package, .. } if package == "kms"));
    }
}
