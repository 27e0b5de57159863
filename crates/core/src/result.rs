use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scope::ScanScope;

/// Outcome of one check against one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::Error => write!(f, "ERROR"),
        }
    }
}

/// A single verdict produced for a (check, resource) pair.
///
/// Immutable once produced. The engine hands it to a reporting sink and
/// does not keep it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub rule_id: String,
    /// Id of the rule document the check belongs to.
    pub document_id: String,
    /// `None` when the bound discovery step failed and no resource was seen.
    pub resource_id: Option<String>,
    pub verdict: Verdict,
    /// Error reason for ERROR, first failing assertion for FAIL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub scope: ScanScope,
    /// Set when a configured exception covers this result.
    #[serde(default)]
    pub excepted: bool,
}

impl CheckResult {
    pub fn pass(
        rule_id: impl Into<String>,
        document_id: impl Into<String>,
        resource_id: impl Into<String>,
        scope: ScanScope,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            document_id: document_id.into(),
            resource_id: Some(resource_id.into()),
            verdict: Verdict::Pass,
            detail: None,
            scope,
            excepted: false,
        }
    }

    pub fn fail(
        rule_id: impl Into<String>,
        document_id: impl Into<String>,
        resource_id: impl Into<String>,
        scope: ScanScope,
        detail: Option<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            document_id: document_id.into(),
            resource_id: Some(resource_id.into()),
            verdict: Verdict::Fail,
            detail,
            scope,
            excepted: false,
        }
    }

    pub fn error(
        rule_id: impl Into<String>,
        document_id: impl Into<String>,
        resource_id: Option<String>,
        scope: ScanScope,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            document_id: document_id.into(),
            resource_id,
            verdict: Verdict::Error,
            detail: Some(detail.into()),
            scope,
            excepted: false,
        }
    }

    /// Merge key used by reporting backends:
    /// (account, region, service, rule_id, resource_id).
    pub fn merge_key(&self) -> (String, String, String, String, Option<String>) {
        (
            self.scope.account_id.clone(),
            self.scope.region.clone(),
            self.scope.service.clone(),
            self.rule_id.clone(),
            self.resource_id.clone(),
        )
    }
}

/// Running tally of verdicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub excepted: usize,
}

impl VerdictCounts {
    pub fn record(&mut self, result: &CheckResult) {
        match result.verdict {
            Verdict::Pass => self.pass += 1,
            Verdict::Fail => self.fail += 1,
            Verdict::Error => self.error += 1,
        }
        if result.excepted {
            self.excepted += 1;
        }
    }

    pub fn merge(&mut self, other: &VerdictCounts) {
        self.pass += other.pass;
        self.fail += other.fail;
        self.error += other.error;
        self.excepted += other.excepted;
    }

    pub fn total(&self) -> usize {
        self.pass + self.fail + self.error
    }
}
