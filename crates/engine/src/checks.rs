//! Check executor: turns discovered items into verdicts.

use std::collections::HashSet;

use tracing::debug;

use skyaudit_core::{CheckResult, ScanScope};
use skyaudit_rules::condition::evaluate_assertions;
use skyaudit_rules::context::ResourceContext;
use skyaudit_rules::schema::{Check, FieldAssertion, ServiceDocument};

use crate::discovery::{DiscoveryOutcome, StepState};

/// Binding that holds the current item during evaluation.
pub const ITEM_BINDING: &str = "item";

/// Verdicts and coverage counters for one document in one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckRun {
    pub results: Vec<CheckResult>,
    /// Checks skipped because they are disabled in the document or config.
    pub skipped_disabled: usize,
    /// Enabled checks whose step completed without emitting any item.
    pub without_resources: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CheckExecutor {
    disabled_rules: HashSet<String>,
}

impl CheckExecutor {
    pub fn new<I, S>(disabled_rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disabled_rules: disabled_rules.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_disabled(&self, check: &Check) -> bool {
        !check.enabled || self.disabled_rules.contains(&check.rule_id)
    }

    /// Evaluate every enabled check of `doc` against the discovery outcome.
    pub fn run(&self, doc: &ServiceDocument, outcome: &DiscoveryOutcome, scope: &ScanScope) -> CheckRun {
        let mut run = CheckRun::default();
        let base = ResourceContext::for_scope(scope);

        for check in &doc.checks {
            if self.is_disabled(check) {
                run.skipped_disabled += 1;
                continue;
            }

            let output = match outcome.state(&check.for_each) {
                Some(StepState::Completed(output)) => output,
                Some(StepState::Failed(failure)) => {
                    run.results.push(CheckResult::error(
                        &check.rule_id,
                        doc.id(),
                        None,
                        scope.clone(),
                        format!("discovery step '{}' failed: {failure}", check.for_each),
                    ));
                    continue;
                }
                _ => {
                    run.results.push(CheckResult::error(
                        &check.rule_id,
                        doc.id(),
                        None,
                        scope.clone(),
                        format!("discovery step '{}' did not run", check.for_each),
                    ));
                    continue;
                }
            };

            if output.items.is_empty() {
                debug!(rule_id = %check.rule_id, step = %check.for_each, scope = %scope, "no resources to evaluate");
                run.without_resources += 1;
                continue;
            }

            for item in &output.items {
                let ctx = base.with(ITEM_BINDING, item.value.clone());
                let result = match evaluate_assertions(&check.conditions, check.logic, ctx.as_value()) {
                    Ok(outcome) if outcome.passed => {
                        CheckResult::pass(&check.rule_id, doc.id(), &item.id, scope.clone())
                    }
                    Ok(outcome) => {
                        let detail = outcome
                            .first_failure
                            .and_then(|i| check.conditions.get(i).map(|a| describe_failure(i, a)));
                        CheckResult::fail(&check.rule_id, doc.id(), &item.id, scope.clone(), detail)
                    }
                    Err(err) => CheckResult::error(
                        &check.rule_id,
                        doc.id(),
                        Some(item.id.clone()),
                        scope.clone(),
                        err.to_string(),
                    ),
                };
                run.results.push(result);
            }
        }

        run
    }
}

fn describe_failure(index: usize, assertion: &FieldAssertion) -> String {
    match &assertion.value {
        Some(expected) => format!(
            "condition {index} not met: {} {} {expected}",
            assertion.var, assertion.op
        ),
        None => format!("condition {index} not met: {} {}", assertion.var, assertion.op),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use skyaudit_core::{ScopeKey, Verdict};

    use crate::cancel::CancelToken;
    use crate::discovery::DiscoveryExecutor;
    use crate::fixture::ReplayFactory;
    use crate::registry::{ClientRegistry, ProviderFactories};

    const DOC: &str = r#"
apiVersion: v1
kind: ServiceRules
metadata: { id: demo-svc, name: Demo, provider: demo, service: svc }
discovery:
  - id: resources
    calls:
      - client: svc
        action: list
    emit:
      items_for: response.items
      id: id
checks:
  - rule_id: demo.svc.active
    for_each: resources
    conditions:
      - var: item.status
        op: equals
        value: active
  - rule_id: demo.svc.sized
    for_each: resources
    conditions:
      - var: item.size
        op: gt
        value: 10
  - rule_id: demo.svc.off
    for_each: resources
    enabled: false
    conditions:
      - var: item.id
        op: exists
"#;

    fn scope() -> ScanScope {
        ScanScope::new("demo", "acct", "r1", "svc")
    }

    async fn outcome(doc: &ServiceDocument, fixture: &str) -> DiscoveryOutcome {
        let factory: Arc<dyn crate::provider::ClientFactory> =
            Arc::new(ReplayFactory::from_yaml_str(fixture).unwrap());
        let registry = ClientRegistry::new(Arc::new(ProviderFactories::new().with("demo", factory)));
        let key = ScopeKey {
            account_id: "acct".into(),
            credential_set: None,
            region: "r1".into(),
        };
        DiscoveryExecutor::new(2, Duration::from_secs(5))
            .run(doc, &scope(), &key, &registry, &CancelToken::new())
            .await
    }

    fn verdicts(run: &CheckRun, rule_id: &str) -> Vec<(Option<String>, Verdict)> {
        run.results
            .iter()
            .filter(|r| r.rule_id == rule_id)
            .map(|r| (r.resource_id.clone(), r.verdict))
            .collect()
    }

    #[tokio::test]
    async fn one_verdict_per_item() {
        let doc: ServiceDocument = serde_yaml::from_str(DOC).unwrap();
        let out = outcome(
            &doc,
            r#"
calls:
  - client: svc
    action: list
    response:
      items:
        - { id: a, status: active, size: 20 }
        - { id: b, status: active, size: 5 }
        - { id: c, status: inactive, size: big }
"#,
        )
        .await;
        let run = CheckExecutor::default().run(&doc, &out, &scope());

        assert_eq!(
            verdicts(&run, "demo.svc.active"),
            vec![
                (Some("a".into()), Verdict::Pass),
                (Some("b".into()), Verdict::Pass),
                (Some("c".into()), Verdict::Fail),
            ]
        );
        let fail = run.results.iter().find(|r| r.verdict == Verdict::Fail).unwrap();
        assert_eq!(fail.detail.as_deref(), Some("condition 0 not met: item.status equals \"active\""));

        // A non-numeric size is an error for that item only.
        assert_eq!(
            verdicts(&run, "demo.svc.sized"),
            vec![
                (Some("a".into()), Verdict::Pass),
                (Some("b".into()), Verdict::Fail),
                (Some("c".into()), Verdict::Error),
            ]
        );
        assert_eq!(run.skipped_disabled, 1);
        assert!(verdicts(&run, "demo.svc.off").is_empty());
    }

    #[tokio::test]
    async fn failed_step_gives_one_error_per_check() {
        let doc: ServiceDocument = serde_yaml::from_str(DOC).unwrap();
        let out = outcome(
            &doc,
            "calls:\n  - client: svc\n    action: list\n    error: { kind: access_denied, message: denied }\n",
        )
        .await;
        let run = CheckExecutor::default().run(&doc, &out, &scope());

        assert_eq!(run.results.len(), 2);
        for result in &run.results {
            assert_eq!(result.verdict, Verdict::Error);
            assert_eq!(result.resource_id, None);
            assert!(result.detail.as_deref().unwrap_or_default().contains("denied"));
        }
    }

    #[tokio::test]
    async fn empty_step_counts_as_without_resources() {
        let doc: ServiceDocument = serde_yaml::from_str(DOC).unwrap();
        let out = outcome(&doc, "calls:\n  - client: svc\n    action: list\n    response: { items: [] }\n").await;
        let run = CheckExecutor::new(["demo.svc.sized"]).run(&doc, &out, &scope());

        assert!(run.results.is_empty());
        assert_eq!(run.without_resources, 1);
        assert_eq!(run.skipped_disabled, 2);
    }

    #[tokio::test]
    async fn outer_bindings_are_visible_to_conditions() {
        let doc: ServiceDocument = serde_yaml::from_str(
            &DOC.replace("var: item.status", "var: region").replace("value: active", "value: r1"),
        )
        .unwrap();
        let out = outcome(
            &doc,
            "calls:\n  - client: svc\n    action: list\n    response: { items: [{ id: a, size: 11 }] }\n",
        )
        .await;
        let run = CheckExecutor::default().run(&doc, &out, &scope());
        assert_eq!(verdicts(&run, "demo.svc.active"), vec![(Some("a".into()), Verdict::Pass)]);
    }
}
