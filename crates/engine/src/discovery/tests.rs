use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use skyaudit_core::{ScanScope, ScopeKey};
use skyaudit_rules::schema::ServiceDocument;

use super::*;
use crate::fixture::ReplayFactory;
use crate::registry::ProviderFactories;

const INSTANCES: &str = r#"
apiVersion: v1
kind: ServiceRules
metadata:
  id: aws-ec2
  name: EC2 instances
  provider: aws
  service: ec2
discovery:
  - id: list_instances
    calls:
      - client: ec2
        action: describe_instances
    emit:
      items_for: response.Instances
      as: inst
      id: id
      item:
        id: inst.InstanceId
  - id: instance_detail
    for_each: list_instances
    as: inst
    calls:
      - client: ec2
        action: describe_instance_attribute
        params:
          InstanceId: "{{ inst.id }}"
        on_error: continue
    emit:
      id: id
      item:
        id: inst.id
        status: response.Status
"#;

const FIVE_INSTANCES: &str = r#"
calls:
  - client: ec2
    action: describe_instances
    response:
      Instances:
        - { InstanceId: i-1 }
        - { InstanceId: i-2 }
        - { InstanceId: i-3 }
        - { InstanceId: i-4 }
        - { InstanceId: i-5 }
  - client: ec2
    action: describe_instance_attribute
    params: { InstanceId: i-3 }
    error: { kind: access_denied, message: not authorized }
  - client: ec2
    action: describe_instance_attribute
    response: { Status: running }
"#;

fn doc(yaml: &str) -> ServiceDocument {
    serde_yaml::from_str(yaml).unwrap()
}

fn scope() -> ScanScope {
    ScanScope::new("aws", "111", "us-east-1", "ec2")
}

fn key() -> ScopeKey {
    ScopeKey {
        account_id: "111".into(),
        credential_set: None,
        region: "us-east-1".into(),
    }
}

fn registry(factory: &ReplayFactory) -> ClientRegistry {
    let factory: Arc<dyn crate::provider::ClientFactory> = Arc::new(factory.clone());
    ClientRegistry::new(Arc::new(ProviderFactories::new().with("aws", factory)))
}

fn executor() -> DiscoveryExecutor {
    DiscoveryExecutor::new(4, Duration::from_secs(5))
}

async fn run(doc: &ServiceDocument, factory: &ReplayFactory) -> DiscoveryOutcome {
    executor()
        .run(doc, &scope(), &key(), &registry(factory), &CancelToken::new())
        .await
}

fn ids(out: &StepOutput) -> Vec<&str> {
    out.items.iter().map(|i| i.id.as_str()).collect()
}

// ── Iteration and gaps ──────────────────────────────────────────────

#[tokio::test]
async fn continue_failure_leaves_a_gap_and_keeps_other_items() {
    let factory = ReplayFactory::from_yaml_str(FIVE_INSTANCES).unwrap();
    let outcome = run(&doc(INSTANCES), &factory).await;

    let list = outcome.output("list_instances").unwrap();
    assert_eq!(ids(list), vec!["i-1", "i-2", "i-3", "i-4", "i-5"]);

    let detail = outcome.output("instance_detail").unwrap();
    assert_eq!(ids(detail), vec!["i-1", "i-2", "i-4", "i-5"]);
    assert_eq!(detail.items[0].value, json!({"id": "i-1", "status": "running"}));
    assert_eq!(detail.items[0].parent_id.as_deref(), Some("i-1"));

    let gaps: Vec<_> = outcome.gaps().collect();
    assert_eq!(gaps.len(), 1);
    let (step, gap) = gaps[0];
    assert_eq!(step, "instance_detail");
    assert_eq!(gap.call, "ec2.describe_instance_attribute");
    assert_eq!(gap.parent_id.as_deref(), Some("i-3"));
    assert!(gap.reason.contains("not authorized"));

    assert_eq!(outcome.calls(), 6);
    assert_eq!(outcome.failed_steps(), 0);
}

#[tokio::test]
async fn per_item_calls_render_the_parent_binding() {
    let factory = ReplayFactory::from_yaml_str(FIVE_INSTANCES).unwrap();
    run(&doc(INSTANCES), &factory).await;

    let mut rendered: Vec<_> = factory
        .invocations()
        .into_iter()
        .filter(|i| i.action == "describe_instance_attribute")
        .map(|i| i.params["InstanceId"].as_str().unwrap_or_default().to_string())
        .collect();
    rendered.sort();
    assert_eq!(rendered, vec!["i-1", "i-2", "i-3", "i-4", "i-5"]);
}

#[tokio::test]
async fn identical_responses_give_identical_outcomes() {
    let factory = ReplayFactory::from_yaml_str(FIVE_INSTANCES).unwrap();
    let document = doc(INSTANCES);
    let first = run(&document, &factory).await;
    let second = run(&document, &factory).await;

    for step in ["list_instances", "instance_detail"] {
        assert_eq!(first.output(step), second.output(step));
    }
}

#[tokio::test]
async fn empty_parent_runs_no_child_calls() {
    let factory = ReplayFactory::from_yaml_str(
        "calls:\n  - client: ec2\n    action: describe_instances\n    response: { Instances: [] }\n",
    )
    .unwrap();
    let outcome = run(&doc(INSTANCES), &factory).await;

    assert!(outcome.output("list_instances").unwrap().items.is_empty());
    assert!(outcome.output("instance_detail").unwrap().items.is_empty());
    assert_eq!(factory.invocations().len(), 1);
}

// ── Failure propagation ─────────────────────────────────────────────

#[tokio::test]
async fn propagate_failure_fails_dependents() {
    let factory = ReplayFactory::from_yaml_str(
        "calls:\n  - client: ec2\n    action: describe_instances\n    error: { kind: throttled, message: slow down }\n",
    )
    .unwrap();
    let outcome = run(&doc(INSTANCES), &factory).await;

    assert!(matches!(
        outcome.failure("list_instances"),
        Some(StepFailure::Call { error: CallError::Throttled(_), .. })
    ));
    assert!(matches!(
        outcome.failure("instance_detail"),
        Some(StepFailure::DependencyFailed(p)) if p == "list_instances"
    ));
    assert_eq!(outcome.execution_order(), vec!["list_instances"]);
    assert_eq!(outcome.failed_steps(), 2);
}

#[tokio::test]
async fn client_construction_failure_fails_step_despite_continue() {
    let yaml = INSTANCES.replace("client: ec2\n        action: describe_instance_attribute", "client: ssm\n        action: describe_instance_attribute");
    let factory = ReplayFactory::from_yaml_str(&format!("construction_failures: [ssm]\n{FIVE_INSTANCES}")).unwrap();
    let outcome = run(&doc(&yaml), &factory).await;

    assert!(outcome.output("list_instances").is_some());
    assert!(matches!(
        outcome.failure("instance_detail"),
        Some(StepFailure::Client(ClientError::Construction { package, .. })) if package == "ssm"
    ));
}

#[tokio::test]
async fn render_failure_follows_on_error() {
    // `inst.missing` is never bound, so every detail call fails to render.
    let yaml = INSTANCES.replace("{{ inst.id }}", "{{ inst.missing }}");
    let factory = ReplayFactory::from_yaml_str(FIVE_INSTANCES).unwrap();
    let outcome = run(&doc(&yaml), &factory).await;

    let detail = outcome.output("instance_detail").unwrap();
    assert!(detail.items.is_empty());
    assert_eq!(detail.gaps.len(), 5);
    assert!(detail.gaps[0].reason.contains("inst.missing"));
    assert_eq!(detail.calls, 0);

    let propagating = yaml.replace("on_error: continue", "on_error: propagate");
    let outcome = run(&doc(&propagating), &factory).await;
    assert!(matches!(
        outcome.failure("instance_detail"),
        Some(StepFailure::Call { error: CallError::Render(_), .. })
    ));
}

#[tokio::test]
async fn slow_call_times_out() {
    let factory = ReplayFactory::from_yaml_str(
        "calls:\n  - client: ec2\n    action: describe_instances\n    delay_ms: 500\n    response: { Instances: [] }\n",
    )
    .unwrap();
    let outcome = DiscoveryExecutor::new(1, Duration::from_millis(20))
        .run(&doc(INSTANCES), &scope(), &key(), &registry(&factory), &CancelToken::new())
        .await;

    assert!(matches!(
        outcome.failure("list_instances"),
        Some(StepFailure::Call { error: CallError::Timeout(_), .. })
    ));
}

#[tokio::test]
async fn cancelled_run_issues_no_calls() {
    let factory = ReplayFactory::from_yaml_str(FIVE_INSTANCES).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = executor()
        .run(&doc(INSTANCES), &scope(), &key(), &registry(&factory), &cancel)
        .await;

    assert!(matches!(outcome.failure("list_instances"), Some(StepFailure::Cancelled)));
    assert!(matches!(
        outcome.failure("instance_detail"),
        Some(StepFailure::DependencyFailed(_))
    ));
    assert!(factory.invocations().is_empty());
    assert!(outcome.execution_order().is_empty());
    assert!(outcome.was_cancelled());
}

// ── Ordering ────────────────────────────────────────────────────────

#[tokio::test]
async fn steps_run_in_dependency_order_not_document_order() {
    let yaml = r#"
apiVersion: v1
kind: ServiceRules
metadata: { id: aws-ec2, name: EC2, provider: aws, service: ec2 }
discovery:
  - id: volumes
    for_each: instances
    as: inst
    calls:
      - client: ec2
        action: describe_volumes
        params: { InstanceId: "{{ inst.id }}" }
    emit:
      items_for: response.Volumes
      item: { id: item.VolumeId, instance: inst.id }
  - id: instances
    calls:
      - client: ec2
        action: describe_instances
    emit:
      items_for: response.Instances
      item: { id: item.InstanceId }
"#;
    let factory = ReplayFactory::from_yaml_str(
        r#"
calls:
  - client: ec2
    action: describe_instances
    response: { Instances: [{ InstanceId: i-1 }, { InstanceId: i-2 }] }
  - client: ec2
    action: describe_volumes
    params: { InstanceId: i-1 }
    response: { Volumes: [{ VolumeId: vol-a }, { VolumeId: vol-b }] }
  - client: ec2
    action: describe_volumes
    response: { Volumes: [{ VolumeId: vol-c }] }
"#,
    )
    .unwrap();
    let outcome = run(&doc(yaml), &factory).await;

    assert_eq!(outcome.execution_order(), vec!["instances", "volumes"]);
    let volumes = outcome.output("volumes").unwrap();
    assert_eq!(ids(volumes), vec!["vol-a", "vol-b", "vol-c"]);
    assert_eq!(volumes.items[2].value, json!({"id": "vol-c", "instance": "i-2"}));
}

#[tokio::test]
async fn cyclic_graph_fails_every_step() {
    let yaml = r#"
apiVersion: v1
kind: ServiceRules
metadata: { id: loop, name: Loop, provider: aws, service: ec2 }
discovery:
  - id: a
    for_each: b
    calls: [{ client: ec2, action: x }]
  - id: b
    for_each: a
    calls: [{ client: ec2, action: y }]
"#;
    let factory = ReplayFactory::from_yaml_str("calls: []").unwrap();
    let outcome = run(&doc(yaml), &factory).await;

    assert!(matches!(outcome.failure("a"), Some(StepFailure::Graph(GraphError::Cycle(_)))));
    assert!(matches!(outcome.failure("b"), Some(StepFailure::Graph(_))));
    assert!(factory.invocations().is_empty());
}

// ── Pagination ──────────────────────────────────────────────────────

const PAGED: &str = r#"
apiVersion: v1
kind: ServiceRules
metadata: { id: aws-iam, name: IAM, provider: aws, service: iam, scope: global }
discovery:
  - id: users
    calls:
      - client: iam
        action: list_users
        paginate:
          token_path: response.Marker
          token_param: Marker
          max_pages: 5
    emit:
      items_for: response.Users
      item: { id: item.UserName }
"#;

#[tokio::test]
async fn pagination_follows_tokens() {
    let factory = ReplayFactory::from_yaml_str(
        r#"
calls:
  - client: iam
    action: list_users
    params: { Marker: p2 }
    response: { Users: [{ UserName: carol }] }
  - client: iam
    action: list_users
    response: { Users: [{ UserName: alice }, { UserName: bob }], Marker: p2 }
"#,
    )
    .unwrap();
    let outcome = run(&doc(PAGED), &factory).await;

    let users = outcome.output("users").unwrap();
    assert_eq!(ids(users), vec!["alice", "bob", "carol"]);
    assert_eq!(users.calls, 2);
    let markers: Vec<_> = factory.invocations().into_iter().map(|i| i.params.get("Marker").cloned()).collect();
    assert_eq!(markers, vec![None, Some(json!("p2"))]);
}

#[tokio::test]
async fn pagination_stops_at_max_pages() {
    // The token never changes, so only `max_pages` bounds the loop.
    let factory = ReplayFactory::from_yaml_str(
        "calls:\n  - client: iam\n    action: list_users\n    response: { Users: [{ UserName: loop }], Marker: again }\n",
    )
    .unwrap();
    let outcome = run(&doc(PAGED), &factory).await;

    let users = outcome.output("users").unwrap();
    assert_eq!(users.calls, 5);
    assert_eq!(users.items.len(), 5);
}
