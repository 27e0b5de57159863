//! Tests for the rule loader module.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use super::*;
use crate::metadata::InMemoryMetadataStore;

const VALID_DOC_YAML: &str = r#"
apiVersion: v1
kind: ServiceRules
metadata:
  id: aws-ec2
  name: EC2 instances
  provider: aws
  service: ec2
discovery:
  - id: instances
    calls:
      - client: ec2
        action: describe_instances
    emit:
      items_for: response.Instances
      id: id
      item:
        id: item.InstanceId
        imds: item.MetadataOptions.HttpTokens
checks:
  - rule_id: aws.ec2.imdsv2
    for_each: instances
    conditions:
      - var: item.imds
        op: equals
        value: required
"#;

fn doc_with_id(id: &str) -> String {
    VALID_DOC_YAML.replace("id: aws-ec2", &format!("id: {id}"))
}

fn temp_loader() -> (TempDir, RuleLoader) {
    let dir = TempDir::new().expect("create tempdir");
    let loader = RuleLoader::new(dir.path().to_path_buf());
    (dir, loader)
}

fn loaded_count(results: &[LoadResult]) -> usize {
    results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
        .count()
}

#[test]
fn load_document_from_file() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("aws-ec2.yml");
    fs::write(&path, VALID_DOC_YAML).unwrap();

    let doc = loader.load_file(&path).unwrap();
    assert_eq!(doc.id(), "aws-ec2");
    assert_eq!(doc.service(), "ec2");
    assert_eq!(doc.checks.len(), 1);
}

#[test]
fn load_all_skips_dotfiles_and_non_yaml() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("aws-ec2.yml"), VALID_DOC_YAML).unwrap();
    fs::write(dir.path().join(".hidden.yml"), doc_with_id("hidden")).unwrap();
    fs::write(dir.path().join("readme.txt"), "not a rule").unwrap();

    let results = loader.load_all().unwrap();
    let skipped = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
        .count();

    assert_eq!(loaded_count(&results), 1);
    assert_eq!(skipped, 2);
    assert!(loader.get("aws-ec2").is_some());
    assert!(loader.get("hidden").is_none());
}

#[test]
fn load_all_recursive_subdirectories() {
    let (dir, loader) = temp_loader();
    let sub = dir.path().join("aws").join("compute");
    fs::create_dir_all(&sub).unwrap();
    fs::write(dir.path().join("top.yaml"), doc_with_id("top-level")).unwrap();
    fs::write(sub.join("nested.yml"), doc_with_id("nested-doc")).unwrap();

    let results = loader.load_all().unwrap();
    assert_eq!(loaded_count(&results), 2);

    let set = loader.rule_set();
    let ids: Vec<&str> = set.documents().iter().map(|d| d.id()).collect();
    assert_eq!(ids, vec!["nested-doc", "top-level"]);
}

#[test]
fn invalid_yaml_produces_error_not_panic() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("bad.yml");
    fs::write(&path, "apiVersion: v1\nkind: [unterminated").unwrap();

    let err = loader.load_file(&path).unwrap_err();
    assert!(matches!(err, DocumentError::Parse(_)));
}

#[test]
fn empty_id_fails_validation() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("empty.yml");
    fs::write(&path, doc_with_id("''")).unwrap();

    let err = loader.load_file(&path).unwrap_err();
    assert!(matches!(err, DocumentError::Validation(ref m) if m.contains("must not be empty")));
}

#[test]
fn wrong_kind_is_rejected() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("bundle.yml");
    fs::write(&path, VALID_DOC_YAML.replace("kind: ServiceRules", "kind: PolicyBundle")).unwrap();

    let err = loader.load_file(&path).unwrap_err();
    assert!(err.to_string().contains("unsupported kind 'PolicyBundle'"));
}

#[test]
fn statically_invalid_document_is_excluded() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("good.yml"), VALID_DOC_YAML).unwrap();
    fs::write(
        dir.path().join("broken.yml"),
        doc_with_id("broken").replace("for_each: instances", "for_each: instance"),
    )
    .unwrap();

    let results = loader.load_all().unwrap();
    assert_eq!(loaded_count(&results), 1);

    let failed: Vec<&str> = results
        .iter()
        .filter_map(|r| match &r.status {
            LoadStatus::Failed { error } => Some(error.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].contains("document 'broken' is invalid"));
    assert!(failed[0].contains("did you mean 'instances'"));
    assert!(loader.get("broken").is_none());
}

#[test]
fn duplicate_document_ids_keep_first_file() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("a.yml"), VALID_DOC_YAML).unwrap();
    fs::write(dir.path().join("b.yml"), VALID_DOC_YAML).unwrap();

    let results = loader.load_all().unwrap();
    assert_eq!(loaded_count(&results), 1);
    assert!(matches!(
        &results[1].status,
        LoadStatus::Failed { error } if error.contains("duplicate document id 'aws-ec2'")
    ));
    assert_eq!(loader.len(), 1);
}

#[test]
fn load_all_replaces_previous_documents() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("aws-ec2.yml");
    fs::write(&path, VALID_DOC_YAML).unwrap();
    loader.load_all().unwrap();
    assert_eq!(loader.len(), 1);

    fs::remove_file(&path).unwrap();
    loader.load_all().unwrap();
    assert!(loader.is_empty());
}

#[test]
fn missing_directory_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let loader = RuleLoader::new(dir.path().join("does-not-exist"));
    let results = loader.load_all().unwrap();
    assert!(results.is_empty());
    assert!(loader.rule_set().is_empty());
}

#[test]
fn metadata_warnings_are_counted() {
    let (dir, loader) = temp_loader();
    let loader = loader.with_metadata(Arc::new(InMemoryMetadataStore::new()));
    fs::write(dir.path().join("aws-ec2.yml"), VALID_DOC_YAML).unwrap();

    let results = loader.load_all().unwrap();
    assert!(matches!(
        results[0].status,
        LoadStatus::Loaded { warnings: 1, .. }
    ));
}

#[test]
fn rule_set_from_documents_rejects_invalid_and_duplicates() {
    let good = parse_document(VALID_DOC_YAML).unwrap();
    let dup = good.clone();
    let mut bad = parse_document(&doc_with_id("bad-doc")).unwrap();
    bad.checks[0].conditions.clear();

    let (set, rejected) = RuleSet::from_documents([good, dup, bad]);
    assert_eq!(set.len(), 1);
    assert_eq!(set.check_count(), 1);
    assert_eq!(rejected.len(), 2);
    assert!(matches!(rejected[0].1, DocumentError::Validation(_)));
    assert!(matches!(rejected[1].1, DocumentError::Invalid { ref id, .. } if id == "bad-doc"));
}

#[test]
fn rule_set_enabled_filters_disabled_documents() {
    let mut off = parse_document(&doc_with_id("off")).unwrap();
    off.metadata.enabled = false;
    let on = parse_document(VALID_DOC_YAML).unwrap();

    let (set, rejected) = RuleSet::from_documents([off, on]);
    assert!(rejected.is_empty());
    assert_eq!(set.len(), 2);
    let enabled: Vec<&str> = set.enabled().map(|d| d.id()).collect();
    assert_eq!(enabled, vec!["aws-ec2"]);
    assert_eq!(set.check_count(), 1);
    assert!(set.get("off").is_some());
}
