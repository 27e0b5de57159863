//! Per-iteration variable bindings for templates and assertions.

use serde_json::{Map, Value};
use skyaudit_core::ScanScope;

/// Names bound for every context from the scan scope.
pub const OUTER_BINDINGS: [&str; 4] = ["provider", "account_id", "region", "service"];

/// Map from variable name to value, built incrementally while a unit runs.
///
/// Owned by one (account, region, service) pass and dropped with it; never
/// shared between concurrent passes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceContext {
    root: Value,
}

impl ResourceContext {
    /// A context holding only the outer-scope bindings.
    pub fn new(
        provider: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        let mut map = Map::new();
        map.insert("provider".into(), Value::String(provider.into()));
        map.insert("account_id".into(), Value::String(account_id.into()));
        map.insert("region".into(), Value::String(region.into()));
        map.insert("service".into(), Value::String(service.into()));
        Self {
            root: Value::Object(map),
        }
    }

    pub fn for_scope(scope: &ScanScope) -> Self {
        Self::new(
            scope.provider.as_str(),
            scope.account_id.as_str(),
            scope.region.as_str(),
            scope.service.as_str(),
        )
    }

    /// Bind (or rebind) a variable.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if let Value::Object(map) = &mut self.root {
            map.insert(name.into(), value);
        }
    }

    /// A copy of this context with one extra binding.
    pub fn with(&self, name: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.bind(name, value);
        next
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.root.get(name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The bindings as a JSON object, for the field accessor.
    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outer_bindings_are_present() {
        let scope = ScanScope::new("azure", "sub-1", "westeurope", "storage");
        let ctx = ResourceContext::for_scope(&scope);
        for name in OUTER_BINDINGS {
            assert!(ctx.is_bound(name), "{name} should be bound");
        }
        assert_eq!(ctx.get("region"), Some(&json!("westeurope")));
    }

    #[test]
    fn with_leaves_original_untouched() {
        let base = ResourceContext::new("aws", "1", "us-east-1", "ec2");
        let child = base.with("item", json!({"id": "i-1"}));
        assert!(child.is_bound("item"));
        assert!(!base.is_bound("item"));
    }
}
