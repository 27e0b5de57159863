//! Client registry: one pooled client per (provider, package, scope).
//!
//! A registry lives for one account unit of one scan run and is dropped with
//! it, which is the only eviction policy. Construction happens at most once
//! per key even when several units ask concurrently; a failed construction
//! is not cached, so a later caller retries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use skyaudit_core::ScopeKey;

use crate::provider::{CallError, ClientError, ClientFactory, ProviderClient};

// ── Factories ───────────────────────────────────────────────────────

/// Provider name -> client factory.
#[derive(Clone, Default)]
pub struct ProviderFactories {
    factories: HashMap<String, Arc<dyn ClientFactory>>,
}

impl ProviderFactories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: impl Into<String>, factory: Arc<dyn ClientFactory>) {
        self.factories.insert(provider.into(), factory);
    }

    pub fn with(mut self, provider: impl Into<String>, factory: Arc<dyn ClientFactory>) -> Self {
        self.register(provider, factory);
        self
    }

    pub fn get(&self, provider: &str) -> Option<&Arc<dyn ClientFactory>> {
        self.factories.get(provider)
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.factories.contains_key(provider)
    }
}

impl std::fmt::Debug for ProviderFactories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ProviderFactories").field("providers", &names).finish()
    }
}

// ── Handles ─────────────────────────────────────────────────────────

/// A pooled client bound to the logical service it was requested for.
#[derive(Clone)]
pub struct ClientHandle {
    pub service: String,
    pub package: String,
    client: Arc<dyn ProviderClient>,
}

impl ClientHandle {
    pub async fn invoke(&self, action: &str, params: &Value) -> Result<Value, CallError> {
        self.client.invoke(action, params).await
    }

    /// Whether two handles share the same underlying client.
    pub fn same_client(&self, other: &ClientHandle) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("service", &self.service)
            .field("package", &self.package)
            .finish()
    }
}

// ── Registry ────────────────────────────────────────────────────────

type CacheKey = (String, String, ScopeKey);
type ClientCell = Arc<OnceCell<Arc<dyn ProviderClient>>>;

/// Construction and reuse counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub constructed: usize,
    pub reused: usize,
    pub failed: usize,
}

pub struct ClientRegistry {
    factories: Arc<ProviderFactories>,
    cells: Mutex<HashMap<CacheKey, ClientCell>>,
    constructed: AtomicUsize,
    reused: AtomicUsize,
    failed: AtomicUsize,
}

impl ClientRegistry {
    pub fn new(factories: Arc<ProviderFactories>) -> Self {
        Self {
            factories,
            cells: Mutex::new(HashMap::new()),
            constructed: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Get (or construct) the client serving `service` for `scope`.
    pub async fn get_client(
        &self,
        provider: &str,
        service: &str,
        scope: &ScopeKey,
    ) -> Result<ClientHandle, ClientError> {
        let factory = self
            .factories
            .get(provider)
            .ok_or_else(|| ClientError::UnknownProvider(provider.to_string()))?;
        let package = factory.package_for(service);

        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            cells
                .entry((provider.to_string(), package.clone(), scope.clone()))
                .or_default()
                .clone()
        };

        let built = AtomicBool::new(false);
        let client = cell
            .get_or_try_init(|| async {
                built.store(true, Ordering::Relaxed);
                factory.create(&package, scope).await
            })
            .await
            .map_err(|e| {
                self.failed.fetch_add(1, Ordering::Relaxed);
                e
            })?
            .clone();

        if built.load(Ordering::Relaxed) {
            self.constructed.fetch_add(1, Ordering::Relaxed);
            debug!(provider, package = %package, scope = %scope, "constructed provider client");
        } else {
            self.reused.fetch_add(1, Ordering::Relaxed);
        }

        Ok(ClientHandle {
            service: service.to_string(),
            package,
            client,
        })
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            constructed: self.constructed.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
