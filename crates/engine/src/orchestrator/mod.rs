//! Scan orchestrator: fans (account, region, service) units out over a
//! two-tier bounded pool.
//!
//! The outer semaphore bounds how many accounts are scanned at once; each
//! account then runs its units under its own inner semaphore and owns one
//! [`ClientRegistry`] for the whole account. Results go to the sink as soon
//! as a unit finishes. Cancellation stops dispatch; in-flight units get the
//! configured grace period before their tasks are aborted.

mod summary;


use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use skyaudit_core::{Account, ScanConfig, ScanScope, ScopeKey, VerdictCounts, GLOBAL_REGION};
use skyaudit_rules::loader::RuleSet;
use skyaudit_rules::schema::{ServiceDocument, ServiceScopeKind};

use crate::cancel::CancelToken;
use crate::checks::CheckExecutor;
use crate::discovery::DiscoveryExecutor;
use crate::registry::{ClientRegistry, ProviderFactories};
use crate::scope::{ScopeError, ScopeProvider};
use crate::sink::ReportSink;

use summary::RunStats;
pub use summary::ScanSummary;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scope provider failed: {0}")]
    Scope(#[from] ScopeError),

    #[error("scan task failed: {0}")]
    Join(#[from] JoinError),
}

// ── Planning ────────────────────────────────────────────────────────

/// One unit of work: a document evaluated in one (account, region).
#[derive(Debug, Clone)]
pub struct ScanUnit {
    pub document: Arc<ServiceDocument>,
    pub scope: ScanScope,
    pub key: ScopeKey,
}

impl ScanUnit {
    fn new(document: &Arc<ServiceDocument>, account: &Account, region: &str) -> Self {
        Self {
            scope: ScanScope::new(
                account.provider.as_str(),
                account.id.as_str(),
                region,
                document.service(),
            ),
            key: ScopeKey::for_account(account, region),
            document: document.clone(),
        }
    }
}

/// All units of one account.
#[derive(Debug, Clone)]
pub struct AccountPlan {
    pub account: Account,
    pub units: Vec<ScanUnit>,
}

// ── Orchestrator ────────────────────────────────────────────────────

/// State shared by every task of a run.
struct Shared {
    config: ScanConfig,
    factories: Arc<ProviderFactories>,
    sink: Arc<dyn ReportSink>,
    discovery: DiscoveryExecutor,
    checks: CheckExecutor,
}

pub struct ScanOrchestrator {
    shared: Arc<Shared>,
    rules: RuleSet,
}

impl ScanOrchestrator {
    pub fn new(
        config: ScanConfig,
        rules: RuleSet,
        factories: ProviderFactories,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        let discovery = DiscoveryExecutor::from_config(&config.concurrency);
        let checks = CheckExecutor::new(config.disabled_rules.iter().cloned());
        Self {
            shared: Arc::new(Shared {
                config,
                factories: Arc::new(factories),
                sink,
                discovery,
                checks,
            }),
            rules,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Cross product of accounts, regions and enabled documents after
    /// filtering. Global documents get one unit per account.
    pub fn plan(&self, accounts: &[Account]) -> Vec<AccountPlan> {
        let filter = &self.shared.config.filter;
        let mut plans = Vec::new();

        for account in accounts {
            if !filter.allows_account(&account.id) {
                debug!(account = %account.id, "account filtered out");
                continue;
            }
            if !self.shared.factories.contains(&account.provider) {
                warn!(
                    account = %account.id,
                    provider = %account.provider,
                    "no client factory registered for provider, its units will report errors"
                );
            }

            let mut units = Vec::new();
            for doc in self.rules.enabled() {
                if doc.provider() != account.provider || !filter.allows_service(doc.service()) {
                    continue;
                }
                match doc.metadata.scope {
                    ServiceScopeKind::Global => units.push(ScanUnit::new(doc, account, GLOBAL_REGION)),
                    ServiceScopeKind::Regional => {
                        for region in account.regions.iter().filter(|r| filter.allows_region(r)) {
                            units.push(ScanUnit::new(doc, account, region));
                        }
                    }
                }
            }

            if !units.is_empty() {
                plans.push(AccountPlan {
                    account: account.clone(),
                    units,
                });
            }
        }

        plans
    }

    /// Run one scan over the accounts yielded by `scopes`.
    pub async fn run(
        &self,
        scopes: &dyn ScopeProvider,
        cancel: CancelToken,
    ) -> Result<ScanSummary, ScanError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let accounts = scopes.accounts().await?;
        let plans = self.plan(&accounts);
        let units_planned: usize = plans.iter().map(|p| p.units.len()).sum();
        info!(
            run_id = %run_id,
            accounts = plans.len(),
            units = units_planned,
            documents = self.rules.len(),
            checks = self.rules.check_count(),
            "scan started"
        );

        let stats = Arc::new(RunStats::default());
        let concurrency = &self.shared.config.concurrency;
        let account_sem = Arc::new(Semaphore::new(concurrency.max_concurrent_accounts.max(1)));

        let mut tasks = JoinSet::new();
        for plan in plans {
            let shared = self.shared.clone();
            let stats = stats.clone();
            let sem = account_sem.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return;
                };
                if cancel.is_cancelled() {
                    return;
                }
                shared.run_account(plan, &stats, &cancel).await;
            });
        }

        let grace = concurrency.shutdown_grace();
        let mut deadline: Option<Instant> = None;
        let mut aborted = false;
        let mut failure: Option<JoinError> = None;

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(())) => {}
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => {
                        error!(run_id = %run_id, error = %e, "account task panicked");
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                },
                _ = cancel.cancelled(), if deadline.is_none() => {
                    warn!(
                        run_id = %run_id,
                        grace_ms = grace.as_millis() as u64,
                        "scan cancelled, waiting for in-flight units"
                    );
                    deadline = Some(Instant::now() + grace);
                }
                _ = wait_until(deadline), if deadline.is_some() && !aborted => {
                    warn!(run_id = %run_id, in_flight = tasks.len(), "shutdown grace elapsed, aborting units");
                    tasks.abort_all();
                    aborted = true;
                }
            }
        }

        if let Some(e) = failure {
            return Err(ScanError::Join(e));
        }

        let summary = stats.summarize(run_id, started_at, units_planned);
        summary.log();
        Ok(summary)
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Shared {
    async fn run_account(self: Arc<Self>, plan: AccountPlan, stats: &Arc<RunStats>, cancel: &CancelToken) {
        let account_id = plan.account.id.clone();
        let registry = Arc::new(ClientRegistry::new(self.factories.clone()));
        let unit_sem = Arc::new(Semaphore::new(self.config.concurrency.max_concurrent_units.max(1)));
        debug!(account = %account_id, units = plan.units.len(), "account started");

        let mut units = JoinSet::new();
        for unit in plan.units {
            if cancel.is_cancelled() {
                break;
            }
            let shared = self.clone();
            let registry = registry.clone();
            let sem = unit_sem.clone();
            let stats = stats.clone();
            let cancel = cancel.clone();
            units.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return;
                };
                if cancel.is_cancelled() {
                    return;
                }
                shared.run_unit(&unit, &registry, &stats, &cancel).await;
            });
        }

        while let Some(joined) = units.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(account = %account_id, error = %e, "unit task panicked");
                }
            }
        }

        let clients = registry.stats();
        stats.clients_constructed(clients.constructed);
        info!(
            account = %account_id,
            clients_constructed = clients.constructed,
            clients_reused = clients.reused,
            client_failures = clients.failed,
            "account finished"
        );
    }

    async fn run_unit(
        &self,
        unit: &ScanUnit,
        registry: &ClientRegistry,
        stats: &RunStats,
        cancel: &CancelToken,
    ) {
        let doc = &unit.document;
        let outcome = self
            .discovery
            .run(doc, &unit.scope, &unit.key, registry, cancel)
            .await;

        // An interrupted unit reports nothing; it counts as aborted.
        if outcome.was_cancelled() {
            debug!(document_id = %doc.id(), scope = %unit.scope, "unit interrupted by cancellation");
            return;
        }

        let run = self.checks.run(doc, &outcome, &unit.scope);
        let mut counts = VerdictCounts::default();
        for mut result in run.results {
            if let Some(exception) = self.config.exception_for(&result) {
                result.excepted = true;
                debug!(
                    rule_id = %result.rule_id,
                    resource = ?result.resource_id,
                    reason = ?exception.reason,
                    "result covered by exception"
                );
            }
            counts.record(&result);
            stats.record(&result);
            self.sink.report(result);
        }
        let gaps = outcome.gaps().count();
        stats.unit_completed(run.without_resources, gaps);

        info!(
            document_id = %doc.id(),
            scope = %unit.scope,
            pass = counts.pass,
            fail = counts.fail,
            error = counts.error,
            excepted = counts.excepted,
            gaps,
            calls = outcome.calls(),
            "unit completed"
        );
    }
}
