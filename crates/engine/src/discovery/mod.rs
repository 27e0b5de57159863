//! Discovery executor: runs a document's discovery graph for one scope.
//!
//! Steps run in dependency order (`for_each` edges). Each step moves
//! `Pending -> Running -> Completed | Failed`; a step only runs once the
//! step it iterates has completed, and a failed or cancelled step fails
//! every step that depends on it.

mod emit;

#[cfg(test)]
mod tests;

use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use skyaudit_core::{ConcurrencyConfig, ScanScope, ScopeKey};
use skyaudit_rules::accessor::AccessError;
use skyaudit_rules::context::ResourceContext;
use skyaudit_rules::graph::{self, GraphError};
use skyaudit_rules::schema::{Call, DiscoveryStep, OnError, ServiceDocument};
use skyaudit_rules::template::render_value;

use crate::cancel::CancelToken;
use crate::provider::{CallError, ClientError};
use crate::registry::{ClientHandle, ClientRegistry};

pub use emit::{next_token, project, resource_id, RESPONSE_BINDING};

// ── Step state ──────────────────────────────────────────────────────

/// One projected item with its resource identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedItem {
    pub id: String,
    pub value: Value,
    /// Resource id of the parent item for `for_each` steps.
    pub parent_id: Option<String>,
}

/// A call that failed under `on_error: continue` and contributed no items.
#[derive(Debug, Clone, PartialEq)]
pub struct CallGap {
    /// `client.action` of the failed call.
    pub call: String,
    pub parent_id: Option<String>,
    pub reason: String,
}

/// Items and gaps produced by a completed step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    pub items: Vec<EmittedItem>,
    pub gaps: Vec<CallGap>,
    /// Provider calls issued, pages included.
    pub calls: usize,
}

/// Why a step failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepFailure {
    #[error("{call} failed{}: {error}", for_parent(.parent_id))]
    Call {
        call: String,
        parent_id: Option<String>,
        error: CallError,
    },

    #[error("emit projection of {call} failed{}: {error}", for_parent(.parent_id))]
    Emit {
        call: String,
        parent_id: Option<String>,
        error: AccessError,
    },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("dependency '{0}' failed")]
    DependencyFailed(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Graph(#[from] GraphError),
}

fn for_parent(parent_id: &Option<String>) -> String {
    parent_id
        .as_ref()
        .map(|p| format!(" for '{p}'"))
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub enum StepState {
    Pending,
    Running,
    Completed(StepOutput),
    Failed(StepFailure),
}

impl StepState {
    pub fn output(&self) -> Option<&StepOutput> {
        match self {
            StepState::Completed(out) => Some(out),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            StepState::Failed(f) => Some(f),
            _ => None,
        }
    }
}

/// Final state of every step of one document run.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    step_ids: Vec<String>,
    states: Vec<StepState>,
    executed: Vec<usize>,
}

impl DiscoveryOutcome {
    pub fn state(&self, step_id: &str) -> Option<&StepState> {
        self.index(step_id).map(|i| &self.states[i])
    }

    pub fn output(&self, step_id: &str) -> Option<&StepOutput> {
        self.state(step_id).and_then(StepState::output)
    }

    pub fn failure(&self, step_id: &str) -> Option<&StepFailure> {
        self.state(step_id).and_then(StepState::failure)
    }

    /// Ids of the steps that actually issued calls, in execution order.
    pub fn execution_order(&self) -> Vec<&str> {
        self.executed.iter().map(|&i| self.step_ids[i].as_str()).collect()
    }

    /// Every recorded gap, tagged with its step id.
    pub fn gaps(&self) -> impl Iterator<Item = (&str, &CallGap)> {
        self.step_ids
            .iter()
            .zip(&self.states)
            .filter_map(|(id, state)| state.output().map(|out| (id.as_str(), out)))
            .flat_map(|(id, out)| out.gaps.iter().map(move |g| (id, g)))
    }

    pub fn calls(&self) -> usize {
        self.states.iter().filter_map(StepState::output).map(|o| o.calls).sum()
    }

    pub fn failed_steps(&self) -> usize {
        self.states.iter().filter(|s| s.failure().is_some()).count()
    }

    /// Whether cancellation interrupted any step.
    pub fn was_cancelled(&self) -> bool {
        self.states
            .iter()
            .any(|s| matches!(s, StepState::Failed(StepFailure::Cancelled)))
    }

    fn index(&self, step_id: &str) -> Option<usize> {
        self.step_ids.iter().position(|id| id == step_id)
    }
}

// ── Executor ────────────────────────────────────────────────────────

/// Failure of a single call before the `on_error` policy is applied.
enum CallFailure {
    Call(CallError),
    Emit(AccessError),
    Cancelled,
}

/// Collaborators shared by every step of one unit.
struct UnitEnv<'a> {
    provider: &'a str,
    base: ResourceContext,
    key: &'a ScopeKey,
    registry: &'a ClientRegistry,
    cancel: &'a CancelToken,
}

/// Items, gaps and call count for one parent item (or the root pass).
struct Partial {
    parent_id: Option<String>,
    values: Vec<Value>,
    gaps: Vec<CallGap>,
    calls: usize,
}

#[derive(Debug, Clone)]
pub struct DiscoveryExecutor {
    item_concurrency: usize,
    call_timeout: Duration,
}

impl DiscoveryExecutor {
    pub fn new(item_concurrency: usize, call_timeout: Duration) -> Self {
        Self {
            item_concurrency: item_concurrency.max(1),
            call_timeout,
        }
    }

    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        Self::new(config.item_concurrency, config.call_timeout())
    }

    /// Run every discovery step of `doc` for one scope.
    pub async fn run(
        &self,
        doc: &ServiceDocument,
        scope: &ScanScope,
        key: &ScopeKey,
        registry: &ClientRegistry,
        cancel: &CancelToken,
    ) -> DiscoveryOutcome {
        let step_ids: Vec<String> = doc.discovery.iter().map(|s| s.id.clone()).collect();
        let mut states = vec![StepState::Pending; step_ids.len()];
        let mut executed = Vec::new();

        let order = match graph::discovery_order(doc) {
            Ok(order) => order,
            Err(e) => {
                warn!(document_id = %doc.id(), error = %e, "discovery graph rejected");
                let states = vec![StepState::Failed(StepFailure::Graph(e)); step_ids.len()];
                return DiscoveryOutcome {
                    step_ids,
                    states,
                    executed,
                };
            }
        };

        let env = UnitEnv {
            provider: doc.provider(),
            base: ResourceContext::for_scope(scope),
            key,
            registry,
            cancel,
        };

        for idx in order {
            let step = &doc.discovery[idx];

            let parent_idx = step.for_each.as_deref().and_then(|p| doc.step_index(p));
            if let (Some(parent), Some(p)) = (&step.for_each, parent_idx) {
                if !matches!(states[p], StepState::Completed(_)) {
                    states[idx] = StepState::Failed(StepFailure::DependencyFailed(parent.clone()));
                    continue;
                }
            }

            if cancel.is_cancelled() {
                states[idx] = StepState::Failed(StepFailure::Cancelled);
                continue;
            }

            states[idx] = StepState::Running;
            executed.push(idx);

            let parents = parent_idx
                .and_then(|p| states[p].output())
                .map(|out| out.items.as_slice());
            let result = self.run_step(step, parents, &env).await;

            states[idx] = match result {
                Ok(out) => {
                    debug!(
                        document_id = %doc.id(),
                        step = %step.id,
                        scope = %scope,
                        items = out.items.len(),
                        gaps = out.gaps.len(),
                        calls = out.calls,
                        "discovery step completed"
                    );
                    StepState::Completed(out)
                }
                Err(failure) => {
                    warn!(
                        document_id = %doc.id(),
                        step = %step.id,
                        scope = %scope,
                        error = %failure,
                        "discovery step failed"
                    );
                    StepState::Failed(failure)
                }
            };
        }

        DiscoveryOutcome {
            step_ids,
            states,
            executed,
        }
    }

    async fn run_step(
        &self,
        step: &DiscoveryStep,
        parents: Option<&[EmittedItem]>,
        env: &UnitEnv<'_>,
    ) -> Result<StepOutput, StepFailure> {
        // A client that cannot be built fails the step whatever `on_error` says.
        let mut handles = Vec::with_capacity(step.calls.len());
        for call in &step.calls {
            handles.push(env.registry.get_client(env.provider, &call.client, env.key).await?);
        }

        let contexts: Vec<(Option<String>, ResourceContext)> = match parents {
            None => vec![(None, env.base.clone())],
            Some(items) => items
                .iter()
                .map(|item| {
                    (
                        Some(item.id.clone()),
                        env.base.with(step.alias.as_str(), item.value.clone()),
                    )
                })
                .collect(),
        };

        let handles = &handles;
        let partials: Vec<Partial> = stream::iter(contexts)
            .map(|(parent_id, ctx)| self.run_for_context(step, handles, parent_id, ctx, env.cancel))
            .buffered(self.item_concurrency)
            .try_collect()
            .await?;

        let mut out = StepOutput::default();
        for partial in partials {
            for value in partial.values {
                let id = resource_id(&step.emit, &step.id, out.items.len(), &value);
                out.items.push(EmittedItem {
                    id,
                    value,
                    parent_id: partial.parent_id.clone(),
                });
            }
            out.gaps.extend(partial.gaps);
            out.calls += partial.calls;
        }
        Ok(out)
    }

    async fn run_for_context(
        &self,
        step: &DiscoveryStep,
        handles: &[ClientHandle],
        parent_id: Option<String>,
        ctx: ResourceContext,
        cancel: &CancelToken,
    ) -> Result<Partial, StepFailure> {
        let mut partial = Partial {
            parent_id,
            values: Vec::new(),
            gaps: Vec::new(),
            calls: 0,
        };

        for (call, handle) in step.calls.iter().zip(handles) {
            let label = format!("{}.{}", call.client, call.action);
            let propagate = call.on_error == OnError::Propagate;
            let reason = match self.run_call(step, call, handle, &ctx, cancel, &mut partial.calls).await {
                Ok(values) => {
                    partial.values.extend(values);
                    continue;
                }
                Err(CallFailure::Cancelled) => return Err(StepFailure::Cancelled),
                Err(CallFailure::Call(error)) if propagate => {
                    return Err(StepFailure::Call {
                        call: label,
                        parent_id: partial.parent_id,
                        error,
                    })
                }
                Err(CallFailure::Emit(error)) if propagate => {
                    return Err(StepFailure::Emit {
                        call: label,
                        parent_id: partial.parent_id,
                        error,
                    })
                }
                Err(CallFailure::Call(error)) => error.to_string(),
                Err(CallFailure::Emit(error)) => error.to_string(),
            };

            debug!(step = %step.id, call = %label, parent = ?partial.parent_id, reason = %reason, "call gap");
            partial.gaps.push(CallGap {
                call: label,
                parent_id: partial.parent_id.clone(),
                reason,
            });
        }

        Ok(partial)
    }

    /// Issue one call (all pages) and project the responses. A failed call
    /// contributes no items, even if earlier pages succeeded.
    async fn run_call(
        &self,
        step: &DiscoveryStep,
        call: &Call,
        handle: &ClientHandle,
        ctx: &ResourceContext,
        cancel: &CancelToken,
        calls: &mut usize,
    ) -> Result<Vec<Value>, CallFailure> {
        let raw = Value::Object(call.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        let mut params = render_value(&raw, ctx).map_err(|e| CallFailure::Call(CallError::Render(e)))?;

        let mut values = Vec::new();
        let mut pages = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(CallFailure::Cancelled);
            }

            *calls += 1;
            let response = match tokio::time::timeout(self.call_timeout, handle.invoke(&call.action, &params)).await {
                Ok(result) => result.map_err(CallFailure::Call)?,
                Err(_) => return Err(CallFailure::Call(CallError::Timeout(self.call_timeout))),
            };

            let scope = ctx.with(RESPONSE_BINDING, response);
            values.extend(project(&step.emit, &scope).map_err(CallFailure::Emit)?);
            pages += 1;

            let Some(page) = &call.paginate else { break };
            let Some(token) = next_token(page, &scope).map_err(CallFailure::Emit)? else {
                break;
            };
            if pages >= page.max_pages {
                warn!(step = %step.id, action = %call.action, max_pages = page.max_pages, "pagination limit reached");
                break;
            }
            if let Value::Object(map) = &mut params {
                map.insert(page.token_param.clone(), Value::String(token));
            }
        }

        Ok(values)
    }
}
