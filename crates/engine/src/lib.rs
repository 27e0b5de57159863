//! Scan runtime: executes service rule documents against cloud accounts.
//!
//! The orchestrator fans (account, region, service) units out over a
//! two-tier bounded pool. Each unit runs the document's discovery graph
//! through pooled provider clients, evaluates its checks over the emitted
//! items and streams verdicts to a reporting sink.

pub mod cancel;
pub mod checks;
pub mod discovery;
pub mod fixture;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod scope;
pub mod sink;

pub use cancel::CancelToken;
pub use checks::{CheckExecutor, CheckRun};
pub use discovery::{DiscoveryExecutor, DiscoveryOutcome, StepFailure, StepOutput, StepState};
pub use orchestrator::{ScanError, ScanOrchestrator, ScanSummary};
pub use provider::{CallError, ClientError, ClientFactory, ProviderClient};
pub use registry::{ClientHandle, ClientRegistry, ProviderFactories};
pub use scope::{ScopeProvider, StaticScopes};
pub use sink::{ChannelSink, MemorySink, ReportSink};
