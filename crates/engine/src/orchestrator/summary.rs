use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use skyaudit_core::{CheckResult, VerdictCounts};

/// Totals for one scan run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units_planned: usize,
    pub units_completed: usize,
    /// Planned units that never finished: not dispatched after cancellation,
    /// interrupted mid-run, or aborted after the shutdown grace.
    pub units_aborted: usize,
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub excepted: usize,
    /// Enabled checks whose discovery step produced no resources.
    pub checks_without_resources: usize,
    /// Calls that failed under `on_error: continue`. Each one hides the
    /// resources that call would have produced.
    pub call_gaps: usize,
    pub client_constructions: usize,
}

impl ScanSummary {
    pub fn total_results(&self) -> usize {
        self.pass + self.fail + self.error
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn log(&self) {
        tracing::info!(
            run_id = %self.run_id,
            units_planned = self.units_planned,
            units_completed = self.units_completed,
            units_aborted = self.units_aborted,
            pass = self.pass,
            fail = self.fail,
            error = self.error,
            excepted = self.excepted,
            checks_without_resources = self.checks_without_resources,
            call_gaps = self.call_gaps,
            client_constructions = self.client_constructions,
            duration_ms = self.duration_ms(),
            "scan finished"
        );
    }
}

/// Counters shared by every task of a run.
///
/// Units update it as they finish, so totals survive aborted tasks.
#[derive(Debug, Default)]
pub(super) struct RunStats {
    verdicts: Mutex<VerdictCounts>,
    units_completed: AtomicUsize,
    without_resources: AtomicUsize,
    call_gaps: AtomicUsize,
    client_constructions: AtomicUsize,
}

impl RunStats {
    pub(super) fn record(&self, result: &CheckResult) {
        self.verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(result);
    }

    pub(super) fn unit_completed(&self, without_resources: usize, call_gaps: usize) {
        self.units_completed.fetch_add(1, Ordering::Relaxed);
        self.without_resources.fetch_add(without_resources, Ordering::Relaxed);
        self.call_gaps.fetch_add(call_gaps, Ordering::Relaxed);
    }

    pub(super) fn clients_constructed(&self, n: usize) {
        self.client_constructions.fetch_add(n, Ordering::Relaxed);
    }

    pub(super) fn summarize(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        units_planned: usize,
    ) -> ScanSummary {
        let verdicts = *self.verdicts.lock().unwrap_or_else(PoisonError::into_inner);
        let units_completed = self.units_completed.load(Ordering::Relaxed);
        ScanSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            units_planned,
            units_completed,
            units_aborted: units_planned.saturating_sub(units_completed),
            pass: verdicts.pass,
            fail: verdicts.fail,
            error: verdicts.error,
            excepted: verdicts.excepted,
            checks_without_resources: self.without_resources.load(Ordering::Relaxed),
            call_gaps: self.call_gaps.load(Ordering::Relaxed),
            client_constructions: self.client_constructions.load(Ordering::Relaxed),
        }
    }
}
