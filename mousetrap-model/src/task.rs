use crate::EpochMillis;
use crate::scan::{ScanResult, ScanState};

/// Sentinel stored for timestamps that have not been reached yet.
pub const UNSET_TS: EpochMillis = -1;

/// One tracked scan request for a single file path. The only persistent
/// entity; `file_path` is the unique key.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Task {
    pub file_path: String,
    pub scan_state: ScanState,
    pub created_ts: EpochMillis,
    pub scan_start_ts: EpochMillis,
    pub scan_end_ts: EpochMillis,
    pub scan_result: ScanResult,
    pub viruses: Vec<String>,
    pub scan_attempts: u32,
    pub size_mb: f64,
    pub file_hash: String,
    pub notify_channels: Vec<String>,
}

impl Task {
    /// Build the PENDING row written by ingestion.
    pub fn pending(new: NewTask, created_ts: EpochMillis) -> Self {
        Self {
            file_path: new.file_path,
            scan_state: ScanState::Pending,
            created_ts,
            scan_start_ts: UNSET_TS,
            scan_end_ts: UNSET_TS,
            scan_result: ScanResult::Pending,
            viruses: Vec::new(),
            scan_attempts: 0,
            size_mb: new.size_mb,
            file_hash: new.file_hash,
            notify_channels: new.notify_channels,
        }
    }

    pub fn scan_started_at(&self) -> Option<EpochMillis> {
        (self.scan_start_ts != UNSET_TS).then_some(self.scan_start_ts)
    }

    pub fn scan_ended_at(&self) -> Option<EpochMillis> {
        (self.scan_end_ts != UNSET_TS).then_some(self.scan_end_ts)
    }

    /// A SCANNING task whose claim is older than `stale_after_ms` at `now`.
    pub fn is_stale(&self, now: EpochMillis, stale_after_ms: i64) -> bool {
        self.scan_state == ScanState::Scanning
            && now > self.scan_start_ts.saturating_add(stale_after_ms)
    }

    /// Apply a transition in place. Used by stores that hold rows in memory.
    pub fn apply(&mut self, transition: &TaskTransition) {
        self.scan_state = transition.to;
        if let Some(started) = transition.scan_start_ts {
            self.scan_start_ts = started;
        }
        if transition.increment_attempts {
            self.scan_attempts = self.scan_attempts.saturating_add(1);
        }
    }
}

/// Fields supplied by ingestion when creating (or overwriting) a task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub file_path: String,
    pub size_mb: f64,
    pub file_hash: String,
    pub notify_channels: Vec<String>,
}

/// A single-row state change, optionally guarded by the state the caller
/// expects the row to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTransition {
    /// Apply only when the stored state still equals this value.
    pub expected: Option<ScanState>,
    pub to: ScanState,
    pub scan_start_ts: Option<EpochMillis>,
    pub increment_attempts: bool,
}

impl TaskTransition {
    /// PENDING -> SCANNING, guarded on PENDING.
    pub fn claim(now: EpochMillis) -> Self {
        Self {
            expected: Some(ScanState::Pending),
            to: ScanState::Scanning,
            scan_start_ts: Some(now),
            increment_attempts: false,
        }
    }

    /// SCANNING -> PENDING, guarded on SCANNING, with the attempt counter
    /// untouched. Used by stale reclaim; a row its owner finished after the
    /// listing is left terminal.
    pub fn requeue() -> Self {
        Self {
            expected: Some(ScanState::Scanning),
            to: ScanState::Pending,
            scan_start_ts: None,
            increment_attempts: false,
        }
    }

    /// Same write as [`TaskTransition::requeue`], issued on shutdown for the
    /// task this process holds.
    pub fn release() -> Self {
        Self::requeue()
    }

    /// Whether a row currently in `state` satisfies the guard.
    pub fn guard_allows(&self, state: ScanState) -> bool {
        self.expected.is_none_or(|expected| expected == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        Task::pending(
            NewTask {
                file_path: "s3://bucket/a.csv".into(),
                size_mb: 1.0,
                file_hash: "abc".into(),
                notify_channels: vec![],
            },
            1_000,
        )
    }

    #[test]
    fn pending_row_has_unset_timestamps() {
        let task = sample();
        assert_eq!(task.scan_state, ScanState::Pending);
        assert_eq!(task.scan_result, ScanResult::Pending);
        assert_eq!(task.scan_started_at(), None);
        assert_eq!(task.scan_ended_at(), None);
        assert_eq!(task.scan_attempts, 0);
    }

    #[test]
    fn claim_guard_rejects_non_pending_rows() {
        let claim = TaskTransition::claim(5);
        assert!(claim.guard_allows(ScanState::Pending));
        assert!(!claim.guard_allows(ScanState::Scanning));
        assert!(TaskTransition::requeue().guard_allows(ScanState::Scanning));
        assert!(!TaskTransition::requeue().guard_allows(ScanState::Finished));
        assert!(!TaskTransition::requeue().guard_allows(ScanState::Failed));
        assert!(!TaskTransition::release().guard_allows(ScanState::Finished));
    }

    #[test]
    fn staleness_is_strictly_after_the_timeout() {
        let mut task = sample();
        task.apply(&TaskTransition::claim(10_000));
        assert!(!task.is_stale(15_000, 5_000));
        assert!(task.is_stale(15_001, 5_000));

        task.apply(&TaskTransition::requeue());
        assert!(!task.is_stale(1_000_000, 5_000));
        assert_eq!(task.scan_start_ts, 10_000);
        assert_eq!(task.scan_attempts, 0);
    }
}
