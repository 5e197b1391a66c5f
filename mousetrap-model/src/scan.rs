use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Lifecycle state of a scan task.
///
/// Allowed transitions: `Pending -> Scanning -> {Finished, Failed}` and
/// `Scanning -> Pending`. `Finished` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ScanState {
    Pending,
    Scanning,
    Finished,
    Failed,
}

impl ScanState {
    pub const ALL: [ScanState; 4] = [
        ScanState::Pending,
        ScanState::Scanning,
        ScanState::Finished,
        ScanState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Pending => "PENDING",
            ScanState::Scanning => "SCANNING",
            ScanState::Finished => "FINISHED",
            ScanState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Finished | ScanState::Failed)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ScanState) -> bool {
        matches!(
            (self, next),
            (ScanState::Pending, ScanState::Scanning)
                | (ScanState::Scanning, ScanState::Finished)
                | (ScanState::Scanning, ScanState::Failed)
                | (ScanState::Scanning, ScanState::Pending)
        )
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanState {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "PENDING" => Ok(ScanState::Pending),
            "SCANNING" => Ok(ScanState::Scanning),
            "FINISHED" => Ok(ScanState::Finished),
            "FAILED" => Ok(ScanState::Failed),
            other => Err(ModelError::UnknownScanState(other.to_string())),
        }
    }
}

/// Verdict recorded on a task. `Pending` until a scan finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ScanResult {
    Pending,
    Clean,
    Infected,
    Failed,
}

impl ScanResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanResult::Pending => "PENDING",
            ScanResult::Clean => "CLEAN",
            ScanResult::Infected => "INFECTED",
            ScanResult::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanResult {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "PENDING" => Ok(ScanResult::Pending),
            "CLEAN" => Ok(ScanResult::Clean),
            "INFECTED" => Ok(ScanResult::Infected),
            "FAILED" => Ok(ScanResult::Failed),
            other => Err(ModelError::UnknownScanResult(other.to_string())),
        }
    }
}

/// What a scan engine reports for one byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Infected(Vec<String>),
    /// The engine could not decide. Treated as a failed scan, never as clean.
    Indeterminate,
}

impl Verdict {
    /// Result to persist for a decisive verdict, `None` when indeterminate.
    pub fn scan_result(&self) -> Option<ScanResult> {
        match self {
            Verdict::Clean => Some(ScanResult::Clean),
            Verdict::Infected(_) => Some(ScanResult::Infected),
            Verdict::Indeterminate => None,
        }
    }

    pub fn viruses(&self) -> &[String] {
        match self {
            Verdict::Infected(names) => names,
            _ => &[],
        }
    }
}
