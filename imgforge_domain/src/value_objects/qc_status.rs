//! `QcStatus` — spec §3 GeneratedImage: `qc_status ∈ {pending, approved,
//! qc_failed, retry_pending, retry_failed}`, with the invariant
//! `qc_status=approved ⇒ final_path ≠ null`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    Pending,
    Approved,
    QcFailed,
    RetryPending,
    RetryFailed,
}

impl QcStatus {
    /// Whether this status requires a non-null `final_path` to be a valid
    /// row (spec §3 invariant).
    pub fn requires_final_path(self) -> bool {
        matches!(self, QcStatus::Approved)
    }

    pub fn is_terminal_success(self) -> bool {
        matches!(self, QcStatus::Approved)
    }

    pub fn is_terminal_failure(self) -> bool {
        matches!(self, QcStatus::QcFailed | QcStatus::RetryFailed)
    }
}

impl std::fmt::Display for QcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QcStatus::Pending => "pending",
            QcStatus::Approved => "approved",
            QcStatus::QcFailed => "qc_failed",
            QcStatus::RetryPending => "retry_pending",
            QcStatus::RetryFailed => "retry_failed",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for QcStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QcStatus::Pending),
            "approved" => Ok(QcStatus::Approved),
            "qc_failed" => Ok(QcStatus::QcFailed),
            "retry_pending" => Ok(QcStatus::RetryPending),
            "retry_failed" => Ok(QcStatus::RetryFailed),
            other => Err(format!("unknown qc status: {other}")),
        }
    }
}
