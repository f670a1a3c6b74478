//! Per-race, per-stage status machine.
//!
//! `race_status.stepN_status` drives gating and restartability:
//!
//! ```text
//!    null ──► processing ──► completed
//!             │               ▲
//!             ├──► failed ────┘   (when a later run succeeds)
//!             ├──► no_data                (stage 4, empty API payload)
//!             └──► data_not_available     (stage 5, empty HTML)
//! ```
//!
//! `processing` is never terminal: a crash leaves it behind and the next
//! run treats it like pending.

use std::fmt;

/// `races.status` values that mean the race is finished upstream.
pub const FINISHED_RACE_STATUSES: &[&str] = &["3"];

/// The status column is this many characters wide; writes truncate to fit.
pub const STATUS_COLUMN_WIDTH: usize = 10;

pub fn is_finished_race_status(status: &str) -> bool {
    FINISHED_RACE_STATUSES.contains(&status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepStatus {
    Processing,
    Completed,
    Failed,
    NoData,
    DataNotAvailable,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Processing => "processing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::NoData => "no_data",
            StepStatus::DataNotAvailable => "data_not_available",
        }
    }

    /// True for every state a finished run may leave behind.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Processing)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage's column of `race_status` to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepColumn {
    Step2,
    Step3,
    Step4,
    Step5,
}

impl StepColumn {
    pub fn column(&self) -> &'static str {
        match self {
            StepColumn::Step2 => "step2_status",
            StepColumn::Step3 => "step3_status",
            StepColumn::Step4 => "step4_status",
            StepColumn::Step5 => "step5_status",
        }
    }
}

/// Clip a status string to the column width, on a char boundary.
pub fn truncate_status(status: &str) -> String {
    status.chars().take(STATUS_COLUMN_WIDTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_processing_is_non_terminal() {
        assert!(!StepStatus::Processing.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::NoData.is_terminal());
        assert!(StepStatus::DataNotAvailable.is_terminal());
    }

    #[test]
    fn finished_means_status_three() {
        assert!(is_finished_race_status("3"));
        assert!(!is_finished_race_status("2"));
        assert!(!is_finished_race_status(""));
    }

    #[test]
    fn statuses_fit_the_column_after_truncation() {
        assert_eq!(truncate_status("processing"), "processing");
        assert_eq!(truncate_status("completed"), "completed");
        assert_eq!(truncate_status("data_not_available"), "data_not_a");
        for status in [
            StepStatus::Processing,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::NoData,
            StepStatus::DataNotAvailable,
        ] {
            assert!(truncate_status(status.as_str()).chars().count() <= STATUS_COLUMN_WIDTH);
        }
    }

    #[test]
    fn step_columns_name_their_fields() {
        assert_eq!(StepColumn::Step2.column(), "step2_status");
        assert_eq!(StepColumn::Step5.column(), "step5_status");
    }
}
