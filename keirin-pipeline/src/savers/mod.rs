//! Savers: per-stage transactional batch upserts.
//!
//! Every multi-table save opens one transaction, writes its tables in the
//! configured lock order, and commits; the `upsert_*` helpers take the
//! open transaction connection and never commit themselves. Booleans are
//! stored as 0/1 tinyints throughout.

pub mod status;
pub mod step1;
pub mod step2;
pub mod step3;
pub mod step4;
pub mod step5;

pub use status::StatusSaver;
pub use step1::Step1Saver;
pub use step2::Step2Saver;
pub use step3::Step3Saver;
pub use step4::Step4Saver;
pub use step5::Step5Saver;

/// 0/1 encoding used for every boolean column.
pub(crate) fn tinyint(flag: bool) -> i64 {
    flag as i64
}
