//! Updaters: one orchestrator per pipeline stage. Each fetches from the
//! upstream, transforms into saver rows, persists, and sweeps
//! `race_status` to a terminal state.

pub mod line;
pub mod step1;
pub mod step2;
pub mod step3;
pub mod step4;
pub mod step5;

pub use step1::{Step1Summary, Step1Updater};
pub use step2::{Step2Summary, Step2Updater};
pub use step3::{Step3Summary, Step3Updater};
pub use step4::{Step4Summary, Step4Updater};
pub use step5::{Step5Summary, Step5Updater};

/// Races handled per batch in stages 3-5.
pub(crate) const RACE_BATCH_SIZE: usize = 50;
