//! # Keirin Pipeline
//!
//! Five-stage ingestion engine for keirin racing data:
//!
//! 1. monthly listings (regions, venues, cups)
//! 2. cup details (schedules, races)
//! 3. race cards (players, entries, records, line predictions)
//! 4. odds (seven bet types + odds status)
//! 5. results scraped from HTML (finishing order, laps, comments, reports)
//!
//! Each stage reads candidate work from the database, fetches from the
//! upstream, transforms and persists through its saver, and records the
//! outcome in `race_status` so re-runs are incremental and idempotent.

pub mod config;
pub mod db;
pub mod savers;
pub mod status;
pub mod updaters;
