//! # Keirin Contracts
//!
//! Shared payload types for the keirin data pipeline.
//!
//! ## Contents
//!
//! - **winticket** - typed views of the Winticket JSON API responses
//!   (monthly listings, cup details, race cards, odds)
//! - **result_page** - the parsed-HTML handoff between the Yenjoy result
//!   page parser and the stage-5 updater
//! - **de** - tolerant deserializers for upstream scalar quirks (booleans
//!   as strings, numbers as strings, four timestamp formats)

pub mod de;
pub mod result_page;
pub mod winticket;

pub use result_page::*;
pub use winticket::*;
