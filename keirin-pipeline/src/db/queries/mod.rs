pub mod cups;
pub mod entries;
pub mod odds;
pub mod races;
