pub mod billing;
pub mod cache;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod stats;
