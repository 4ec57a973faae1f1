//! Application layer orchestrating invoice charging.
//!
//! `BatchDispatcher` owns the single charging pipeline and fans every reserved
//! batch out to `ChargeWorker`s, one `tokio` task per invoice.

pub mod charger;
pub mod dispatcher;
