//! Lead intake and enrichment pipeline.
//!
//! Submissions arrive over HTTP, are stored durably, and flow through an
//! event-driven enrichment workflow: concurrent signal gathering from four
//! external providers, one structured synthesis call that scores and
//! classifies the lead, then classification-based routing. Every external
//! call is cost-accounted in the enrichment log, and every workflow step is
//! memoized so event re-delivery replays instead of re-executing.

pub mod config;
pub mod costs;
pub mod db;
pub mod enrichment_log;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod routing;
pub mod scoring;
pub mod storage;
pub mod tools;
pub mod workflow;
