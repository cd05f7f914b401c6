//! Combined AI adoption reporting.
//!
//! Batch ETL over two usage telemetry sources: the IDE-plugin event ledger
//! and the API-usage ledger. A roster defines who is in scope; the pipeline
//! reconciles identities, aggregates per-user activity, merges the sources,
//! summarizes period-level adoption metrics, and writes a per-user CSV report
//! plus an idempotent month-over-month trend file.
//!
//! Pipeline order: `roster` / `identity` -> `github` + `workbench` ->
//! `merge` -> `metrics` -> `report` + `trends`.

pub mod config;
pub mod dates;
pub mod github;
pub mod identity;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod models;
pub mod records;
pub mod report;
pub mod roster;
pub mod trends;
pub mod workbench;
