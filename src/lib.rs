//! # chartmill
//!
//! Maintenance-and-enrichment job host for clinical document stores.
//!
//! Scans backlog rows in Postgres, runs each row through an external
//! text-classification workflow (Dify) via a bounded worker pool, writes
//! results back, and runs a transactional duplicate-elimination sweep over
//! a MySQL scheduler log table.

pub mod config;
pub mod db;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod model;
pub mod telemetry;
