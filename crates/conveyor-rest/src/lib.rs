//! # Conveyor REST
//!
//! HTTP administrative API for the Conveyor job queue, built on Axum.
//! Exposes enqueue, cancel, inspection and queue statistics endpoints as a
//! thin layer over [`conveyor_jobs::JobQueue`], plus health probes and an
//! optional Prometheus scrape endpoint.

pub mod controllers;
pub mod extractors;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;

pub use router::*;
pub use state::*;
