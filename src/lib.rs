//! Movie catalog background worker.
//!
//! Builds ranked movie lists from the public IMDb datasets, enriches stored
//! records with poster and synopsis data from TMDB, and coordinates the
//! whole pipeline through a durable SQLite-backed job queue.

pub mod config;
pub mod constants;
pub mod datasets;
pub mod db;
pub mod jobs;
pub mod tmdb;
