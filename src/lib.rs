//! Activity Planner
//!
//! This library provides the core of the activity-planner system: a durable
//! job queue of daily activity planning jobs, the weighted recommendation
//! engine the jobs draw from, and publication of finished plans to
//! S3-compatible blob storage.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
