//! Workflow monitor library.
//!
//! Polls CI backends for the builds of every monitored workflow, aggregates
//! them into one health status per workflow version and notifies subscribers
//! when builds flip between passing and failing.

pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod migration;
pub mod models;
pub mod services;
pub mod tasks;
