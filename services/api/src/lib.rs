//! services/api/src/lib.rs
//!
//! HTTP service for browser tab-time intervals and per-site statistics.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
