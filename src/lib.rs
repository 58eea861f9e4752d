// src/lib.rs

//! Catalog notifier library
//!
//! Polls a streaming catalog for newly added titles, filters them by recency
//! and region, enriches them with localized metadata, and announces the ones
//! not yet notified to a Discord webhook.

pub mod config;
pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
