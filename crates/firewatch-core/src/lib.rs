//! firewatch-core - Core library for Firewatch
//!
//! This crate contains the offline mutation queue that carries fire reports,
//! report updates, image uploads, and sync requests from the device to the
//! backend, together with its durable stores, backend dispatch, and
//! reachability probing.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod network;
pub mod queue;
pub mod store;
pub mod util;

pub use error::{Error, Result};
pub use models::{ItemId, QueueItem, QueueItemStatus, QueueOperation};
pub use queue::{DrainOutcome, DrainSummary, OfflineQueue, QueueStatus};
