//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is alive.
//!
//! # Tasks
//! - Expiration sweep: applies the expiry check to every entry at a fixed period

mod sweeper;

pub(crate) use sweeper::spawn_sweeper;
