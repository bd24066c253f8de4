//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is open.
//!
//! # Tasks
//! - Sweeper: Reclaims expired cache entries at configured intervals

mod sweeper;

pub use sweeper::spawn_sweeper;
