//! Conflict-free appointment booking.
//!
//! An [`Engine`](engine::Engine) owns every doctor's calendar. Each doctor has one fair lock
//! and an ordered index of the appointments currently holding calendar time, and every change
//! is journaled before it is applied.

pub mod compactor;
pub mod config;
pub mod directory;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod policy;
pub mod wal;
