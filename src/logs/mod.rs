// src/logs/mod.rs

//! Captured task output.
//!
//! - [`buffer`] holds [`LogLine`] and the fixed-capacity, drop-oldest
//!   [`LogBuffer`] kept per task.
//! - [`store`] owns one buffer per task plus the live fan-out to
//!   subscribers.
//! - [`subscription`] is the receiving end of that fan-out. A slow
//!   subscriber loses its own oldest undelivered items; producers never wait.

pub mod buffer;
pub mod store;
pub mod subscription;

pub use buffer::{LogBuffer, LogLine, TaggedLogLine};
pub use store::{DEFAULT_SUBSCRIBER_CAPACITY, LogStore};
pub use subscription::Subscription;
