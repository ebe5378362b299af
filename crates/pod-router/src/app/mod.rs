//! Application module
//!
//! Wires the informer, the dispatcher and the metrics reporter together and
//! manages their lifecycle.

pub mod builder;
pub mod core;
pub mod tasks;

pub use builder::ApplicationBuilder;
pub use core::Application;
