//! Background task helpers used by the `assetrules` binary.

pub mod manager;

pub use manager::{spawn_cancellable_task, spawn_managed_task};
