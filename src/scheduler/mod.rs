//! Scheduler coordinator, rotation guard and the daemon loop.

pub mod commands;
pub mod coordinator;
pub mod daemon;
pub mod guard;

pub use commands::{AutoRunStatus, Commands};
pub use coordinator::Coordinator;
pub use daemon::AutoRunDaemon;
pub use guard::{RotationGuard, RotationPermit};
