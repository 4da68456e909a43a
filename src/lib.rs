//! Autorun: rotation scheduler for staked autonomous agents.
//!
//! Keeps exactly one agent of a user-curated, ordered set deployed, rotating
//! to the next eligible agent once the running one has earned its rewards for
//! the epoch, and recovering when nothing is running.

pub mod config;
pub mod custody;
pub mod eligibility;
pub mod error;
pub mod lifecycle;
pub mod middleware;
pub mod notify;
pub mod rotation;
pub mod scheduler;
pub mod signals;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_support;
