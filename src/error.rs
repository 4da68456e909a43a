//! Structural errors raised by the scheduler.
//!
//! Transport and I/O failures travel as `anyhow::Error`; the variants here are
//! the ones callers match on to decide whether a candidate should be skipped.

use crate::types::AgentType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutoRunError {
    #[error("agent type '{0}' is not configured")]
    UnknownAgent(AgentType),

    #[error("no service template configured for agent type '{0}'")]
    MissingTemplate(AgentType),

    #[error("custody wallet data not loaded")]
    CustodyNotLoaded,

    #[error("backup signer required to create a custody wallet on {0}")]
    BackupSignerRequired(String),

    #[error("multiple backup signers found, cannot create custody wallet on {0}")]
    MultipleBackupSigners(String),

    #[error("unknown deployment status code {0}")]
    UnknownDeploymentStatus(u8),
}

impl AutoRunError {
    /// Structural errors are fatal to the current candidate but not to the scheduler.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::UnknownAgent(_)
                | Self::MissingTemplate(_)
                | Self::BackupSignerRequired(_)
                | Self::MultipleBackupSigners(_)
        )
    }
}
