//! Stop/start execution against the deployment API.

pub mod driver;
pub mod template;

pub use driver::LifecycleDriver;

use std::sync::Arc;

use crate::middleware::{CustodyApi, DeploymentApi};
use crate::notify::{AuditSink, Notifier};

/// External collaborators shared by the driver and the coordinator.
#[derive(Clone)]
pub struct Collaborators {
    pub deployments: Arc<dyn DeploymentApi>,
    pub custody: Arc<dyn CustodyApi>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditSink>,
}
