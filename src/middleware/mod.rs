pub mod api;
pub mod client;
pub mod services;

pub use api::{CustodyApi, DeploymentApi};
pub use client::MiddlewareClient;
pub use services::ServiceRecord;
