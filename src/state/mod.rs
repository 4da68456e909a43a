pub mod database;
pub mod membership;
pub mod schema;
pub mod store;

pub use database::Database;
pub use store::{AutoRunStore, SqliteStore, StateStore, AUTO_RUN_KEY};
