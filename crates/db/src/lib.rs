pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use migrations::{ensure_ready, install_store_provisioned, run_pending, SchemaReadiness};
