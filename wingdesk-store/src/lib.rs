pub mod app_config;
pub mod database;
pub mod history_repo;
pub mod pg_repo;

pub use app_config::{BusinessRules, Config};
pub use database::DbClient;
pub use history_repo::PgHistorySink;
pub use pg_repo::PgRepository;
