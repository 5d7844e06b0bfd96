//! Migration discovery and statement splitting.
//!
//! On-disk layout:
//!
//! ```text
//! migrations/
//! ├── migration_lock.toml          (sentinel, never executed)
//! ├── 20240101000000_init/
//! │   └── migration.sql
//! └── 20240202000000_user_email/
//!     └── migration.sql
//! ```
//!
//! Directory names sort lexicographically into chronological order.

mod loader;
mod split;

pub use loader::{
    LOCK_FILE_NAME, MIGRATION_FILE_NAME, MigrationLoader, MigrationPlan, MigrationUnit,
};
pub use split::split_statements;
