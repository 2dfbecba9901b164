//! Infrastructure layer: entity store, lifecycle engines, config, external services.

pub mod config;
pub mod directory;
pub mod error;
pub mod external;
pub mod lifecycle;
pub mod queries;
pub mod store;


pub use config::{AppConfig, ConfigError};
pub use directory::Directory;
pub use error::LifecycleError;
pub use lifecycle::{CheckIn, CheckOut, DecideVisitor, IssuePass, Lifecycle, RevokePass, Scan, Verified, VerifyPass};
pub use queries::{CheckStats, Queries, StatsPeriod};
pub use store::{EntityStore, InMemoryStore, Page, Pagination, PostgresStore, StoreError, StoreTx};
