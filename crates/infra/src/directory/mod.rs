//! Directory store implementations (partners, topics, grants, subscriptions, accounts).

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryDirectory;
pub use postgres::PostgresDirectory;
