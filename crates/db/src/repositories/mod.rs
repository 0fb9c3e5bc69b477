//! Storage adapters implementing [`crate::repository::Repository`].

pub mod memory_repo;
pub mod postgres_repo;

pub use memory_repo::InMemoryRepository;
pub use postgres_repo::PgRepository;
