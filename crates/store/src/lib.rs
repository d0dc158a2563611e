//! Store contracts and backends for authors, content, visits and schedules.
//!
//! The scheduler and discovery crates only see the traits in [`traits`].
//! [`MemoryStore`] backs tests and dataset-file runs; [`PgStore`] backs
//! production deployments.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::StoreError;
pub use memory::{Dataset, MemoryStore};
pub use postgres::PgStore;
pub use traits::{AuthorStore, ContentCorpus, ScheduleStore, VisitLog};
