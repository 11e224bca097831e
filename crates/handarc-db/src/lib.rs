//! Relational persistence for the hand archive.
//!
//! The [`HandStore`] trait abstracts the row-level operations; [`PgHandStore`]
//! implements them against Postgres and [`MemoryHandStore`] against an
//! in-process map for tests. [`HandSaver`] layers the multi-row save
//! protocol (validation, player dedup, rollback on partial failure) on top
//! of any store.

pub mod error;
pub mod memory;
pub mod pg;
pub mod saver;
pub mod store;

pub use error::{DbError, DbResult};
pub use memory::{FailPoint, MemoryHandStore};
pub use pg::{create_pool, PgHandStore};
pub use saver::{HandSaver, SaveOptions, SaveOutcome, SaveReport};
pub use store::{HandStore, NewHand, NewHandAction, NewHandPlayer};
