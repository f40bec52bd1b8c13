//! Record storage for the medreg registry.
//!
//! Defines the [`RecordStore`] trait every backend implements and ships the
//! in-memory reference backend. The Postgres backend lives in
//! `medreg-store-postgres`.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{ErrorCategory, StoreError};
pub use memory::MemoryStore;
pub use traits::RecordStore;
