//! Columnar dataset store: memory-mapped string and real columns, the
//! dataset layer that names and lifecycles them, per-column/dataset
//! subscriber fan-out, and the JSON-RPC-over-frames server that exposes
//! all of it to clients.

pub mod dataset;
pub mod errors;
pub mod os;
pub mod server;
pub mod store;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use dataset::{ColumnInfo, ColumnType, Dataset, Manifest};
pub use errors::{Result, StoreError};
pub use store::{RealColumn, StringBlockStore, StringColumn};
