//! `salidas-recon`: container departure-time reconciliation engine.
//!
//! Pure engine crate: receives raw cell grids, fills the destination table's
//! departure times from the export log, and reports what changed.
//! Workbook I/O lives in `salidas-io` behind the [`GridSource`] trait.

pub mod cache;
pub mod columns;
pub mod config;
pub mod date;
pub mod engine;
pub mod error;
pub mod header;
pub mod lookup;
pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod source;

pub use cache::{TableCache, TableKey};
pub use config::{DateOrder, OverwritePolicy, SyncConfig};
pub use engine::{run, DestinationTable};
pub use error::ReconError;
pub use model::{Cell, CellUpdate, RawGrid, SyncResult, Table};
pub use source::{GridSource, MemorySource};
