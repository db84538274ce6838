//! Data loading and dataset construction
//!
//! Raw game-log loading, the columnar table every stage works on, and the
//! windowed Burn dataset consumed by training and prediction.

pub mod dataset;
pub mod players;
pub mod records;
pub mod table;

pub use dataset::SequenceWindower;
pub use players::PlayerDirectory;
pub use records::{PlayerGameRow, RawRecordStore};
pub use table::{Column, ColumnOrigin, Table};
