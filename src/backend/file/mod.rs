//! Comma-delimited text file storage
//!
//! ```text
//! <directory>/
//!     Resources.csv   header line + one CSV line per row
//!     Schema.ini      [Resources.csv] / Format=CSVDelimited
//! ```

pub mod adapter;
pub mod csv;
pub mod layout;

pub use adapter::CommaDelimitedFileAdapter;
pub use layout::{ColumnSet, SchemaSidecar};

/// Line terminator written to the data file and the sidecar
pub const LINE_TERMINATOR: &str = "\r\n";
