//! Error taxonomy shared by the merge core and the export pipeline.

use thiserror::Error;

use crate::spec::SpecMergedRegion;

/// Export/merge error.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Caller supplied an absent or out-of-order value.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation called outside its contract (bad range, wrong state).
    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),

    /// Anchor cell of a merge does not exist on the sheet.
    #[error("Missing anchor cell at row {row}, column {col}")]
    MissingAnchorCell { row: usize, col: usize },

    /// Sheet target rejected a merge overlapping an existing region.
    #[error("Merged region {region} overlaps existing region {existing}")]
    DuplicateRegion {
        region: SpecMergedRegion,
        existing: SpecMergedRegion,
    },

    /// Invalid writer or sheet options.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Writer already flushed to disk.
    #[error("Cannot write after close().")]
    Closed,

    /// Row/column index does not fit the worksheet index type.
    #[error("Index overflow: {0}")]
    IndexOverflow(String),

    #[error("xlsx write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("dataframe error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

pub type Result<T> = std::result::Result<T, ExportError>;
