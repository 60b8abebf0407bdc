//! Data-source collaborator: runs the export query and reads result metadata.
//!
//! A source is built once by the caller and passed by reference to
//! [`crate::writer::XlsxWriter::write_sheet_from_source`].

use std::io::Cursor;

use polars::prelude::{DataFrame, DataType, IpcReader, SerReader};

use crate::error::{ExportError, Result};
use crate::spec::{EnumColumnType, SpecColumnDescriptor};

/// Producer of an export result and its column metadata.
pub trait ExportSource {
    /// Execute the export query and materialize its result.
    fn execute_export_query(&self) -> Result<DataFrame>;

    /// Column descriptors of `df`, in column order.
    fn read_metadata(&self, df: &DataFrame) -> Result<Vec<SpecColumnDescriptor>> {
        derive_column_descriptors(df)
    }
}

/// Map every column of `df` to a [`SpecColumnDescriptor`].
pub fn derive_column_descriptors(df: &DataFrame) -> Result<Vec<SpecColumnDescriptor>> {
    if df.width() == 0 {
        return Err(ExportError::InvalidInput(
            "export result has no columns".to_string(),
        ));
    }

    Ok(df
        .get_columns()
        .iter()
        .map(|c_col| SpecColumnDescriptor {
            label: c_col.name().to_string(),
            col_type: derive_column_type(c_col.dtype()),
        })
        .collect())
}

/// Logical column type of a polars dtype.
pub fn derive_column_type(dtype: &DataType) -> EnumColumnType {
    match dtype {
        DataType::Boolean => EnumColumnType::Boolean,
        DataType::Date => EnumColumnType::Date,
        DataType::Datetime(_, _) => EnumColumnType::Datetime,
        dt if dt.is_integer() => EnumColumnType::Integer,
        dt if dt.is_numeric() => EnumColumnType::Decimal,
        _ => EnumColumnType::Text,
    }
}

/// Already materialized export result.
#[derive(Debug, Clone)]
pub struct DataFrameSource {
    df: DataFrame,
}

impl DataFrameSource {
    pub fn new(df: DataFrame) -> Self {
        Self { df }
    }
}

impl ExportSource for DataFrameSource {
    fn execute_export_query(&self) -> Result<DataFrame> {
        tracing::debug!(
            height = self.df.height(),
            width = self.df.width(),
            "executing export query on in-memory result"
        );
        Ok(self.df.clone())
    }
}

/// Export result delivered as Polars IPC bytes by an external query engine.
#[derive(Debug, Clone)]
pub struct IpcSource {
    v_ipc_df: Vec<u8>,
}

impl IpcSource {
    pub fn new(v_ipc_df: Vec<u8>) -> Self {
        Self { v_ipc_df }
    }
}

impl ExportSource for IpcSource {
    fn execute_export_query(&self) -> Result<DataFrame> {
        tracing::debug!(n_bytes = self.v_ipc_df.len(), "executing export query from IPC payload");
        derive_dataframe_from_ipc_bytes(&self.v_ipc_df)
    }
}

/// Decode a Polars IPC payload.
pub fn derive_dataframe_from_ipc_bytes(v_ipc_df: &[u8]) -> Result<DataFrame> {
    Ok(IpcReader::new(Cursor::new(v_ipc_df)).finish()?)
}
