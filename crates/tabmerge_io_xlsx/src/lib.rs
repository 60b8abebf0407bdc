//! `tabmerge_io_xlsx` v1:
//! Export query results into styled XLSX workbooks, merging runs of equal
//! values in selected columns into vertical regions.
//!
//! Modules:
//! - `conf`   : constants and style template presets
//! - `error`  : crate error type
//! - `merge`  : run detection and region merging
//! - `sheet`  : buffered sheet grid and style table
//! - `source` : export query collaborator
//! - `spec`   : specs/models/options
//! - `style`  : styler builder
//! - `util`   : pure helper functions
//! - `writer` : workbook writer
pub mod conf;
pub mod error;
pub mod merge;
pub mod sheet;
pub mod source;
pub mod spec;
pub mod style;
pub mod util;
pub mod writer;

pub use conf::{
    N_DAYS_EXCEL_EPOCH_TO_UNIX, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX,
    TUP_EXCEL_ILLEGAL, derive_style_template_formats, derive_template_styler,
};
pub use error::{ExportError, Result};
pub use merge::{EnumRunState, RunDetector, merge_range, merge_region};
pub use sheet::{SheetGrid, SheetTarget, StyleTable};
pub use source::{DataFrameSource, ExportSource, IpcSource, derive_column_descriptors};
pub use spec::{
    EnumAutofitColumnsRule, EnumCellValue, EnumColumnType, EnumIntegerCoerceMode,
    EnumScientificScope, EnumStyleTemplate, EnumSubFooter, IdCellStyle, SpecAutofitCellsPolicy,
    SpecCellFormat, SpecColumnDescriptor, SpecColumnFormatPlan, SpecMergeRange, SpecMergedRegion,
    SpecScientificPolicy, SpecSheetCell, SpecSheetHorizontalMerge, SpecSheetMergeReport,
    SpecSheetSlice, SpecStyler, SpecXlsxReport, SpecXlsxRowChunkPolicy, SpecXlsxSheetWriteOptions,
    SpecXlsxValuePolicy, SpecXlsxWriteOptions,
};
pub use style::StylerBuilder;
pub use util::{
    apply_vertical_run_text_blankout, calculate_row_chunk_size, convert_nan_inf_to_str,
    derive_horizontal_merge_tracker, derive_vertical_header_runs, plan_horizontal_merges,
    plan_sheet_slices, sanitize_sheet_name,
};
pub use writer::XlsxWriter;
