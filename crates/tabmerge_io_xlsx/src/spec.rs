//! Shared XLSX specification models.

use std::fmt;

use crate::error::{ExportError, Result};

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification resolved into a worksheet format at render time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Top border override.
    pub top: Option<i64>,
    /// Bottom border override.
    pub bottom: Option<i64>,
    /// Left border override.
    pub left: Option<i64>,
    /// Right border override.
    pub right: Option<i64>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            top: other.top.or(self.top),
            bottom: other.bottom.or(self.bottom),
            left: other.left.or(self.left),
            right: other.right.or(self.right),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }
}

/// Normalized cell value during conversion/write pipeline.
///
/// Equality is the run-equality used by vertical merging: two `Number(NaN)`
/// cells never compare equal and therefore never share a run.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Calendar date as Excel serial day number.
    Date(f64),
    /// Timestamp as fractional Excel serial day number.
    Datetime(f64),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StylerSpecification

/// Built-in style template families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumStyleTemplate {
    /// Bordered Times New Roman presets.
    #[default]
    Standard,
    /// Borderless Calibri presets.
    Plain,
    /// Colored header with thin borders.
    Summer,
}

/// Per-role cell formats used by the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecStyler {
    /// Header row cells.
    pub header: SpecCellFormat,
    /// Sub-footer (aggregate) row cells.
    pub sub_footer: SpecCellFormat,
    /// Text and fallback data cells.
    pub common_data: SpecCellFormat,
    /// Date columns.
    pub date: SpecCellFormat,
    /// Datetime columns.
    pub datetime: SpecCellFormat,
    /// Integer columns.
    pub number: SpecCellFormat,
    /// Decimal columns.
    pub decimal: SpecCellFormat,
    /// Scientific-notation columns.
    pub scientific: SpecCellFormat,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SourceSpecification

/// Logical column type read from result metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumColumnType {
    /// Signed/unsigned integer column.
    Integer,
    /// Floating point column.
    Decimal,
    /// Boolean column (written as text).
    Boolean,
    /// Calendar date column.
    Date,
    /// Timestamp column.
    Datetime,
    /// Text and any other column.
    Text,
}

impl EnumColumnType {
    /// Whether values of this type are written as numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, EnumColumnType::Integer | EnumColumnType::Decimal)
    }
}

/// Column metadata of an export result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecColumnDescriptor {
    /// Column label written into the header.
    pub label: String,
    /// Logical column type.
    pub col_type: EnumColumnType,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region MergeSpecification

/// Inclusive 0-based row range of one run of equal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecMergeRange {
    row_first: usize,
    row_last: usize,
}

impl SpecMergeRange {
    /// Build a range, rejecting `row_first > row_last`.
    pub fn new(row_first: usize, row_last: usize) -> Result<Self> {
        if row_first > row_last {
            return Err(ExportError::PreconditionViolation(format!(
                "merge range row_first={row_first} must be <= row_last={row_last}"
            )));
        }
        Ok(Self {
            row_first,
            row_last,
        })
    }

    /// First row (inclusive).
    pub fn row_first(&self) -> usize {
        self.row_first
    }

    /// Last row (inclusive).
    pub fn row_last(&self) -> usize {
        self.row_last
    }

    /// Single-row runs are never merged.
    pub fn is_single_row(&self) -> bool {
        self.row_first == self.row_last
    }
}

/// Merged rectangle on a sheet: rows `[row_first, row_last]` of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecMergedRegion {
    /// First row (inclusive).
    pub row_first: usize,
    /// Last row (inclusive).
    pub row_last: usize,
    /// Column index.
    pub col: usize,
}

impl SpecMergedRegion {
    /// Whether two single-column regions share at least one cell.
    pub fn overlaps(&self, other: &SpecMergedRegion) -> bool {
        self.col == other.col
            && self.row_first <= other.row_last
            && other.row_first <= self.row_last
    }
}

impl fmt::Display for SpecMergedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(rows {}..={}, col {})",
            self.row_first, self.row_last, self.col
        )
    }
}

/// Handle of a cell style allocated in a [`crate::sheet::StyleTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdCellStyle(pub usize);

/// One materialized cell of a [`crate::sheet::SheetGrid`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSheetCell {
    /// Value written to the cell.
    pub value: EnumCellValue,
    /// Style handle applied to the cell.
    pub style: IdCellStyle,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ColumnFormatSpecification

/// Planned formats by column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecColumnFormatPlan {
    /// Format applied at write time.
    pub fmts_by_col: Vec<SpecCellFormat>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WriteOptions

/// Integer conversion policy for numeric-looking values in integer columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumIntegerCoerceMode {
    /// Coerce numeric values to integer representation when possible.
    Coerce,
    /// Keep non-integer numeric values as text in integer columns.
    #[default]
    Strict,
}

/// Value conversion policy for missing/NaN/Inf and integer coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxValuePolicy {
    /// Replacement text for missing value when keep-missing is enabled.
    pub missing_value_str: String,
    /// Replacement text for NaN.
    pub nan_str: String,
    /// Replacement text for positive infinity.
    pub posinf_str: String,
    /// Replacement text for negative infinity.
    pub neginf_str: String,
    /// Integer conversion mode.
    pub integer_coerce: EnumIntegerCoerceMode,
}

impl Default for SpecXlsxValuePolicy {
    fn default() -> Self {
        Self {
            missing_value_str: "NA".to_string(),
            nan_str: "NaN".to_string(),
            posinf_str: "Inf".to_string(),
            neginf_str: "-Inf".to_string(),
            integer_coerce: EnumIntegerCoerceMode::Strict,
        }
    }
}

/// Policy for selecting row chunk size in write pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxRowChunkPolicy {
    /// Width threshold for large table.
    pub width_large: usize,
    /// Width threshold for medium table.
    pub width_medium: usize,
    /// Chunk size used when width >= `width_large`.
    pub size_large: usize,
    /// Chunk size used when width >= `width_medium`.
    pub size_medium: usize,
    /// Default chunk size.
    pub size_default: usize,
    /// Force exact chunk size when set.
    pub fixed_size: Option<usize>,
}

impl Default for SpecXlsxRowChunkPolicy {
    fn default() -> Self {
        Self {
            width_large: 8_000,
            width_medium: 2_000,
            size_large: 1_000,
            size_medium: 2_000,
            size_default: 10_000,
            fixed_size: None,
        }
    }
}

/// Scientific formatting candidate scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumScientificScope {
    /// Disable scientific auto-selection entirely.
    None,
    /// Apply to decimal-like numeric columns (default).
    #[default]
    Decimal,
    /// Apply to integer columns.
    Integer,
    /// Apply to all numeric columns.
    All,
}

/// Scientific formatting policy used in per-sheet write.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecScientificPolicy {
    /// Scientific trigger scope.
    pub rule_scope: EnumScientificScope,
    /// Lower absolute bound trigger (exclusive, except zero).
    pub thr_min: f64,
    /// Upper absolute bound trigger (inclusive).
    pub thr_max: f64,
    /// Max body rows to inspect for scientific inference.
    pub height_body_inferred_max: Option<usize>,
}

impl Default for SpecScientificPolicy {
    fn default() -> Self {
        Self {
            rule_scope: EnumScientificScope::Decimal,
            thr_min: 0.0001,
            thr_max: 1_000_000_000_000.0,
            height_body_inferred_max: Some(20_000),
        }
    }
}

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only (default).
    #[default]
    Header,
    /// Infer width from body cells only.
    Body,
    /// Infer width from both header and body cells.
    All,
}

/// Autofit policy for per-sheet write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Max body rows inspected when body-based inference is active.
    pub height_body_inferred_max: Option<usize>,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::Header,
            height_body_inferred_max: Some(20_000),
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Aggregate written in the sub-footer row under numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumSubFooter {
    /// No sub-footer row.
    #[default]
    None,
    /// `SUM` of the column body.
    Sum,
    /// `AVERAGE` of the column body.
    Average,
    /// `MAX` of the column body.
    Max,
    /// `MIN` of the column body.
    Min,
}

impl EnumSubFooter {
    /// Spreadsheet function name, `None` when disabled.
    pub fn function_name(&self) -> Option<&'static str> {
        match self {
            EnumSubFooter::None => None,
            EnumSubFooter::Sum => Some("SUM"),
            EnumSubFooter::Average => Some("AVERAGE"),
            EnumSubFooter::Max => Some("MAX"),
            EnumSubFooter::Min => Some("MIN"),
        }
    }
}

/// Writer-wide options controlling value conversion and formatting defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxWriteOptions {
    /// Value conversion policy.
    pub value_policy: SpecXlsxValuePolicy,
    /// Keep missing/NaN/Inf as text instead of blank.
    pub keep_missing_values: bool,
    /// Infer numeric columns from dtypes.
    pub infer_numeric_cols: bool,
    /// Infer integer subset from numeric columns.
    pub infer_integer_cols: bool,
    /// Row chunking policy.
    pub row_chunk_policy: SpecXlsxRowChunkPolicy,
    /// Base patch merged into all per-column formats.
    pub base_format_patch: SpecCellFormat,
}

impl Default for SpecXlsxWriteOptions {
    fn default() -> Self {
        Self {
            value_policy: SpecXlsxValuePolicy::default(),
            keep_missing_values: false,
            infer_numeric_cols: true,
            infer_integer_cols: true,
            row_chunk_policy: SpecXlsxRowChunkPolicy::default(),
            base_format_patch: SpecCellFormat::default(),
        }
    }
}

/// Per-sheet call options.
#[derive(Default, Debug, Clone)]
pub struct SpecXlsxSheetWriteOptions {
    /// Integer columns by name/index-string.
    pub cols_integer: Option<Vec<String>>,
    /// Decimal columns by name/index-string.
    pub cols_decimal: Option<Vec<String>>,
    /// Columns whose runs of equal values are merged vertically.
    pub cols_merge: Option<Vec<String>>,
    /// Number of frozen columns.
    pub col_freeze: usize,
    /// Frozen row index; defaults to header height when `None`.
    pub row_freeze: Option<usize>,
    /// Enable merged multi-row header behavior.
    pub if_merge_header: bool,
    /// Override writer-level keep-missing behavior.
    pub if_keep_missing_values: Option<bool>,
    /// Aggregate row appended below each sheet body.
    pub sub_footer: EnumSubFooter,
    /// Column autofit policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
    /// Scientific-format trigger policy.
    pub policy_scientific: SpecScientificPolicy,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetFormatSpecification

/// Concrete sheet part emitted to workbook (after Excel-limit slicing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetSlice {
    /// Actual unique sheet name in workbook.
    pub sheet_name: String,
    /// Inclusive source row start.
    pub row_start_inclusive: usize,
    /// Exclusive source row end.
    pub row_end_exclusive: usize,
    /// Inclusive source column start.
    pub col_start_inclusive: usize,
    /// Exclusive source column end.
    pub col_end_exclusive: usize,
}

/// Horizontal merge plan item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetHorizontalMerge {
    /// Row index where merge is applied.
    pub row_idx_start: usize,
    /// Start column index (inclusive).
    pub col_idx_start: usize,
    /// End column index (inclusive).
    pub col_idx_end: usize,
    /// Merge display text.
    pub text: String,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Vertical merges applied to one written sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetMergeReport {
    /// Actual sheet name in workbook.
    pub sheet_name: String,
    /// Regions in application order (worksheet coordinates).
    pub regions: Vec<SpecMergedRegion>,
}

/// Per-write call report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecXlsxReport {
    /// Sheet slices produced by the write call.
    pub sheets: Vec<SpecSheetSlice>,
    /// Vertical merges per written sheet.
    pub merges: Vec<SpecSheetMergeReport>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecXlsxReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        let c_msg = msg.as_ref();
        tracing::warn!("{c_msg}");
        self.warnings.push(c_msg.to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_range_rejects_inverted_rows() {
        assert!(matches!(
            SpecMergeRange::new(4, 3),
            Err(ExportError::PreconditionViolation(_))
        ));
        let range = SpecMergeRange::new(3, 3).unwrap();
        assert!(range.is_single_row());
        assert_eq!((range.row_first(), range.row_last()), (3, 3));
    }

    #[test]
    fn test_merged_region_overlap() {
        let region = SpecMergedRegion {
            row_first: 2,
            row_last: 4,
            col: 1,
        };
        let touching = SpecMergedRegion {
            row_first: 4,
            row_last: 6,
            col: 1,
        };
        let after = SpecMergedRegion {
            row_first: 5,
            row_last: 6,
            col: 1,
        };
        let other_col = SpecMergedRegion { col: 2, ..region };
        assert!(region.overlaps(&region));
        assert!(region.overlaps(&touching));
        assert!(!region.overlaps(&after));
        assert!(!region.overlaps(&other_col));
    }

    #[test]
    fn test_format_merge_prefers_right_side() {
        let base = SpecCellFormat {
            font_name: Some("Calibri".to_string()),
            bold: Some(false),
            ..Default::default()
        };
        let merged = base.with_(SpecCellFormat {
            bold: Some(true),
            valign: Some("vcenter".to_string()),
            ..Default::default()
        });
        assert_eq!(merged.font_name.as_deref(), Some("Calibri"));
        assert_eq!(merged.bold, Some(true));
        assert_eq!(merged.valign.as_deref(), Some("vcenter"));
    }

    #[test]
    fn test_sub_footer_function_name() {
        assert_eq!(EnumSubFooter::None.function_name(), None);
        assert_eq!(EnumSubFooter::Average.function_name(), Some("AVERAGE"));
    }
}
