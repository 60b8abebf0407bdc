//! XLSX writer that exports query results into styled workbook sheets.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use polars::prelude::{AnyValue, DataFrame, TimeUnit};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use crate::conf::{N_DAYS_EXCEL_EPOCH_TO_UNIX, N_LEN_EXCEL_SHEET_NAME_MAX};
use crate::error::{ExportError, Result};
use crate::merge::{RunDetector, merge_range};
use crate::sheet::{SheetGrid, SheetTarget, StyleTable};
use crate::source::{ExportSource, derive_column_descriptors, derive_dataframe_from_ipc_bytes};
use crate::spec::{
    EnumAutofitColumnsRule, EnumCellValue, EnumColumnType, EnumScientificScope, IdCellStyle,
    SpecAutofitCellsPolicy, SpecCellFormat, SpecColumnDescriptor,
    SpecColumnFormatPlan, SpecScientificPolicy, SpecSheetMergeReport, SpecSheetSlice, SpecStyler,
    SpecXlsxReport, SpecXlsxSheetWriteOptions, SpecXlsxValuePolicy, SpecXlsxWriteOptions,
};
use crate::util::{
    apply_vertical_run_text_blankout, calculate_row_chunk_size, convert_cell_value,
    convert_col_idx_to_label, derive_horizontal_merge_tracker, generate_row_chunks,
    plan_horizontal_merges, plan_sheet_slices, sanitize_sheet_name,
    select_sorted_indices_from_refs, validate_unique_columns,
};

pub struct SpecColumnFormatPlanOptions<'a> {
    /// Number of columns in current sheet slice.
    pub width_data: usize,
    /// Slice-local numeric column indices.
    pub cols_idx_numeric: &'a [usize],
    /// Slice-local integer column indices.
    pub cols_idx_integer: &'a [usize],
    /// Slice-local explicit decimal column indices.
    pub cols_idx_decimal: Option<&'a [usize]>,
    /// Slice-local scientific column indices.
    pub cols_idx_scientific: &'a [usize],
    /// Slice-local date column indices.
    pub cols_idx_date: &'a [usize],
    /// Slice-local datetime column indices.
    pub cols_idx_datetime: &'a [usize],
    /// Per-role base formats.
    pub styler: &'a SpecStyler,
    /// Global write options.
    pub write_options: &'a SpecXlsxWriteOptions,
}

/// Stateful workbook writer.
pub struct XlsxWriter {
    path_file_out: PathBuf,
    workbook: Workbook,
    styler: SpecStyler,
    write_options: SpecXlsxWriteOptions,
    set_sheet_names_existing: BTreeSet<String>,
    l_reports: Vec<SpecXlsxReport>,
    if_closed: bool,
}

impl XlsxWriter {
    /// Create writer bound to output path, styler and options.
    ///
    /// The workbook is buffered in memory until [`Self::close`] is called.
    pub fn new(
        path_file_out: PathBuf,
        styler: SpecStyler,
        write_options: SpecXlsxWriteOptions,
    ) -> Self {
        Self {
            path_file_out,
            workbook: Workbook::new(),
            styler,
            write_options,
            set_sheet_names_existing: BTreeSet::new(),
            l_reports: Vec::new(),
            if_closed: false,
        }
    }

    /// Return output file path as string.
    pub fn file_out(&self) -> String {
        self.path_file_out.to_string_lossy().to_string()
    }

    /// Return immutable snapshot of per-sheet write reports.
    pub fn report(&self) -> Vec<SpecXlsxReport> {
        self.l_reports.clone()
    }

    /// Flush workbook to disk. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.if_closed {
            return Ok(());
        }
        self.workbook.save(&self.path_file_out)?;
        self.if_closed = true;
        tracing::info!(
            file_out = %self.path_file_out.display(),
            n_writes = self.l_reports.len(),
            "workbook saved"
        );
        Ok(())
    }

    /// Run the export query of `source` and write its result as one sheet.
    pub fn write_sheet_from_source(
        &mut self,
        source: &dyn ExportSource,
        sheet_name: &str,
        options: &SpecXlsxSheetWriteOptions,
    ) -> Result<()> {
        if self.if_closed {
            return Err(ExportError::Closed);
        }
        let df_data = source.execute_export_query()?;
        let l_descriptors = source.read_metadata(&df_data)?;
        tracing::debug!(
            sheet_name,
            n_cols = l_descriptors.len(),
            n_rows = df_data.height(),
            "read export metadata"
        );
        self.write_sheet(&df_data, &l_descriptors, sheet_name, None, options)
    }

    /// Write one sheet from in-memory dataframes.
    pub fn write_sheet_from_dataframes(
        &mut self,
        df_data: &DataFrame,
        sheet_name: &str,
        df_header: Option<&DataFrame>,
        options: &SpecXlsxSheetWriteOptions,
    ) -> Result<()> {
        if self.if_closed {
            return Err(ExportError::Closed);
        }
        let l_descriptors = derive_column_descriptors(df_data)?;
        self.write_sheet(df_data, &l_descriptors, sheet_name, df_header, options)
    }

    /// Write one sheet from IPC-serialized dataframe bytes.
    ///
    /// `v_ipc_df` and optional `v_ipc_df_header` must be valid Polars IPC payloads.
    pub fn write_sheet_from_ipc_bytes(
        &mut self,
        v_ipc_df: &[u8],
        sheet_name: &str,
        v_ipc_df_header: Option<&[u8]>,
        options: &SpecXlsxSheetWriteOptions,
    ) -> Result<()> {
        if self.if_closed {
            return Err(ExportError::Closed);
        }

        let df_data = derive_dataframe_from_ipc_bytes(v_ipc_df)?;
        let df_header = match v_ipc_df_header {
            Some(val) => Some(derive_dataframe_from_ipc_bytes(val)?),
            None => None,
        };
        self.write_sheet_from_dataframes(&df_data, sheet_name, df_header.as_ref(), options)
    }

    fn write_sheet(
        &mut self,
        df_data: &DataFrame,
        l_descriptors: &[SpecColumnDescriptor],
        sheet_name: &str,
        df_header: Option<&DataFrame>,
        options: &SpecXlsxSheetWriteOptions,
    ) -> Result<()> {
        validate_policy_autofit(&options.policy_autofit)?;
        validate_policy_scientific(&options.policy_scientific)?;

        let if_keep_missing_values = options
            .if_keep_missing_values
            .unwrap_or(self.write_options.keep_missing_values);
        let value_policy = self.write_options.value_policy.clone();

        let l_colnames_df: Vec<String> = l_descriptors
            .iter()
            .map(|desc| desc.label.clone())
            .collect();
        validate_unique_columns(&l_colnames_df)?;

        let n_width_df = l_colnames_df.len();
        let n_height_df = df_data.height();
        if n_width_df != df_data.width() {
            return Err(ExportError::InvalidInput(format!(
                "metadata describes {n_width_df} columns but result has {}",
                df_data.width()
            )));
        }

        let mut l_header_grid = vec![l_colnames_df.clone()];
        if let Some(df_header_custom) = df_header {
            let l_header_cols: Vec<String> = df_header_custom
                .get_column_names_str()
                .into_iter()
                .map(ToString::to_string)
                .collect();
            validate_unique_columns(&l_header_cols)?;

            if df_header_custom.height() == 0 {
                return Err(ExportError::InvalidInput(
                    "df_header must have >= 1 row (0-row header is not allowed).".to_string(),
                ));
            }
            if df_header_custom.width() != n_width_df {
                return Err(ExportError::InvalidInput(
                    "df_header.width must equal df.width.".to_string(),
                ));
            }

            l_header_grid = derive_string_grid_from_dataframe(df_header_custom)?;
        }

        let l_cols_idx_numeric = if self.write_options.infer_numeric_cols {
            derive_column_indices(l_descriptors, |col_type| col_type.is_numeric())
        } else {
            vec![]
        };

        let l_cols_idx_integer_inferred = if self.write_options.infer_integer_cols {
            derive_column_indices(l_descriptors, |col_type| {
                col_type == EnumColumnType::Integer
            })
            .into_iter()
            .filter(|n_idx| l_cols_idx_numeric.contains(n_idx))
            .collect()
        } else {
            vec![]
        };
        let l_cols_idx_date =
            derive_column_indices(l_descriptors, |col_type| col_type == EnumColumnType::Date);
        let l_cols_idx_datetime = derive_column_indices(l_descriptors, |col_type| {
            col_type == EnumColumnType::Datetime
        });

        let l_cols_idx_integer_specified =
            select_sorted_indices_from_refs(&l_colnames_df, options.cols_integer.as_deref())?;
        let l_cols_idx_decimal_specified =
            select_sorted_indices_from_refs(&l_colnames_df, options.cols_decimal.as_deref())?;
        let l_cols_idx_merge =
            select_sorted_indices_from_refs(&l_colnames_df, options.cols_merge.as_deref())?;

        let l_cols_idx_integer = if l_cols_idx_integer_specified.is_empty() {
            l_cols_idx_integer_inferred
        } else {
            l_cols_idx_integer_specified
        };
        let l_cols_idx_scientific = derive_scientific_column_indices(
            df_data,
            &l_cols_idx_numeric,
            &l_cols_idx_integer,
            &l_cols_idx_decimal_specified,
            &options.policy_scientific,
        )?;

        let n_rows_header = l_header_grid.len();
        let n_rows_footer = usize::from(options.sub_footer.function_name().is_some());

        let mut report = SpecXlsxReport::default();

        let l_sheet_parts = plan_sheet_slices(
            n_height_df,
            n_width_df,
            n_rows_header,
            n_rows_footer,
            &sanitize_sheet_name(sheet_name, "_"),
            &mut report,
        )?;

        let n_row_freeze = options.row_freeze.unwrap_or(n_rows_header);

        for sheet_slice in l_sheet_parts {
            let sheet_name_unique = self.derive_unique_sheet_name(&sheet_slice.sheet_name);
            let worksheet = self.workbook.add_worksheet();
            worksheet.set_name(&sheet_name_unique)?;

            let n_col_start = sheet_slice.col_start_inclusive;
            let n_col_end = sheet_slice.col_end_exclusive;
            let l_cols_idx_numeric_slice =
                derive_slice_indices(&l_cols_idx_numeric, n_col_start, n_col_end);
            let l_cols_idx_integer_slice =
                derive_slice_indices(&l_cols_idx_integer, n_col_start, n_col_end);
            let l_cols_idx_decimal_slice =
                derive_slice_indices(&l_cols_idx_decimal_specified, n_col_start, n_col_end);
            let l_cols_idx_scientific_slice =
                derive_slice_indices(&l_cols_idx_scientific, n_col_start, n_col_end);
            let l_cols_idx_date_slice =
                derive_slice_indices(&l_cols_idx_date, n_col_start, n_col_end);
            let l_cols_idx_datetime_slice =
                derive_slice_indices(&l_cols_idx_datetime, n_col_start, n_col_end);
            let l_cols_idx_merge_slice =
                derive_slice_indices(&l_cols_idx_merge, n_col_start, n_col_end);

            let plan_col_formats = plan_column_formats(SpecColumnFormatPlanOptions {
                width_data: n_col_end - n_col_start,
                cols_idx_numeric: &l_cols_idx_numeric_slice,
                cols_idx_integer: &l_cols_idx_integer_slice,
                cols_idx_decimal: if l_cols_idx_decimal_slice.is_empty() {
                    None
                } else {
                    Some(&l_cols_idx_decimal_slice)
                },
                cols_idx_scientific: &l_cols_idx_scientific_slice,
                cols_idx_date: &l_cols_idx_date_slice,
                cols_idx_datetime: &l_cols_idx_datetime_slice,
                styler: &self.styler,
                write_options: &self.write_options,
            });
            let n_width_slice = plan_col_formats.fmts_by_col.len();

            let l_fmt_by_col: Vec<Format> = plan_col_formats
                .fmts_by_col
                .iter()
                .map(derive_rust_xlsx_format)
                .collect();

            // Merge columns are buffered in the grid; (plain, merged) style per column.
            let mut style_table = StyleTable::new();
            let dict_id_styles_by_merge_col: BTreeMap<usize, (IdCellStyle, IdCellStyle)> =
                l_cols_idx_merge_slice
                    .iter()
                    .map(|n_idx_col| {
                        let fmt_col = &plan_col_formats.fmts_by_col[*n_idx_col];
                        let fmt_merged = fmt_col.with_(SpecCellFormat {
                            valign: Some("vcenter".to_string()),
                            ..Default::default()
                        });
                        (
                            *n_idx_col,
                            (style_table.allocate(fmt_col), style_table.allocate(&fmt_merged)),
                        )
                    })
                    .collect();
            let fmt_header = derive_rust_xlsx_format(&self.styler.header);

            let l_header_grid_slice = l_header_grid
                .iter()
                .map(|row| row[n_col_start..n_col_end].to_vec())
                .collect::<Vec<_>>();

            let mut l_width_by_col_header = vec![0usize; n_width_slice];
            let mut l_width_by_col_body = vec![0usize; n_width_slice];

            let if_autofit_columns = !matches!(
                options.policy_autofit.rule_columns,
                EnumAutofitColumnsRule::None
            );

            if if_autofit_columns {
                for (n_idx_col, n_width) in l_width_by_col_header.iter_mut().enumerate() {
                    for row in &l_header_grid_slice {
                        let value = &row[n_idx_col];
                        if value.is_empty() {
                            continue;
                        }
                        *n_width = usize::max(
                            *n_width,
                            estimate_width_len(
                                &EnumCellValue::String(value.clone()),
                                false,
                                false,
                                false,
                                if_keep_missing_values,
                                &value_policy,
                            ),
                        );
                    }
                }
            }

            write_header(
                worksheet,
                l_header_grid_slice,
                options.if_merge_header,
                &fmt_header,
            )?;

            worksheet.set_freeze_panes(
                cast_row_num(n_row_freeze)?,
                cast_col_num(options.col_freeze)?,
            )?;

            let set_cols_idx_numeric: BTreeSet<usize> =
                l_cols_idx_numeric_slice.iter().copied().collect();
            let set_cols_idx_integer: BTreeSet<usize> =
                l_cols_idx_integer_slice.iter().copied().collect();
            let set_cols_idx_scientific: BTreeSet<usize> =
                l_cols_idx_scientific_slice.iter().copied().collect();

            let n_rows_data_this_sheet =
                sheet_slice.row_end_exclusive - sheet_slice.row_start_inclusive;
            let l_cols_slice: Vec<_> = (n_col_start..n_col_end)
                .map(|n_idx_col_abs| {
                    df_data.get_columns()[n_idx_col_abs]
                        .slice(sheet_slice.row_start_inclusive as i64, n_rows_data_this_sheet)
                })
                .collect();
            let n_rows_chunk =
                calculate_row_chunk_size(n_width_slice, &self.write_options.row_chunk_policy);
            if n_rows_chunk == 0 {
                return Err(ExportError::InvalidOptions(
                    "row_chunk_policy resolved to 0 rows; expected >= 1.".to_string(),
                ));
            }
            let l_row_chunks = generate_row_chunks(n_rows_data_this_sheet, n_rows_chunk);

            let mut grid = SheetGrid::new(sheet_name_unique.clone());
            let mut dict_detectors_by_col: BTreeMap<usize, RunDetector<EnumCellValue>> =
                l_cols_idx_merge_slice
                    .iter()
                    .map(|n_idx_col| (*n_idx_col, RunDetector::new()))
                    .collect();

            let mut n_rows_seen_for_autofit = 0usize;
            for (n_row_chunk_start, n_rows_chunk_len) in l_row_chunks {
                let n_row_chunk_end = n_row_chunk_start + n_rows_chunk_len;
                for n_row_local in n_row_chunk_start..n_row_chunk_end {
                    let n_row_sheet = n_rows_header + n_row_local;
                    let if_autofit_row = if_autofit_columns
                        && options
                            .policy_autofit
                            .height_body_inferred_max
                            .is_none_or(|n_max| n_rows_seen_for_autofit < n_max);

                    for (n_idx_col, col) in l_cols_slice.iter().enumerate() {
                        let if_is_numeric_col = set_cols_idx_numeric.contains(&n_idx_col);
                        let if_is_integer_col = set_cols_idx_integer.contains(&n_idx_col);
                        let if_is_scientific_col = set_cols_idx_scientific.contains(&n_idx_col);

                        let value_raw = derive_cell_value_from_any_value(col.get(n_row_local)?);
                        let value = convert_cell_value(
                            &value_raw,
                            if_is_numeric_col,
                            if_is_integer_col,
                            if_keep_missing_values,
                            &value_policy,
                        );

                        if if_autofit_row {
                            l_width_by_col_body[n_idx_col] = usize::max(
                                l_width_by_col_body[n_idx_col],
                                estimate_width_len(
                                    &value,
                                    if_is_numeric_col,
                                    if_is_integer_col,
                                    if_is_scientific_col,
                                    if_keep_missing_values,
                                    &value_policy,
                                ),
                            );
                        }

                        let (Some(detector), Some((id_style, id_style_merged))) = (
                            dict_detectors_by_col.get_mut(&n_idx_col),
                            dict_id_styles_by_merge_col.get(&n_idx_col),
                        ) else {
                            write_cell_with_format(
                                worksheet,
                                n_row_sheet,
                                n_idx_col,
                                &value,
                                &l_fmt_by_col[n_idx_col],
                            )?;
                            continue;
                        };

                        let value_observed = Some(value.clone());
                        grid.put_cell(n_row_sheet, n_idx_col, value, *id_style);
                        if let Some(range) = detector.observe(n_row_sheet, value_observed)? {
                            merge_range(&mut grid, *id_style_merged, &range, n_idx_col)?;
                        }
                    }

                    if if_autofit_row {
                        n_rows_seen_for_autofit += 1;
                    }
                }
            }

            if n_rows_data_this_sheet > 0 {
                let n_row_sheet_last = n_rows_header + n_rows_data_this_sheet - 1;
                for (n_idx_col, detector) in dict_detectors_by_col {
                    if let Some(range) = detector.close(n_row_sheet_last)?
                        && let Some((_, id_style_merged)) =
                            dict_id_styles_by_merge_col.get(&n_idx_col)
                    {
                        merge_range(&mut grid, *id_style_merged, &range, n_idx_col)?;
                    }
                }
            }

            let l_fmt_by_style: Vec<Format> = style_table
                .formats()
                .iter()
                .map(derive_rust_xlsx_format)
                .collect();
            write_sheet_grid(worksheet, &grid, &l_fmt_by_style)?;

            if let Some(c_function) = options.sub_footer.function_name()
                && n_rows_data_this_sheet > 0
            {
                write_sub_footer(
                    worksheet,
                    c_function,
                    n_rows_header,
                    n_rows_data_this_sheet,
                    &set_cols_idx_numeric,
                    &plan_col_formats,
                    &self.styler.sub_footer,
                )?;
            }

            if if_autofit_columns {
                let n_min = usize::max(1, options.policy_autofit.width_cell_min);
                let n_max = usize::min(
                    255,
                    usize::max(n_min, options.policy_autofit.width_cell_max),
                );
                let n_pad = options.policy_autofit.width_cell_padding;

                for n_idx_col in 0..n_width_slice {
                    let n_width_recorded = match options.policy_autofit.rule_columns {
                        EnumAutofitColumnsRule::Header => l_width_by_col_header[n_idx_col],
                        EnumAutofitColumnsRule::Body => l_width_by_col_body[n_idx_col],
                        EnumAutofitColumnsRule::All => usize::max(
                            l_width_by_col_header[n_idx_col],
                            l_width_by_col_body[n_idx_col],
                        ),
                        EnumAutofitColumnsRule::None => l_width_by_col_header[n_idx_col],
                    };
                    let n_width_final =
                        usize::min(n_max, usize::max(n_min, n_width_recorded + n_pad));
                    worksheet.set_column_width(cast_col_num(n_idx_col)?, n_width_final as f64)?;
                }
            }

            tracing::info!(
                sheet_name = %sheet_name_unique,
                n_rows = n_rows_data_this_sheet,
                n_cols = n_width_slice,
                n_merged_regions = grid.merged_regions().len(),
                "sheet written"
            );

            report.merges.push(SpecSheetMergeReport {
                sheet_name: sheet_name_unique.clone(),
                regions: grid.merged_regions().to_vec(),
            });
            report.sheets.push(SpecSheetSlice {
                sheet_name: sheet_name_unique,
                ..sheet_slice
            });
        }

        self.l_reports.push(report);
        Ok(())
    }

    fn derive_unique_sheet_name(&mut self, name: &str) -> String {
        if !self.set_sheet_names_existing.contains(name) {
            self.set_sheet_names_existing.insert(name.to_string());
            return name.to_string();
        }

        let base_name: String = name
            .chars()
            .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 3))
            .collect();

        let mut n_idx = 2usize;
        loop {
            let candidate: String = format!("{base_name}__{n_idx}")
                .chars()
                .take(N_LEN_EXCEL_SHEET_NAME_MAX)
                .collect();
            if !self.set_sheet_names_existing.contains(&candidate) {
                self.set_sheet_names_existing.insert(candidate.clone());
                return candidate;
            }
            n_idx += 1;
        }
    }
}

/// Estimate displayed width units for one normalized cell value.
///
/// Used by autofit inference logic.
pub fn estimate_width_len(
    value: &EnumCellValue,
    if_is_numeric_col: bool,
    if_is_integer_col: bool,
    if_is_scientific_col: bool,
    if_keep_missing_values: bool,
    value_policy: &SpecXlsxValuePolicy,
) -> usize {
    match value {
        EnumCellValue::None => {
            if if_keep_missing_values {
                value_policy.missing_value_str.len()
            } else {
                0
            }
        }
        EnumCellValue::String(s) => {
            if s.is_empty() {
                return 0;
            }
            if !if_is_numeric_col {
                return estimate_unicode_string_width(s);
            }
            if if_is_scientific_col && let Ok(val) = s.parse::<f64>() {
                return format!("{val:.2E}").len();
            }
            if if_is_integer_col && let Ok(val) = s.parse::<i64>() {
                return val.to_string().len();
            }
            estimate_unicode_string_width(s)
        }
        EnumCellValue::Number(n) => {
            if !if_is_numeric_col {
                return estimate_unicode_string_width(&n.to_string());
            }
            if if_is_scientific_col {
                return format!("{n:.2E}").len();
            }
            if if_is_integer_col {
                return (*n as i64).to_string().len();
            }
            format!("{n:.4}").len()
        }
        // yyyy-mm-dd
        EnumCellValue::Date(_) => 10,
        // yyyy-mm-dd hh:mm:ss
        EnumCellValue::Datetime(_) => 19,
    }
}

fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

/// Build per-column format plan for current sheet slice.
pub fn plan_column_formats(options: SpecColumnFormatPlanOptions<'_>) -> SpecColumnFormatPlan {
    let SpecColumnFormatPlanOptions {
        width_data,
        cols_idx_numeric,
        cols_idx_integer,
        cols_idx_decimal,
        cols_idx_scientific,
        cols_idx_date,
        cols_idx_datetime,
        styler,
        write_options,
    } = options;

    let set_cols_idx_numeric: BTreeSet<usize> = cols_idx_numeric.iter().copied().collect();
    let set_cols_idx_integer: BTreeSet<usize> = cols_idx_integer.iter().copied().collect();
    let set_cols_idx_decimal: Option<BTreeSet<usize>> =
        cols_idx_decimal.map(|vals| vals.iter().copied().collect());
    let set_cols_idx_scientific: BTreeSet<usize> = cols_idx_scientific.iter().copied().collect();
    let set_cols_idx_date: BTreeSet<usize> = cols_idx_date.iter().copied().collect();
    let set_cols_idx_datetime: BTreeSet<usize> = cols_idx_datetime.iter().copied().collect();

    let mut fmts_by_col = Vec::with_capacity(width_data);

    for col_idx in 0..width_data {
        let fmt_base = if set_cols_idx_date.contains(&col_idx) {
            styler.date.clone()
        } else if set_cols_idx_datetime.contains(&col_idx) {
            styler.datetime.clone()
        } else if set_cols_idx_scientific.contains(&col_idx) {
            styler.scientific.clone()
        } else if set_cols_idx_integer.contains(&col_idx) {
            styler.number.clone()
        } else if set_cols_idx_decimal
            .as_ref()
            .map_or(set_cols_idx_numeric.contains(&col_idx), |set_idx| {
                set_idx.contains(&col_idx)
            })
        {
            styler.decimal.clone()
        } else {
            styler.common_data.clone()
        };

        fmts_by_col.push(fmt_base.merge(&write_options.base_format_patch));
    }

    SpecColumnFormatPlan { fmts_by_col }
}

fn validate_policy_autofit(policy_autofit: &SpecAutofitCellsPolicy) -> Result<()> {
    if policy_autofit.width_cell_min == 0 {
        return Err(ExportError::InvalidOptions(
            "policy_autofit.width_cell_min must be >= 1.".to_string(),
        ));
    }
    if policy_autofit.width_cell_max < policy_autofit.width_cell_min {
        return Err(ExportError::InvalidOptions(
            "policy_autofit.width_cell_max must be >= policy_autofit.width_cell_min.".to_string(),
        ));
    }
    Ok(())
}

fn validate_policy_scientific(policy_scientific: &SpecScientificPolicy) -> Result<()> {
    if policy_scientific.thr_min < 0.0 {
        return Err(ExportError::InvalidOptions(
            "policy_scientific.thr_min must be >= 0.".to_string(),
        ));
    }
    if policy_scientific.thr_max <= 0.0 {
        return Err(ExportError::InvalidOptions(
            "policy_scientific.thr_max must be > 0.".to_string(),
        ));
    }
    if policy_scientific.thr_min > policy_scientific.thr_max {
        return Err(ExportError::InvalidOptions(
            "policy_scientific.thr_min must be <= policy_scientific.thr_max.".to_string(),
        ));
    }
    Ok(())
}

fn derive_column_indices(
    l_descriptors: &[SpecColumnDescriptor],
    predicate: impl Fn(EnumColumnType) -> bool,
) -> Vec<usize> {
    l_descriptors
        .iter()
        .enumerate()
        .filter_map(|(n_idx, desc)| predicate(desc.col_type).then_some(n_idx))
        .collect()
}

fn derive_scientific_column_indices(
    df: &DataFrame,
    cols_idx_numeric: &[usize],
    cols_idx_integer: &[usize],
    cols_idx_decimal_specified: &[usize],
    policy_scientific: &SpecScientificPolicy,
) -> Result<Vec<usize>> {
    if cols_idx_numeric.is_empty()
        || matches!(policy_scientific.rule_scope, EnumScientificScope::None)
    {
        return Ok(vec![]);
    }

    let set_cols_idx_integer: BTreeSet<usize> = cols_idx_integer.iter().copied().collect();
    let set_cols_idx_decimal_specified: BTreeSet<usize> =
        cols_idx_decimal_specified.iter().copied().collect();
    let if_decimal_is_explicit = !set_cols_idx_decimal_specified.is_empty();

    let n_rows_sample_max = match policy_scientific.height_body_inferred_max {
        Some(n_max) => usize::min(df.height(), n_max),
        None => df.height(),
    };
    let l_cols = df.get_columns();

    let mut l_cols_idx_scientific = Vec::new();
    for n_idx_col in cols_idx_numeric {
        let if_is_integer_col = set_cols_idx_integer.contains(n_idx_col);
        let if_include = match policy_scientific.rule_scope {
            EnumScientificScope::None => false,
            EnumScientificScope::Decimal => {
                if if_is_integer_col {
                    false
                } else if if_decimal_is_explicit {
                    set_cols_idx_decimal_specified.contains(n_idx_col)
                } else {
                    true
                }
            }
            EnumScientificScope::Integer => if_is_integer_col,
            EnumScientificScope::All => true,
        };
        if !if_include {
            continue;
        }

        let col = &l_cols[*n_idx_col];
        let mut if_use_scientific = false;
        for n_idx_row in 0..n_rows_sample_max {
            let Some(n_value) = derive_f64_from_any_value(col.get(n_idx_row)?) else {
                continue;
            };
            if !n_value.is_finite() {
                continue;
            }

            let n_abs = n_value.abs();
            if n_abs >= policy_scientific.thr_max
                || (n_abs > 0.0 && n_abs < policy_scientific.thr_min)
            {
                if_use_scientific = true;
                break;
            }
        }

        if if_use_scientific {
            l_cols_idx_scientific.push(*n_idx_col);
        }
    }

    Ok(l_cols_idx_scientific)
}

fn derive_f64_from_any_value(value: AnyValue<'_>) -> Option<f64> {
    match value {
        AnyValue::UInt8(val) => Some(val as f64),
        AnyValue::UInt16(val) => Some(val as f64),
        AnyValue::UInt32(val) => Some(val as f64),
        AnyValue::UInt64(val) => Some(val as f64),
        AnyValue::Int8(val) => Some(val as f64),
        AnyValue::Int16(val) => Some(val as f64),
        AnyValue::Int32(val) => Some(val as f64),
        AnyValue::Int64(val) => Some(val as f64),
        AnyValue::Int128(val) => Some(val as f64),
        AnyValue::Float32(val) => Some(val as f64),
        AnyValue::Float64(val) => Some(val),
        AnyValue::String(val) => val.parse::<f64>().ok(),
        AnyValue::StringOwned(val) => val.parse::<f64>().ok(),
        _ => None,
    }
}

fn derive_string_grid_from_dataframe(df: &DataFrame) -> Result<Vec<Vec<String>>> {
    let n_height = df.height();
    let n_width = df.width();
    let l_cols = df.get_columns();

    let mut l_grid = vec![vec![String::new(); n_width]; n_height];
    for (n_idx_row, l_row) in l_grid.iter_mut().enumerate() {
        for (n_idx_col, c_cell) in l_row.iter_mut().enumerate() {
            *c_cell = derive_header_text_from_any_value(l_cols[n_idx_col].get(n_idx_row)?);
        }
    }

    Ok(l_grid)
}

fn derive_header_text_from_any_value(value: AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(val) => val.to_string(),
        AnyValue::StringOwned(val) => val.to_string(),
        _ => value.to_string(),
    }
}

/// Convert a timestamp in `unit` since the Unix epoch (UTC) to an Excel serial.
pub fn derive_excel_serial_from_timestamp(value: i64, unit: TimeUnit) -> f64 {
    let n_units_per_day: f64 = match unit {
        TimeUnit::Nanoseconds => 86_400_000_000_000.0,
        TimeUnit::Microseconds => 86_400_000_000.0,
        TimeUnit::Milliseconds => 86_400_000.0,
    };
    value as f64 / n_units_per_day + N_DAYS_EXCEL_EPOCH_TO_UNIX as f64
}

fn derive_cell_value_from_any_value(value: AnyValue<'_>) -> EnumCellValue {
    match value {
        AnyValue::Null => EnumCellValue::None,
        AnyValue::String(val) => EnumCellValue::String(val.to_string()),
        AnyValue::StringOwned(val) => EnumCellValue::String(val.to_string()),
        AnyValue::Boolean(val) => {
            EnumCellValue::String(if val { "True" } else { "False" }.to_string())
        }
        AnyValue::UInt8(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt16(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt32(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int8(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int16(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int128(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float64(val) => EnumCellValue::Number(val),
        AnyValue::Date(n_days) => {
            EnumCellValue::Date((i64::from(n_days) + N_DAYS_EXCEL_EPOCH_TO_UNIX) as f64)
        }
        AnyValue::Datetime(val, unit, _) => {
            EnumCellValue::Datetime(derive_excel_serial_from_timestamp(val, unit))
        }
        AnyValue::DatetimeOwned(val, unit, _) => {
            EnumCellValue::Datetime(derive_excel_serial_from_timestamp(val, unit))
        }
        _ => EnumCellValue::String(value.to_string()),
    }
}

fn derive_slice_indices(
    indices: &[usize],
    col_start_inclusive: usize,
    col_end_exclusive: usize,
) -> Vec<usize> {
    indices
        .iter()
        .filter_map(|idx| {
            if *idx >= col_start_inclusive && *idx < col_end_exclusive {
                Some(*idx - col_start_inclusive)
            } else {
                None
            }
        })
        .collect()
}

fn write_header(
    worksheet: &mut Worksheet,
    mut header_grid: Vec<Vec<String>>,
    if_merge: bool,
    fmt_header: &Format,
) -> Result<()> {
    let mut dict_horizontal_merges_by_row = BTreeMap::new();
    if if_merge {
        apply_vertical_run_text_blankout(&mut header_grid)?;
        dict_horizontal_merges_by_row = plan_horizontal_merges(&header_grid);
    }
    let set_horizontal_merge_tracker =
        derive_horizontal_merge_tracker(&dict_horizontal_merges_by_row);

    for (row_idx, row_values) in header_grid.iter().enumerate() {
        for (col_idx, cell_value) in row_values.iter().enumerate() {
            if set_horizontal_merge_tracker.contains(&(row_idx, col_idx)) {
                continue;
            }

            if cell_value.is_empty() {
                worksheet.write_blank(cast_row_num(row_idx)?, cast_col_num(col_idx)?, fmt_header)?;
            } else {
                worksheet.write_string_with_format(
                    cast_row_num(row_idx)?,
                    cast_col_num(col_idx)?,
                    cell_value,
                    fmt_header,
                )?;
            }
        }

        if let Some(l_merges) = dict_horizontal_merges_by_row.get(&row_idx) {
            for merge in l_merges {
                worksheet.merge_range(
                    cast_row_num(row_idx)?,
                    cast_col_num(merge.col_idx_start)?,
                    cast_row_num(row_idx)?,
                    cast_col_num(merge.col_idx_end)?,
                    &merge.text,
                    fmt_header,
                )?;
            }
        }
    }

    Ok(())
}

/// Render buffered body cells, then the merged regions with every covered value.
fn write_sheet_grid(
    worksheet: &mut Worksheet,
    grid: &SheetGrid,
    l_fmt_by_style: &[Format],
) -> Result<()> {
    let get_format = |style: IdCellStyle| {
        l_fmt_by_style.get(style.0).ok_or_else(|| {
            ExportError::PreconditionViolation(format!("unknown cell style handle {}", style.0))
        })
    };

    for (&(n_row, n_col), cell) in grid.cells() {
        write_cell_with_format(worksheet, n_row, n_col, &cell.value, get_format(cell.style)?)?;
    }

    for region in grid.merged_regions() {
        let anchor = grid
            .cell_at(region.row_first, region.col)
            .ok_or(ExportError::MissingAnchorCell {
                row: region.row_first,
                col: region.col,
            })?;
        let format = get_format(anchor.style)?;
        worksheet.merge_range(
            cast_row_num(region.row_first)?,
            cast_col_num(region.col)?,
            cast_row_num(region.row_last)?,
            cast_col_num(region.col)?,
            "",
            format,
        )?;
        // merge_range blanks the whole range; restore typed values so formulas
        // over hidden rows still see them
        for n_row in region.row_first..=region.row_last {
            if let Some(cell) = grid.cell_at(n_row, region.col) {
                write_cell_with_format(worksheet, n_row, region.col, &cell.value, format)?;
            }
        }
    }

    Ok(())
}

fn write_sub_footer(
    worksheet: &mut Worksheet,
    c_function: &str,
    n_rows_header: usize,
    n_rows_data: usize,
    set_cols_idx_numeric: &BTreeSet<usize>,
    plan_col_formats: &SpecColumnFormatPlan,
    fmt_sub_footer: &SpecCellFormat,
) -> Result<()> {
    let n_row_footer = n_rows_header + n_rows_data;
    for (n_idx_col, fmt_col) in plan_col_formats.fmts_by_col.iter().enumerate() {
        if !set_cols_idx_numeric.contains(&n_idx_col) {
            worksheet.write_blank(
                cast_row_num(n_row_footer)?,
                cast_col_num(n_idx_col)?,
                &derive_rust_xlsx_format(fmt_sub_footer),
            )?;
            continue;
        }

        let fmt_cell = derive_rust_xlsx_format(&fmt_sub_footer.with_(SpecCellFormat {
            num_format: fmt_col.num_format.clone(),
            ..Default::default()
        }));
        let c_col = convert_col_idx_to_label(n_idx_col);
        let c_formula = format!(
            "={c_function}({c_col}{}:{c_col}{})",
            n_rows_header + 1,
            n_rows_header + n_rows_data
        );
        worksheet.write_formula_with_format(
            cast_row_num(n_row_footer)?,
            cast_col_num(n_idx_col)?,
            c_formula.as_str(),
            &fmt_cell,
        )?;
    }
    Ok(())
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<()> {
    let n_row = cast_row_num(row_idx)?;
    let n_col = cast_col_num(col_idx)?;
    match value {
        EnumCellValue::None => {
            worksheet.write_blank(n_row, n_col, format)?;
        }
        EnumCellValue::String(val) => {
            worksheet.write_string_with_format(n_row, n_col, val, format)?;
        }
        EnumCellValue::Number(val) | EnumCellValue::Date(val) | EnumCellValue::Datetime(val) => {
            worksheet.write_number_with_format(n_row, n_col, *val, format)?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }

    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if let Some(val) = spec.top {
        format = format.set_border_top(derive_format_border(val));
    }
    if let Some(val) = spec.bottom {
        format = format.set_border_bottom(derive_format_border(val));
    }
    if let Some(val) = spec.left {
        format = format.set_border_left(derive_format_border(val));
    }
    if let Some(val) = spec.right {
        format = format.set_border_right(derive_format_border(val));
    }

    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        8 => FormatBorder::MediumDashed,
        9 => FormatBorder::DashDot,
        10 => FormatBorder::MediumDashDot,
        11 => FormatBorder::DashDotDot,
        12 => FormatBorder::MediumDashDotDot,
        13 => FormatBorder::SlantDashDot,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "fill" => Some(FormatAlign::Fill),
        "justify" => Some(FormatAlign::Justify),
        "center_across" => Some(FormatAlign::CenterAcross),
        "distributed" => Some(FormatAlign::Distributed),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        "vjustify" | "vertical_justify" => Some(FormatAlign::VerticalJustify),
        "vdistributed" | "vertical_distributed" => Some(FormatAlign::VerticalDistributed),
        _ => None,
    }
}

fn cast_row_num(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| ExportError::IndexOverflow(format!("row index {value}")))
}

fn cast_col_num(value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| ExportError::IndexOverflow(format!("column index {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_column_formats_picks_role_formats() {
        let styler = SpecStyler::default();
        let write_options = SpecXlsxWriteOptions::default();
        let plan = plan_column_formats(SpecColumnFormatPlanOptions {
            width_data: 5,
            cols_idx_numeric: &[1, 2],
            cols_idx_integer: &[1],
            cols_idx_decimal: None,
            cols_idx_scientific: &[],
            cols_idx_date: &[3],
            cols_idx_datetime: &[4],
            styler: &styler,
            write_options: &write_options,
        });

        assert_eq!(plan.fmts_by_col[0], styler.common_data);
        assert_eq!(plan.fmts_by_col[1], styler.number);
        assert_eq!(plan.fmts_by_col[2], styler.decimal);
        assert_eq!(plan.fmts_by_col[3], styler.date);
        assert_eq!(plan.fmts_by_col[4], styler.datetime);
    }

    #[test]
    fn test_plan_column_formats_applies_base_patch() {
        let styler = SpecStyler::default();
        let write_options = SpecXlsxWriteOptions {
            base_format_patch: SpecCellFormat {
                border: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        let plan = plan_column_formats(SpecColumnFormatPlanOptions {
            width_data: 1,
            cols_idx_numeric: &[],
            cols_idx_integer: &[],
            cols_idx_decimal: None,
            cols_idx_scientific: &[],
            cols_idx_date: &[],
            cols_idx_datetime: &[],
            styler: &styler,
            write_options: &write_options,
        });

        assert_eq!(plan.fmts_by_col[0].border, Some(0));
        assert_eq!(plan.fmts_by_col[0].font_name, styler.common_data.font_name);
    }

    #[test]
    fn test_excel_serials() {
        assert_eq!(
            derive_cell_value_from_any_value(AnyValue::Date(0)),
            EnumCellValue::Date(25_569.0)
        );
        assert_eq!(
            derive_excel_serial_from_timestamp(43_200_000, TimeUnit::Milliseconds),
            25_569.5
        );
        assert_eq!(
            derive_excel_serial_from_timestamp(86_400_000_000, TimeUnit::Microseconds),
            25_570.0
        );
    }

    #[test]
    fn test_estimate_width_len() {
        let policy = SpecXlsxValuePolicy::default();
        assert_eq!(
            estimate_width_len(&EnumCellValue::Number(12.0), true, true, false, false, &policy),
            2
        );
        assert_eq!(
            estimate_width_len(&EnumCellValue::None, false, false, false, true, &policy),
            2
        );
        assert_eq!(
            estimate_width_len(&EnumCellValue::Date(1.0), false, false, false, false, &policy),
            10
        );
    }

    #[test]
    fn test_write_sheet_grid_renders_merged_regions() {
        let mut style_table = StyleTable::new();
        let id_plain = style_table.allocate(&SpecCellFormat::default());
        let id_merged = style_table.allocate(&SpecCellFormat {
            valign: Some("vcenter".to_string()),
            ..Default::default()
        });
        let mut grid = SheetGrid::new("data");
        for n_row in 1..4 {
            grid.put_cell(n_row, 0, EnumCellValue::Number(7.0), id_plain);
        }
        crate::merge::merge_region(&mut grid, id_merged, 1, 3, 0).unwrap();

        let l_fmt_by_style: Vec<Format> = style_table
            .formats()
            .iter()
            .map(derive_rust_xlsx_format)
            .collect();
        let mut worksheet = Worksheet::new();
        write_sheet_grid(&mut worksheet, &grid, &l_fmt_by_style).unwrap();

        // overlapping a rendered region is rejected by the worksheet itself
        assert!(
            worksheet
                .merge_range(2, 0, 4, 0, "", &Format::new())
                .is_err()
        );
    }

    #[test]
    fn test_write_sheet_grid_rejects_unknown_style() {
        let mut grid = SheetGrid::new("data");
        grid.put_cell(0, 0, EnumCellValue::None, IdCellStyle(5));
        let mut worksheet = Worksheet::new();
        assert!(matches!(
            write_sheet_grid(&mut worksheet, &grid, &[]),
            Err(ExportError::PreconditionViolation(_))
        ));
    }
}
