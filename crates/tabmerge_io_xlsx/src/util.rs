//! Stateless helper utilities used by the XLSX writer.

use std::collections::{BTreeMap, BTreeSet};

use crate::conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
use crate::error::{ExportError, Result};
use crate::merge::RunDetector;
use crate::spec::{
    EnumCellValue, EnumIntegerCoerceMode, SpecSheetHorizontalMerge, SpecSheetSlice,
    SpecXlsxReport, SpecXlsxRowChunkPolicy, SpecXlsxValuePolicy,
};

////////////////////////////////////////////////////////////////////////////////
// #region CellValueConversion

/// Convert `NaN`/`Inf` to policy string; `None` for finite values.
pub fn convert_nan_inf_to_str(x: f64, value_policy: &SpecXlsxValuePolicy) -> Option<String> {
    if x.is_nan() {
        return Some(value_policy.nan_str.clone());
    }
    if x.is_infinite() {
        return Some(if x.is_sign_positive() {
            value_policy.posinf_str.clone()
        } else {
            value_policy.neginf_str.clone()
        });
    }
    None
}

fn convert_non_finite(
    x: f64,
    if_keep_missing_values: bool,
    value_policy: &SpecXlsxValuePolicy,
) -> EnumCellValue {
    if if_keep_missing_values {
        EnumCellValue::String(
            convert_nan_inf_to_str(x, value_policy).unwrap_or_else(|| value_policy.nan_str.clone()),
        )
    } else {
        EnumCellValue::None
    }
}

/// Normalize cell value according to numeric/integer flags and value policy.
///
/// Date/datetime serials pass through untouched.
pub fn convert_cell_value(
    value: &EnumCellValue,
    if_is_numeric_col: bool,
    if_is_integer_col: bool,
    if_keep_missing_values: bool,
    value_policy: &SpecXlsxValuePolicy,
) -> EnumCellValue {
    match value {
        EnumCellValue::None => {
            return if if_keep_missing_values {
                EnumCellValue::String(value_policy.missing_value_str.clone())
            } else {
                EnumCellValue::None
            };
        }
        EnumCellValue::Date(_) | EnumCellValue::Datetime(_) => return value.clone(),
        EnumCellValue::String(_) | EnumCellValue::Number(_) => {}
    }

    if !if_is_numeric_col {
        return match value {
            EnumCellValue::Number(n) => EnumCellValue::String(n.to_string()),
            _ => value.clone(),
        };
    }

    if if_is_integer_col {
        return match value {
            EnumCellValue::Number(n) => {
                if !n.is_finite() {
                    convert_non_finite(*n, if_keep_missing_values, value_policy)
                } else if value_policy.integer_coerce == EnumIntegerCoerceMode::Coerce {
                    EnumCellValue::Number(*n as i64 as f64)
                } else if n.fract() == 0.0 {
                    EnumCellValue::Number(*n)
                } else {
                    EnumCellValue::String(n.to_string())
                }
            }
            EnumCellValue::String(s) => {
                if let Ok(v) = s.parse::<i64>() {
                    EnumCellValue::Number(v as f64)
                } else if value_policy.integer_coerce == EnumIntegerCoerceMode::Coerce
                    && let Ok(v) = s.parse::<f64>()
                {
                    if v.is_finite() {
                        EnumCellValue::Number(v as i64 as f64)
                    } else {
                        convert_non_finite(v, if_keep_missing_values, value_policy)
                    }
                } else {
                    EnumCellValue::String(s.clone())
                }
            }
            _ => value.clone(),
        };
    }

    match value {
        EnumCellValue::Number(n) => {
            if n.is_finite() {
                EnumCellValue::Number(*n)
            } else {
                convert_non_finite(*n, if_keep_missing_values, value_policy)
            }
        }
        EnumCellValue::String(s) => match s.parse::<f64>() {
            Ok(v) if v.is_finite() => EnumCellValue::Number(v),
            Ok(v) => convert_non_finite(v, if_keep_missing_values, value_policy),
            Err(_) => EnumCellValue::String(s.clone()),
        },
        _ => value.clone(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DataFrameLikeUtils

/// Validate that `columns` has no duplicated names.
pub fn validate_unique_columns(columns: &[String]) -> Result<()> {
    if columns.len() == columns.iter().collect::<BTreeSet<_>>().len() {
        return Ok(());
    }

    let mut dict_pos: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (n_idx, c_name) in columns.iter().enumerate() {
        dict_pos.entry(c_name).or_default().push(n_idx);
    }

    let c_msg = dict_pos
        .iter()
        .filter_map(|(c_name, l_pos)| {
            if l_pos.len() > 1 {
                Some(format!(
                    "{c_name:?} x{} at indices {:?}",
                    l_pos.len(),
                    l_pos
                ))
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("; ");

    Err(ExportError::InvalidInput(format!(
        "Duplicate column names detected: {c_msg}"
    )))
}

/// Resolve mixed refs (`name` or numeric string index) to sorted unique indices.
pub fn select_sorted_indices_from_refs(
    columns: &[String],
    refs: Option<&[String]>,
) -> Result<Vec<usize>> {
    let Some(refs) = refs else {
        return Ok(vec![]);
    };

    let mut set_idx = BTreeSet::new();
    for ref_col in refs {
        if let Ok(n_idx) = ref_col.parse::<usize>() {
            if n_idx >= columns.len() {
                return Err(ExportError::InvalidOptions(format!(
                    "Column index out of range: {n_idx} (width {})",
                    columns.len()
                )));
            }
            set_idx.insert(n_idx);
            continue;
        }

        let Some(n_idx) = columns.iter().position(|c_name| c_name == ref_col) else {
            return Err(ExportError::InvalidOptions(format!(
                "Column not found: {ref_col:?}"
            )));
        };
        set_idx.insert(n_idx);
    }

    Ok(set_idx.into_iter().collect())
}

/// Convert 0-based column index to spreadsheet letters (`0 -> A`, `26 -> AA`).
pub fn convert_col_idx_to_label(col_idx: usize) -> String {
    let mut c_label = String::new();
    let mut n = col_idx + 1;
    while n > 0 {
        n -= 1;
        c_label.insert(0, char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    c_label
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowChunking

/// Derive row chunk size from dataframe width and chunk policy.
pub fn calculate_row_chunk_size(width_df: usize, policy: &SpecXlsxRowChunkPolicy) -> usize {
    if let Some(n_fixed_size) = policy.fixed_size {
        return n_fixed_size;
    }
    if width_df >= policy.width_large {
        return policy.size_large;
    }
    if width_df >= policy.width_medium {
        return policy.size_medium;
    }
    policy.size_default
}

/// Generate `(row_start, row_len)` chunks for `n_rows_total`.
pub fn generate_row_chunks(n_rows_total: usize, size_rows_chunk: usize) -> Vec<(usize, usize)> {
    let mut l_chunks = Vec::new();
    let mut n_row_cursor = 0;
    while n_row_cursor < n_rows_total {
        let n_rows_per_chunk = usize::min(size_rows_chunk, n_rows_total - n_row_cursor);
        l_chunks.push((n_row_cursor, n_rows_per_chunk));
        n_row_cursor += n_rows_per_chunk;
    }
    l_chunks
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Split logical dataframe range into Excel-compliant sheet slices.
///
/// `height_footer` rows are reserved below each slice body.
pub fn plan_sheet_slices(
    height_df: usize,
    width_df: usize,
    height_header: usize,
    height_footer: usize,
    sheet_name: &str,
    report: &mut SpecXlsxReport,
) -> Result<Vec<SpecSheetSlice>> {
    if height_header == 0 {
        return Err(ExportError::InvalidOptions(
            "height_header must be >= 1.".to_string(),
        ));
    }

    let n_rows_data_max = N_NROWS_EXCEL_MAX
        .checked_sub(height_header + height_footer)
        .filter(|n_rows| *n_rows > 0)
        .ok_or_else(|| {
            ExportError::InvalidOptions(format!(
                "Header too tall: height_header={height_header} exceeds Excel limit."
            ))
        })?;

    let mut l_col_slices = Vec::new();
    let mut n_col_start = 0;
    while n_col_start < width_df {
        let n_col_end = usize::min(width_df, n_col_start + N_NCOLS_EXCEL_MAX);
        l_col_slices.push((n_col_start, n_col_end));
        n_col_start = n_col_end;
    }

    let mut l_row_slices = Vec::new();
    let mut n_row_start = 0;
    while n_row_start < height_df {
        let n_row_end = usize::min(height_df, n_row_start + n_rows_data_max);
        l_row_slices.push((n_row_start, n_row_end));
        n_row_start = n_row_end;
    }

    if l_row_slices.is_empty() {
        l_row_slices.push((0, 0));
    }

    let n_parts_total = l_col_slices.len() * l_row_slices.len();

    let mut l_sheet_parts = Vec::new();
    let mut n_idx_part = 1;
    for (col_start, col_end) in &l_col_slices {
        for (row_start, row_end) in &l_row_slices {
            let c_part_sheet_name = if n_parts_total == 1 {
                sheet_name.to_string()
            } else {
                create_sheet_identifier(sheet_name, n_idx_part)
            };

            l_sheet_parts.push(SpecSheetSlice {
                sheet_name: c_part_sheet_name,
                row_start_inclusive: *row_start,
                row_end_exclusive: *row_end,
                col_start_inclusive: *col_start,
                col_end_exclusive: *col_end,
            });
            n_idx_part += 1;
        }
    }

    if n_parts_total > 1 {
        report.warn(format!(
            "Excel limit overflow: split into {} sheets (columns-first, then rows).",
            l_sheet_parts.len()
        ));
    }

    Ok(l_sheet_parts)
}

/// Create suffixed sheet name (`base_1`, `base_2`, ...), respecting length cap.
pub fn create_sheet_identifier(base_name: &str, part_idx_1based: usize) -> String {
    let c_sheet_name_suffix = format!("_{part_idx_1based}");
    let n_len_base_name_max = N_LEN_EXCEL_SHEET_NAME_MAX.saturating_sub(c_sheet_name_suffix.len());

    let c_sheet_name_base: String = base_name
        .chars()
        .take(usize::max(1, n_len_base_name_max))
        .collect();

    format!("{c_sheet_name_base}{c_sheet_name_suffix}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region HeaderMergeUtils

/// Plan horizontal merges for repeated non-empty header text per row.
pub fn plan_horizontal_merges(
    header_grid: &[Vec<String>],
) -> BTreeMap<usize, Vec<SpecSheetHorizontalMerge>> {
    let mut dict_horizontal_merges_map = BTreeMap::new();

    for (_idx_row, v_str_current_row) in header_grid.iter().enumerate() {
        let n_cols = v_str_current_row.len();
        let mut n_col_idx = 0;

        while n_col_idx < n_cols {
            let c_cell_val = &v_str_current_row[n_col_idx];
            if c_cell_val.is_empty() {
                n_col_idx += 1;
                continue;
            }

            let mut n_col_idx_end = n_col_idx + 1;
            while n_col_idx_end < n_cols && v_str_current_row[n_col_idx_end] == *c_cell_val {
                n_col_idx_end += 1;
            }

            if n_col_idx_end - n_col_idx > 1 {
                dict_horizontal_merges_map
                    .entry(_idx_row)
                    .or_insert_with(Vec::new)
                    .push(SpecSheetHorizontalMerge {
                        row_idx_start: _idx_row,
                        col_idx_start: n_col_idx,
                        col_idx_end: n_col_idx_end - 1,
                        text: c_cell_val.clone(),
                    });
            }
            n_col_idx = n_col_idx_end;
        }
    }

    dict_horizontal_merges_map
}

/// Vertical runs `(col, row_start, row_end, text)` of repeated non-empty header text.
///
/// Each column is scanned by its own [`RunDetector`]; empty cells break runs.
pub fn derive_vertical_header_runs(
    header_grid: &[Vec<String>],
) -> Result<Vec<(usize, usize, usize, String)>> {
    let mut v_run_collection = Vec::new();
    let Some(v_header_row_0) = header_grid.first() else {
        return Ok(v_run_collection);
    };

    let n_rows = header_grid.len();
    let n_cols = v_header_row_0.len();
    if header_grid.iter().any(|_row| _row.len() != n_cols) {
        return Err(ExportError::InvalidInput(
            "All header rows must have the same number of columns.".to_string(),
        ));
    }

    for n_idx_col in 0..n_cols {
        let mut detector = RunDetector::new();
        let mut l_ranges = Vec::new();
        for (n_idx_row, _row) in header_grid.iter().enumerate() {
            if let Some(range) = detector.observe(n_idx_row, Some(_row[n_idx_col].as_str()))? {
                l_ranges.push(range);
            }
        }
        if let Some(range) = detector.close(n_rows - 1)? {
            l_ranges.push(range);
        }

        for range in l_ranges {
            let c_text = &header_grid[range.row_first()][n_idx_col];
            if range.is_single_row() || c_text.is_empty() {
                continue;
            }
            v_run_collection.push((
                n_idx_col,
                range.row_first(),
                range.row_last(),
                c_text.clone(),
            ));
        }
    }

    Ok(v_run_collection)
}

/// Clear repeated text in vertical runs, keeping only first row text.
pub fn apply_vertical_run_text_blankout(header_grid: &mut [Vec<String>]) -> Result<()> {
    for (col_idx, row_start, row_end, _) in derive_vertical_header_runs(header_grid)? {
        for _row in header_grid.iter_mut().take(row_end + 1).skip(row_start + 1) {
            _row[col_idx].clear();
        }
    }
    Ok(())
}

/// Build lookup set of cells covered by a horizontal merge (excluding anchor).
pub fn derive_horizontal_merge_tracker(
    row_horizontal_merge_mapping: &BTreeMap<usize, Vec<SpecSheetHorizontalMerge>>,
) -> BTreeSet<(usize, usize)> {
    let mut set_merged_cells = BTreeSet::new();

    for (row_idx, horizontal_merges) in row_horizontal_merge_mapping {
        for merge in horizontal_merges {
            for col_idx in (merge.col_idx_start + 1)..=merge.col_idx_end {
                set_merged_cells.insert((*row_idx, col_idx));
            }
        }
    }

    set_merged_cells
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|val| val.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_vertical_header_runs_detect_only_contiguous_non_empty_runs() {
        let grid = grid(&[
            &["A", "X"],
            &["A", ""],
            &["A", "X"],
            &["", "X"],
            &["B", "X"],
            &["B", "Y"],
        ]);

        assert_eq!(
            derive_vertical_header_runs(&grid).unwrap(),
            vec![
                (0, 0, 2, "A".to_string()),
                (0, 4, 5, "B".to_string()),
                (1, 2, 4, "X".to_string())
            ]
        );
    }

    #[test]
    fn test_vertical_header_runs_reject_ragged_grid() {
        let grid = grid(&[&["A", "B"], &["A"]]);
        assert!(matches!(
            derive_vertical_header_runs(&grid),
            Err(ExportError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_apply_vertical_run_text_blankout() {
        let mut grid = grid(&[
            &["A", "B"],
            &["A", "B"],
            &["", "B"],
            &["C", "B"],
            &["C", ""],
        ]);

        apply_vertical_run_text_blankout(&mut grid).unwrap();

        assert_eq!(grid[0][0], "A");
        assert_eq!(grid[1][0], "");
        assert_eq!(grid[3][0], "C");
        assert_eq!(grid[4][0], "");

        assert_eq!(grid[0][1], "B");
        assert_eq!(grid[1][1], "");
        assert_eq!(grid[2][1], "");
        assert_eq!(grid[3][1], "");
    }

    #[test]
    fn test_plan_horizontal_merges_and_tracker() {
        let grid = grid(&[&["G", "G", "G", "H"], &["a", "b", "", ""]]);
        let dict_merges = plan_horizontal_merges(&grid);
        assert_eq!(
            dict_merges.get(&0).unwrap(),
            &vec![SpecSheetHorizontalMerge {
                row_idx_start: 0,
                col_idx_start: 0,
                col_idx_end: 2,
                text: "G".to_string(),
            }]
        );
        assert!(!dict_merges.contains_key(&1));

        let set_tracker = derive_horizontal_merge_tracker(&dict_merges);
        assert_eq!(
            set_tracker.into_iter().collect::<Vec<_>>(),
            vec![(0, 1), (0, 2)]
        );
    }

    #[test]
    fn test_convert_cell_value_policies() {
        let policy = SpecXlsxValuePolicy::default();
        assert_eq!(
            convert_cell_value(&EnumCellValue::None, false, false, true, &policy),
            EnumCellValue::String("NA".to_string())
        );
        assert_eq!(
            convert_cell_value(&EnumCellValue::Number(2.5), true, true, false, &policy),
            EnumCellValue::String("2.5".to_string())
        );
        assert_eq!(
            convert_cell_value(&EnumCellValue::Number(f64::NAN), true, false, true, &policy),
            EnumCellValue::String("NaN".to_string())
        );
        assert_eq!(
            convert_cell_value(&EnumCellValue::String("12".to_string()), true, true, false, &policy),
            EnumCellValue::Number(12.0)
        );
        assert_eq!(
            convert_cell_value(&EnumCellValue::Date(45_000.0), false, false, false, &policy),
            EnumCellValue::Date(45_000.0)
        );
        assert_eq!(convert_nan_inf_to_str(1.0, &policy), None);
    }

    #[test]
    fn test_select_sorted_indices_from_refs() {
        let columns = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let refs = vec!["c".to_string(), "0".to_string(), "c".to_string()];
        assert_eq!(
            select_sorted_indices_from_refs(&columns, Some(&refs)).unwrap(),
            vec![0, 2]
        );
        assert!(matches!(
            select_sorted_indices_from_refs(&columns, Some(&["zz".to_string()])),
            Err(ExportError::InvalidOptions(_))
        ));
        assert!(matches!(
            select_sorted_indices_from_refs(&columns, Some(&["9".to_string()])),
            Err(ExportError::InvalidOptions(_))
        ));
        assert!(select_sorted_indices_from_refs(&columns, None).unwrap().is_empty());
    }

    #[test]
    fn test_validate_unique_columns() {
        assert!(validate_unique_columns(&["a".to_string(), "b".to_string()]).is_ok());
        assert!(matches!(
            validate_unique_columns(&["a".to_string(), "a".to_string()]),
            Err(ExportError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_plan_sheet_slices_reserves_footer_rows() {
        let mut report = SpecXlsxReport::default();
        let l_parts = plan_sheet_slices(N_NROWS_EXCEL_MAX, 2, 1, 1, "data", &mut report).unwrap();
        assert_eq!(l_parts.len(), 2);
        assert_eq!(l_parts[0].row_end_exclusive, N_NROWS_EXCEL_MAX - 2);
        assert_eq!(l_parts[0].sheet_name, "data_1");
        assert_eq!(report.warnings.len(), 1);

        let l_parts = plan_sheet_slices(0, 2, 1, 0, "data", &mut report).unwrap();
        assert_eq!(l_parts.len(), 1);
        assert_eq!(l_parts[0].row_end_exclusive, 0);
    }

    #[test]
    fn test_col_labels_and_sheet_names() {
        assert_eq!(convert_col_idx_to_label(0), "A");
        assert_eq!(convert_col_idx_to_label(25), "Z");
        assert_eq!(convert_col_idx_to_label(26), "AA");
        assert_eq!(convert_col_idx_to_label(701), "ZZ");
        assert_eq!(sanitize_sheet_name(" a/b:c ", "_"), "a_b_c");
        assert_eq!(sanitize_sheet_name("***", ""), "Sheet");
        assert_eq!(create_sheet_identifier(&"x".repeat(40), 12).len(), 31);
    }
}
