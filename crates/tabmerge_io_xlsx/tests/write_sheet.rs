use std::fs::File;
use std::io::Read;
use std::path::Path;

use polars::df;
use polars::prelude::DataFrame;
use pretty_assertions::assert_eq;
use tabmerge_io_xlsx::{
    DataFrameSource, EnumSubFooter, ExportError, SpecMergedRegion, SpecStyler,
    SpecXlsxSheetWriteOptions, SpecXlsxWriteOptions, StylerBuilder, XlsxWriter,
};
use tempfile::TempDir;

fn sales_df() -> DataFrame {
    df!(
        "region" => &["north", "north", "south", "south", "south", "west"],
        "qty" => &[1i64, 1, 3, 4, 5, 6]
    )
    .unwrap()
}

fn new_writer(dir: &TempDir) -> XlsxWriter {
    XlsxWriter::new(
        dir.path().join("out.xlsx"),
        SpecStyler::default(),
        SpecXlsxWriteOptions::default(),
    )
}

fn merge_options(cols: &[&str]) -> SpecXlsxSheetWriteOptions {
    SpecXlsxSheetWriteOptions {
        cols_merge: Some(cols.iter().map(|col| col.to_string()).collect()),
        ..Default::default()
    }
}

fn region(row_first: usize, row_last: usize, col: usize) -> SpecMergedRegion {
    SpecMergedRegion {
        row_first,
        row_last,
        col,
    }
}

#[test]
fn test_merge_columns_are_reported_at_sheet_rows() {
    let dir = TempDir::new().unwrap();
    let mut writer = new_writer(&dir);
    writer
        .write_sheet_from_dataframes(&sales_df(), "sales", None, &merge_options(&["region", "qty"]))
        .unwrap();
    writer.close().unwrap();

    let l_reports = writer.report();
    assert_eq!(l_reports.len(), 1);
    assert_eq!(l_reports[0].merges.len(), 1);
    assert_eq!(l_reports[0].merges[0].sheet_name, "sales");
    assert_eq!(
        l_reports[0].merges[0].regions,
        vec![region(1, 2, 0), region(1, 2, 1), region(3, 5, 0)]
    );
    assert!(dir.path().join("out.xlsx").is_file());
}

#[test]
fn test_no_merge_columns_means_no_regions() {
    let dir = TempDir::new().unwrap();
    let mut writer = new_writer(&dir);
    writer
        .write_sheet_from_dataframes(&sales_df(), "sales", None, &Default::default())
        .unwrap();

    assert!(writer.report()[0].merges[0].regions.is_empty());
}

#[test]
fn test_custom_header_offsets_regions() {
    let dir = TempDir::new().unwrap();
    let mut writer = new_writer(&dir);
    let df_header = df!(
        "h_region" => &["Sales", "Region"],
        "h_qty" => &["Sales", "Qty"]
    )
    .unwrap();
    let options = SpecXlsxSheetWriteOptions {
        if_merge_header: true,
        ..merge_options(&["region"])
    };
    writer
        .write_sheet_from_dataframes(&sales_df(), "sales", Some(&df_header), &options)
        .unwrap();
    writer.close().unwrap();

    assert_eq!(
        writer.report()[0].merges[0].regions,
        vec![region(2, 3, 0), region(4, 6, 0)]
    );
}

#[test]
fn test_missing_values_form_runs() {
    let dir = TempDir::new().unwrap();
    let mut writer = new_writer(&dir);
    let df_data = df!(
        "key" => &[Some("a"), None, None, Some("a")]
    )
    .unwrap();
    writer
        .write_sheet_from_dataframes(&df_data, "keys", None, &merge_options(&["key"]))
        .unwrap();

    assert_eq!(writer.report()[0].merges[0].regions, vec![region(2, 3, 0)]);
}

#[test]
fn test_empty_result_writes_header_only() {
    let dir = TempDir::new().unwrap();
    let mut writer = new_writer(&dir);
    let df_data = sales_df().head(Some(0));
    writer
        .write_sheet_from_dataframes(&df_data, "empty", None, &merge_options(&["region"]))
        .unwrap();
    writer.close().unwrap();

    let l_reports = writer.report();
    assert!(l_reports[0].merges[0].regions.is_empty());
    assert_eq!(l_reports[0].sheets[0].row_end_exclusive, 0);
}

#[test]
fn test_sub_footer_and_template_styler() {
    let dir = TempDir::new().unwrap();
    let styler = StylerBuilder::new()
        .with_style_template(tabmerge_io_xlsx::EnumStyleTemplate::Summer)
        .build()
        .unwrap();
    let mut writer = XlsxWriter::new(
        dir.path().join("footer.xlsx"),
        styler,
        SpecXlsxWriteOptions::default(),
    );
    let options = SpecXlsxSheetWriteOptions {
        sub_footer: EnumSubFooter::Sum,
        ..merge_options(&["region"])
    };
    writer
        .write_sheet_from_dataframes(&sales_df(), "sales", None, &options)
        .unwrap();
    writer.close().unwrap();

    assert_eq!(
        writer.report()[0].merges[0].regions,
        vec![region(1, 2, 0), region(3, 5, 0)]
    );
    assert!(dir.path().join("footer.xlsx").is_file());
}

fn read_sheet_xml(path: &Path, n_sheet: usize) -> String {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entry = archive
        .by_name(&format!("xl/worksheets/sheet{n_sheet}.xml"))
        .unwrap();
    let mut c_xml = String::new();
    entry.read_to_string(&mut c_xml).unwrap();
    c_xml
}

/// XML of one `<c>` element, empty when the cell is absent.
fn cell_xml<'a>(c_xml: &'a str, cell_ref: &str) -> &'a str {
    let c_open = format!("<c r=\"{cell_ref}\"");
    let Some(n_start) = c_xml
        .match_indices(&c_open)
        .map(|(n_idx, _)| n_idx)
        .find(|n_idx| matches!(c_xml.as_bytes()[n_idx + c_open.len()], b' ' | b'>' | b'/'))
    else {
        return "";
    };
    let c_rest = &c_xml[n_start..];
    let n_end = [c_rest.find("</c>").map(|n| n + 4), c_rest.find("/>").map(|n| n + 2)]
        .into_iter()
        .flatten()
        .min()
        .unwrap();
    &c_rest[..n_end]
}

#[test]
fn test_merged_numeric_cells_keep_values_for_sub_footer() {
    let dir = TempDir::new().unwrap();
    let path_out = dir.path().join("totals.xlsx");
    let mut writer = XlsxWriter::new(
        path_out.clone(),
        SpecStyler::default(),
        SpecXlsxWriteOptions::default(),
    );
    let df_data = df!(
        "name" => &["a", "b", "c", "d"],
        "qty" => &[5i64, 5, 5, 1]
    )
    .unwrap();
    let options = SpecXlsxSheetWriteOptions {
        sub_footer: EnumSubFooter::Sum,
        ..merge_options(&["qty"])
    };
    writer
        .write_sheet_from_dataframes(&df_data, "totals", None, &options)
        .unwrap();
    writer.close().unwrap();

    let c_xml = read_sheet_xml(&path_out, 1);
    assert!(c_xml.contains(r#"<mergeCell ref="B2:B4"/>"#), "{c_xml}");
    for cell_ref in ["B2", "B3", "B4"] {
        assert!(cell_xml(&c_xml, cell_ref).contains("<v>5</v>"), "{cell_ref}: {c_xml}");
    }
    assert!(cell_xml(&c_xml, "B5").contains("<v>1</v>"));
    assert!(cell_xml(&c_xml, "B6").contains("<f>SUM(B2:B5)</f>"));

    // unmerged text column is written straight through
    for cell_ref in ["A2", "A3", "A4", "A5"] {
        assert!(cell_xml(&c_xml, cell_ref).contains(r#"t="s""#), "{cell_ref}: {c_xml}");
    }
    assert!(!c_xml.contains("<mergeCell ref=\"A"));
}

#[test]
fn test_write_sheet_from_source() {
    let dir = TempDir::new().unwrap();
    let mut writer = new_writer(&dir);
    let source = DataFrameSource::new(sales_df());
    writer
        .write_sheet_from_source(&source, "from_source", &merge_options(&["region"]))
        .unwrap();
    writer
        .write_sheet_from_source(&source, "from_source", &merge_options(&["region"]))
        .unwrap();
    writer.close().unwrap();

    let l_reports = writer.report();
    assert_eq!(l_reports.len(), 2);
    assert_eq!(l_reports[1].merges[0].sheet_name, "from_source__2");
    assert_eq!(l_reports[0].merges[0].regions, l_reports[1].merges[0].regions);
}

#[test]
fn test_unknown_merge_column_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut writer = new_writer(&dir);
    let result =
        writer.write_sheet_from_dataframes(&sales_df(), "sales", None, &merge_options(&["nope"]));

    assert!(matches!(result, Err(ExportError::InvalidOptions(_))));
}

#[test]
fn test_write_after_close_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut writer = new_writer(&dir);
    writer.close().unwrap();
    writer.close().unwrap();

    let result = writer.write_sheet_from_dataframes(&sales_df(), "sales", None, &Default::default());
    assert!(matches!(result, Err(ExportError::Closed)));
}
