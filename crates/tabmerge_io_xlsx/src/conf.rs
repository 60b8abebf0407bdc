//! XLSX constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{EnumStyleTemplate, SpecCellFormat, SpecStyler};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];
/// Days between the Excel epoch (1899-12-30) and the Unix epoch.
pub const N_DAYS_EXCEL_EPOCH_TO_UNIX: i64 = 25_569;

/// Build named format presets for `template`.
///
/// Keys: `text`, `header`, `sub_footer`, `integer`, `decimal`, `scientific`,
/// `date`, `datetime`.
pub fn derive_style_template_formats(
    template: EnumStyleTemplate,
) -> BTreeMap<String, SpecCellFormat> {
    let (cfg_base_fmt_spec, cfg_header_patch) = match template {
        EnumStyleTemplate::Standard => (
            SpecCellFormat {
                font_name: Some("Times New Roman".to_string()),
                font_size: Some(11),
                border: Some(1),
                align: Some("left".to_string()),
                valign: Some("vcenter".to_string()),
                ..Default::default()
            },
            SpecCellFormat {
                bold: Some(true),
                align: Some("center".to_string()),
                ..Default::default()
            },
        ),
        EnumStyleTemplate::Plain => (
            SpecCellFormat {
                font_name: Some("Calibri".to_string()),
                font_size: Some(11),
                border: Some(0),
                ..Default::default()
            },
            SpecCellFormat {
                bold: Some(true),
                ..Default::default()
            },
        ),
        EnumStyleTemplate::Summer => (
            SpecCellFormat {
                font_name: Some("Calibri".to_string()),
                font_size: Some(11),
                border: Some(1),
                valign: Some("vcenter".to_string()),
                ..Default::default()
            },
            SpecCellFormat {
                bold: Some(true),
                align: Some("center".to_string()),
                bg_color: Some("#F9C74F".to_string()),
                font_color: Some("#1D3557".to_string()),
                ..Default::default()
            },
        ),
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert("text".to_string(), cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        "header".to_string(),
        cfg_base_fmt_spec.with_(cfg_header_patch),
    );
    dict_fmt.insert(
        "sub_footer".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            top: Some(6),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "integer".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "decimal".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0.0000".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "scientific".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0.00E+0".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "date".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("yyyy-mm-dd".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "datetime".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("yyyy-mm-dd hh:mm:ss".to_string()),
            ..Default::default()
        }),
    );

    dict_fmt
}

/// Build the per-role styler of `template`.
pub fn derive_template_styler(template: EnumStyleTemplate) -> SpecStyler {
    let dict_fmt = derive_style_template_formats(template);
    let get = |key: &str| dict_fmt.get(key).cloned().unwrap_or_default();
    SpecStyler {
        header: get("header"),
        sub_footer: get("sub_footer"),
        common_data: get("text"),
        date: get("date"),
        datetime: get("datetime"),
        number: get("integer"),
        decimal: get("decimal"),
        scientific: get("scientific"),
    }
}

impl Default for SpecStyler {
    fn default() -> Self {
        derive_template_styler(EnumStyleTemplate::Standard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_template_defines_all_roles() {
        for template in [
            EnumStyleTemplate::Standard,
            EnumStyleTemplate::Plain,
            EnumStyleTemplate::Summer,
        ] {
            let dict_fmt = derive_style_template_formats(template);
            for key in [
                "text",
                "header",
                "sub_footer",
                "integer",
                "decimal",
                "scientific",
                "date",
                "datetime",
            ] {
                assert!(dict_fmt.contains_key(key), "{template:?} lacks {key}");
            }
        }
    }

    #[test]
    fn test_default_styler_is_standard() {
        let styler = SpecStyler::default();
        assert_eq!(styler.header.bold, Some(true));
        assert_eq!(styler.number.num_format.as_deref(), Some("0"));
        assert_eq!(styler.date.num_format.as_deref(), Some("yyyy-mm-dd"));
        assert_eq!(
            styler.common_data.font_name.as_deref(),
            Some("Times New Roman")
        );
    }
}
