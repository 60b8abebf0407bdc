//! Builder resolving per-role cell formats from a style template.

use crate::conf::derive_template_styler;
use crate::spec::{EnumStyleTemplate, SpecCellFormat, SpecStyler};

/// Builder for [`SpecStyler`].
///
/// Roles left unset fall back to the chosen template, or to
/// [`EnumStyleTemplate::Standard`] when no template was chosen.
#[derive(Debug, Clone, Default)]
pub struct StylerBuilder {
    style_template: Option<EnumStyleTemplate>,
    header: Option<SpecCellFormat>,
    sub_footer: Option<SpecCellFormat>,
    common_data: Option<SpecCellFormat>,
    date: Option<SpecCellFormat>,
    datetime: Option<SpecCellFormat>,
    number: Option<SpecCellFormat>,
    decimal: Option<SpecCellFormat>,
}

impl StylerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_style_template(mut self, style_template: EnumStyleTemplate) -> Self {
        self.style_template = Some(style_template);
        self
    }

    pub fn with_header_cell_style(mut self, fmt: Option<SpecCellFormat>) -> Self {
        self.header = fmt;
        self
    }

    pub fn with_sub_footer_cell_style(mut self, fmt: Option<SpecCellFormat>) -> Self {
        self.sub_footer = fmt;
        self
    }

    pub fn with_common_data_cell_style(mut self, fmt: Option<SpecCellFormat>) -> Self {
        self.common_data = fmt;
        self
    }

    pub fn with_date_cell_style(mut self, fmt: Option<SpecCellFormat>) -> Self {
        self.date = fmt;
        self
    }

    pub fn with_datetime_cell_style(mut self, fmt: Option<SpecCellFormat>) -> Self {
        self.datetime = fmt;
        self
    }

    pub fn with_number_cell_style(mut self, fmt: Option<SpecCellFormat>) -> Self {
        self.number = fmt;
        self
    }

    pub fn with_decimal_cell_style(mut self, fmt: Option<SpecCellFormat>) -> Self {
        self.decimal = fmt;
        self
    }

    /// Resolve the styler; `None` when nothing at all was configured.
    pub fn build(self) -> Option<SpecStyler> {
        let if_configured = self.style_template.is_some()
            || self.header.is_some()
            || self.sub_footer.is_some()
            || self.common_data.is_some()
            || self.date.is_some()
            || self.datetime.is_some()
            || self.number.is_some()
            || self.decimal.is_some();
        if !if_configured {
            return None;
        }

        let template = derive_template_styler(self.style_template.unwrap_or_default());
        Some(SpecStyler {
            header: self.header.unwrap_or(template.header),
            sub_footer: self.sub_footer.unwrap_or(template.sub_footer),
            common_data: self.common_data.unwrap_or(template.common_data),
            date: self.date.unwrap_or(template.date),
            datetime: self.datetime.unwrap_or(template.datetime),
            number: self.number.unwrap_or(template.number),
            decimal: self.decimal.unwrap_or(template.decimal),
            scientific: template.scientific,
        })
    }
}
