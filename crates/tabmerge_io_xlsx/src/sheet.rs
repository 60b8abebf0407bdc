//! Sheet target abstraction and the in-memory grid used by the writer.

use std::collections::{BTreeMap, HashMap};

use crate::error::{ExportError, Result};
use crate::spec::{EnumCellValue, IdCellStyle, SpecCellFormat, SpecMergedRegion, SpecSheetCell};

/// Sheet able to declare merged regions and restyle existing cells.
pub trait SheetTarget {
    /// Declare a merged single-column region.
    ///
    /// Implementations reject regions overlapping an existing one with
    /// [`ExportError::DuplicateRegion`].
    fn declare_merged_region(&mut self, region: SpecMergedRegion) -> Result<()>;

    /// Existing cell at `(row, col)`, if any.
    fn cell_at(&self, row: usize, col: usize) -> Option<&SpecSheetCell>;

    /// Set the style of an existing cell.
    fn set_cell_style(&mut self, row: usize, col: usize, style: IdCellStyle) -> Result<()>;
}

////////////////////////////////////////////////////////////////////////////////
// #region SheetGrid

/// Buffered body cells and merged regions of one worksheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SheetGrid {
    name: String,
    cells: BTreeMap<(usize, usize), SpecSheetCell>,
    merged_regions: Vec<SpecMergedRegion>,
}

impl SheetGrid {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            merged_regions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create or replace the cell at `(row, col)`.
    pub fn put_cell(&mut self, row: usize, col: usize, value: EnumCellValue, style: IdCellStyle) {
        self.cells.insert((row, col), SpecSheetCell { value, style });
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (&(usize, usize), &SpecSheetCell)> {
        self.cells.iter()
    }

    /// Merged regions in declaration order.
    pub fn merged_regions(&self) -> &[SpecMergedRegion] {
        &self.merged_regions
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl SheetTarget for SheetGrid {
    fn declare_merged_region(&mut self, region: SpecMergedRegion) -> Result<()> {
        if let Some(existing) = self
            .merged_regions
            .iter()
            .find(|existing| existing.overlaps(&region))
        {
            return Err(ExportError::DuplicateRegion {
                region,
                existing: *existing,
            });
        }
        self.merged_regions.push(region);
        Ok(())
    }

    fn cell_at(&self, row: usize, col: usize) -> Option<&SpecSheetCell> {
        self.cells.get(&(row, col))
    }

    fn set_cell_style(&mut self, row: usize, col: usize, style: IdCellStyle) -> Result<()> {
        let cell = self
            .cells
            .get_mut(&(row, col))
            .ok_or(ExportError::MissingAnchorCell { row, col })?;
        cell.style = style;
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StyleTable

/// Deduplicating allocator of cell style handles.
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    l_formats: Vec<SpecCellFormat>,
    dict_ids: HashMap<SpecCellFormat, IdCellStyle>,
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `fmt`, allocating a new one on first use.
    pub fn allocate(&mut self, fmt: &SpecCellFormat) -> IdCellStyle {
        if let Some(id) = self.dict_ids.get(fmt) {
            return *id;
        }
        let id = IdCellStyle(self.l_formats.len());
        self.l_formats.push(fmt.clone());
        self.dict_ids.insert(fmt.clone(), id);
        id
    }

    /// Format behind `id`.
    pub fn get(&self, id: IdCellStyle) -> Option<&SpecCellFormat> {
        self.l_formats.get(id.0)
    }

    /// All formats indexed by handle.
    pub fn formats(&self) -> &[SpecCellFormat] {
        &self.l_formats
    }

    pub fn len(&self) -> usize {
        self.l_formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.l_formats.is_empty()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_rejects_overlapping_regions() {
        let mut grid = SheetGrid::new("data");
        grid.declare_merged_region(SpecMergedRegion {
            row_first: 1,
            row_last: 3,
            col: 0,
        })
        .unwrap();
        grid.declare_merged_region(SpecMergedRegion {
            row_first: 1,
            row_last: 3,
            col: 1,
        })
        .unwrap();

        let err = grid
            .declare_merged_region(SpecMergedRegion {
                row_first: 3,
                row_last: 5,
                col: 0,
            })
            .unwrap_err();
        match err {
            ExportError::DuplicateRegion { existing, .. } => {
                assert_eq!((existing.row_first, existing.row_last), (1, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(grid.merged_regions().len(), 2);
    }

    #[test]
    fn test_grid_set_style_requires_cell() {
        let mut grid = SheetGrid::new("data");
        assert!(grid.is_empty());
        assert!(matches!(
            grid.set_cell_style(0, 0, IdCellStyle(1)),
            Err(ExportError::MissingAnchorCell { row: 0, col: 0 })
        ));

        grid.put_cell(0, 0, EnumCellValue::Number(1.0), IdCellStyle(0));
        grid.set_cell_style(0, 0, IdCellStyle(1)).unwrap();
        assert_eq!(grid.cell_at(0, 0).unwrap().style, IdCellStyle(1));
        assert_eq!(grid.cell_at(0, 0).unwrap().value, EnumCellValue::Number(1.0));
    }

    #[test]
    fn test_style_table_deduplicates() {
        let mut table = StyleTable::new();
        let fmt_bold = SpecCellFormat {
            bold: Some(true),
            ..Default::default()
        };
        let id_plain = table.allocate(&SpecCellFormat::default());
        let id_bold = table.allocate(&fmt_bold);
        assert_ne!(id_plain, id_bold);
        assert_eq!(table.allocate(&fmt_bold.clone()), id_bold);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(id_bold), Some(&fmt_bold));
        assert_eq!(table.get(IdCellStyle(7)), None);
    }
}
