//! Vertical run detection and region merging.
//!
//! A [`RunDetector`] scans one column's values in row order and reports each
//! finished run of equal values as a [`SpecMergeRange`]. [`merge_region`]
//! turns such a range into a merged cell on a [`SheetTarget`].

use crate::error::{ExportError, Result};
use crate::sheet::SheetTarget;
use crate::spec::{IdCellStyle, SpecMergeRange, SpecMergedRegion};

////////////////////////////////////////////////////////////////////////////////
// #region RunDetector

/// Run tracking state of a [`RunDetector`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnumRunState<T> {
    /// Nothing observed yet.
    Empty,
    /// A run is open.
    Tracking {
        /// Value shared by every row of the open run.
        value_last: T,
        /// First row of the open run.
        row_first: usize,
        /// Most recently observed row.
        row_seen: usize,
    },
}

/// Stateful scanner over one column's values in strictly increasing row order.
///
/// One detector belongs to exactly one column of one sheet; it is discarded by
/// [`RunDetector::close`].
#[derive(Debug, Clone)]
pub struct RunDetector<T> {
    state: EnumRunState<T>,
}

impl<T: PartialEq> Default for RunDetector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> RunDetector<T> {
    pub fn new() -> Self {
        Self {
            state: EnumRunState::Empty,
        }
    }

    /// Current run state.
    pub fn state(&self) -> &EnumRunState<T> {
        &self.state
    }

    /// Observe `value` at `row`.
    ///
    /// Returns the range of the previous run when `value` differs from it.
    /// Single-row runs are reported too; skipping them is up to the merger.
    pub fn observe(&mut self, row: usize, value: Option<T>) -> Result<Option<SpecMergeRange>> {
        let Some(value) = value else {
            return Err(ExportError::InvalidInput(format!(
                "absent value observed at row {row}"
            )));
        };

        match &mut self.state {
            EnumRunState::Empty => {
                self.state = EnumRunState::Tracking {
                    value_last: value,
                    row_first: row,
                    row_seen: row,
                };
                Ok(None)
            }
            EnumRunState::Tracking {
                value_last,
                row_first,
                row_seen,
            } => {
                if row <= *row_seen {
                    return Err(ExportError::InvalidInput(format!(
                        "row {row} observed after row {row_seen}; rows must be strictly increasing"
                    )));
                }
                *row_seen = row;

                if *value_last == value {
                    return Ok(None);
                }

                let range = SpecMergeRange::new(*row_first, row - 1)?;
                *value_last = value;
                *row_first = row;
                Ok(Some(range))
            }
        }
    }

    /// Flush the open run ending at `row_final`.
    ///
    /// Returns `None` when the trailing run is a single row.
    pub fn close(self, row_final: usize) -> Result<Option<SpecMergeRange>> {
        let EnumRunState::Tracking { row_first, .. } = self.state else {
            return Err(ExportError::PreconditionViolation(
                "close() called before any value was observed".to_string(),
            ));
        };
        if row_first == row_final {
            return Ok(None);
        }
        SpecMergeRange::new(row_first, row_final).map(Some)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RegionMerger

/// Merge rows `[row_first, row_last]` of column `col` and style the anchor cell.
///
/// `row_first == row_last` is a no-op. The anchor cell must already exist.
pub fn merge_region<S: SheetTarget + ?Sized>(
    sheet: &mut S,
    style: IdCellStyle,
    row_first: usize,
    row_last: usize,
    col: usize,
) -> Result<()> {
    if row_first > row_last {
        return Err(ExportError::PreconditionViolation(format!(
            "merge_region row_first={row_first} must be <= row_last={row_last}"
        )));
    }
    if row_first == row_last {
        return Ok(());
    }

    if sheet.cell_at(row_first, col).is_none() {
        return Err(ExportError::MissingAnchorCell {
            row: row_first,
            col,
        });
    }

    sheet.declare_merged_region(SpecMergedRegion {
        row_first,
        row_last,
        col,
    })?;
    sheet.set_cell_style(row_first, col, style)?;

    tracing::debug!(row_first, row_last, col, "merged vertical region");
    Ok(())
}

/// [`merge_region`] for a detected [`SpecMergeRange`].
pub fn merge_range<S: SheetTarget + ?Sized>(
    sheet: &mut S,
    style: IdCellStyle,
    range: &SpecMergeRange,
    col: usize,
) -> Result<()> {
    merge_region(sheet, style, range.row_first(), range.row_last(), col)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
