use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// One row of a measurement error table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorRow {
    /// L-band error code (0 = no L-band observation).
    pub l_code: u8,
    /// P-band error code (0 = no P-band observation).
    pub p_code: u8,
    /// Measurement error of the combination.
    pub error: f64,
}

/// Measurement error by `(l_code, p_code)` for one biome category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorTable {
    rows: HashMap<(u8, u8), f64>,
}

impl ErrorTable {
    /// Builds a table; later rows override earlier ones with the same codes.
    pub fn new(rows: impl IntoIterator<Item = ErrorRow>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|row| ((row.l_code, row.p_code), row.error))
                .collect(),
        }
    }

    /// Error of a code pair.
    #[must_use]
    pub fn error(&self, row: (u8, u8)) -> Option<f64> {
        self.rows.get(&row).copied()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Tables by biome category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorTables {
    by_category: BTreeMap<u8, ErrorTable>,
}

impl ErrorTables {
    /// Wraps per-category tables.
    #[must_use]
    pub const fn new(by_category: BTreeMap<u8, ErrorTable>) -> Self {
        Self { by_category }
    }

    /// Table of a category.
    #[must_use]
    pub fn category(&self, category: u8) -> Option<&ErrorTable> {
        self.by_category.get(&category)
    }

    /// Categories present.
    pub fn categories(&self) -> impl Iterator<Item = u8> + '_ {
        self.by_category.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_rows_override() {
        let table = ErrorTable::new([
            ErrorRow { l_code: 1, p_code: 0, error: 0.03 },
            ErrorRow { l_code: 1, p_code: 0, error: 0.02 },
            ErrorRow { l_code: 0, p_code: 2, error: 0.04 },
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.error((1, 0)), Some(0.02));
        assert_eq!(table.error((2, 2)), None);
    }
}
