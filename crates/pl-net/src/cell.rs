use core::fmt;

use serde::{Deserialize, Serialize};

/// Address of one attribute of one element: `table[index].column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub table: String,
    pub index: usize,
    pub column: String,
}

impl CellRef {
    pub fn new(table: impl Into<String>, index: usize, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            index,
            column: column.into(),
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.table, self.index, self.column)
    }
}
