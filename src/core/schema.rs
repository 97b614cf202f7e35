use serde::{Deserialize, Serialize};

/// Column data types exposed through result schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Real,
    Text,
    Boolean,
}

/// Name and type of one result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnDesc {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Shape of an operation's result set, known once compilation completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSchema {
    pub columns: Vec<ColumnDesc>,
}

impl ResultSchema {
    #[must_use]
    pub const fn new(columns: Vec<ColumnDesc>) -> Self {
        Self { columns }
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}
