//! Table header written ahead of each data block.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::order::TableDescriptor;

/// JSON descriptor for one table's data block.
///
/// Serialized as `{"Schema":…,"Table":…,"Columns":[…]}`, written as a single
/// string segment immediately before the block. The encoded form must fit one
/// segment (32767 UTF-8 bytes), which bounds the combined length of the
/// schema, table, and column names; the writer rejects anything larger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableHeader {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
}

impl TableHeader {
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }
}

impl From<&TableDescriptor> for TableHeader {
    fn from(table: &TableDescriptor) -> Self {
        Self {
            schema: table.schema.clone(),
            table: table.name.clone(),
            columns: table.columns.clone(),
        }
    }
}
