//! Minimal schema-shape snapshot supplied to the phase workflow service at
//! seeding time (spec §4.F step 4). The core needs to know which tables
//! and columns exist to create `WorkflowEntityState` rows, but the actual
//! introspection (a datasource adapter's schema discoverer) is external —
//! callers pass the already-discovered shape in.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}
