//! The subset of the OVN northbound schema this crate manages.

use std::collections::BTreeMap;

/// Table metadata relevant to transaction validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    /// Columns whose values must be unique across the table.
    pub indexes: &'static [&'static str],
    pub is_root: bool,
}

#[derive(Debug, Clone)]
pub struct Schema {
    tables: BTreeMap<&'static str, TableSchema>,
}

impl Schema {
    pub fn northbound() -> Self {
        let tables = [
            TableSchema { name: "NB_Global", indexes: &[], is_root: true },
            TableSchema { name: "Address_Set", indexes: &["name"], is_root: true },
            TableSchema { name: "Port_Group", indexes: &["name"], is_root: true },
            TableSchema { name: "Load_Balancer", indexes: &[], is_root: true },
            TableSchema { name: "Load_Balancer_Health_Check", indexes: &[], is_root: false },
            TableSchema { name: "Logical_Router", indexes: &[], is_root: true },
            TableSchema { name: "Logical_Switch", indexes: &[], is_root: true },
            TableSchema { name: "Logical_Router_Port", indexes: &["name"], is_root: false },
            TableSchema { name: "Logical_Switch_Port", indexes: &["name"], is_root: false },
            TableSchema { name: "ACL", indexes: &[], is_root: false },
        ];
        Self {
            tables: tables.into_iter().map(|t| (t.name, t)).collect(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::northbound()
    }
}
