//! Dependency ordering of catalog tables.
//!
//! Merges the raw catalog rows into per-table descriptors and computes a
//! restore-safe order: every table is placed after all tables it references.
//! The sort is the layered, iterative variant (repeatedly extract the set of
//! unplaced tables whose dependencies are all placed, ordered by
//! `(schema, name)` within each layer), which gives the same result no matter
//! how the catalog happened to enumerate its rows.

use std::collections::{HashMap, HashSet};

use crate::catalog::RawCatalog;
use crate::error::Error;

/// A table selected for transfer: identity plus ordinal-ordered column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub columns: Vec<String>,
}

/// Resolve the raw catalog into descriptors and sort them into a
/// dependency-safe order. A cycle is a fatal error, detected before any byte
/// is transferred.
pub(crate) fn sort_tables(catalog: RawCatalog) -> Result<Vec<TableDescriptor>, Error> {
    let RawCatalog {
        tables,
        columns,
        edges,
    } = catalog;

    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut descriptors: Vec<TableDescriptor> = Vec::with_capacity(tables.len());
    for table in tables {
        let key = (table.schema.clone(), table.name.clone());
        if index.contains_key(&key) {
            continue;
        }
        index.insert(key, descriptors.len());
        descriptors.push(TableDescriptor {
            schema: table.schema,
            name: table.name,
            columns: Vec::new(),
        });
    }

    let mut columns_by_table: HashMap<usize, Vec<(i32, String)>> = HashMap::new();
    for column in columns {
        if let Some(&i) = index.get(&(column.schema, column.table)) {
            columns_by_table
                .entry(i)
                .or_default()
                .push((column.position, column.name));
        }
    }
    for (i, mut cols) in columns_by_table {
        cols.sort_by_key(|&(position, _)| position);
        descriptors[i].columns = cols.into_iter().map(|(_, name)| name).collect();
    }

    // Self-references are dropped, duplicates collapse, and edges pointing
    // outside the catalog (FKs into tables this dump will not carry) are
    // ignored.
    let mut dependencies: Vec<HashSet<usize>> = vec![HashSet::new(); descriptors.len()];
    for edge in edges {
        let from = index.get(&(edge.schema, edge.table));
        let to = index.get(&(edge.foreign_schema, edge.foreign_table));
        let (Some(&from), Some(&to)) = (from, to) else {
            continue;
        };
        if from != to {
            dependencies[from].insert(to);
        }
    }

    let mut placed = vec![false; descriptors.len()];
    let mut order: Vec<usize> = Vec::with_capacity(descriptors.len());
    while order.len() < descriptors.len() {
        let mut layer: Vec<usize> = (0..descriptors.len())
            .filter(|&i| !placed[i] && dependencies[i].iter().all(|&d| placed[d]))
            .collect();
        if layer.is_empty() {
            let stuck: Vec<String> = (0..descriptors.len())
                .filter(|&i| !placed[i])
                .map(|i| format!("{}.{}", descriptors[i].schema, descriptors[i].name))
                .collect();
            return Err(Error::DependencyCycle(stuck.join(", ")));
        }
        layer.sort_by(|&a, &b| {
            (&descriptors[a].schema, &descriptors[a].name)
                .cmp(&(&descriptors[b].schema, &descriptors[b].name))
        });
        for &i in &layer {
            placed[i] = true;
        }
        order.extend(layer);
    }

    Ok(order.into_iter().map(|i| descriptors[i].clone()).collect())
}
