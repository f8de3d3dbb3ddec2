//! Table catalog reader.
//!
//! Three independent queries against `information_schema` (base tables,
//! non-generated columns, foreign-key table pairs), merged client-side by
//! [`crate::order`]. Keeping the queries separate avoids one fragile join and
//! lets each be validated on its own. All values are cast to plain `text`/
//! `int4` so row decoding does not depend on the driver resolving the
//! `information_schema` domain types.

use tokio_postgres::Row;

use crate::error::Error;

const TABLES_SQL: &str = "\
    SELECT table_schema::text, table_name::text \
    FROM information_schema.tables \
    WHERE table_type = 'BASE TABLE' \
      AND table_schema NOT IN ('pg_catalog', 'information_schema')";

const COLUMNS_SQL: &str = "\
    SELECT table_schema::text, table_name::text, column_name::text, ordinal_position::int4 \
    FROM information_schema.columns \
    WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
      AND is_generated = 'NEVER'";

const EDGES_SQL: &str = "\
    SELECT DISTINCT \
        tc.table_schema::text, tc.table_name::text, \
        ccu.table_schema::text AS foreign_schema, ccu.table_name::text AS foreign_table \
    FROM information_schema.table_constraints tc \
    JOIN information_schema.constraint_column_usage ccu \
      ON ccu.constraint_name = tc.constraint_name \
     AND ccu.constraint_schema = tc.constraint_schema \
    WHERE tc.constraint_type = 'FOREIGN KEY' \
      AND tc.table_schema NOT IN ('pg_catalog', 'information_schema')";

/// One base table in a non-system schema.
#[derive(Debug, Clone)]
pub(crate) struct TableRow {
    pub schema: String,
    pub name: String,
}

/// One non-generated column with its ordinal position.
#[derive(Debug, Clone)]
pub(crate) struct ColumnRow {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub position: i32,
}

/// One "table A references table B" fact, already distinct per table pair.
#[derive(Debug, Clone)]
pub(crate) struct EdgeRow {
    pub schema: String,
    pub table: String,
    pub foreign_schema: String,
    pub foreign_table: String,
}

/// The raw catalog rows for one snapshot, before merging.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawCatalog {
    pub tables: Vec<TableRow>,
    pub columns: Vec<ColumnRow>,
    pub edges: Vec<EdgeRow>,
}

/// Read the catalog inside an async transaction, so the result describes the
/// same snapshot the row copies will see.
pub(crate) async fn read(tx: &tokio_postgres::Transaction<'_>) -> Result<RawCatalog, Error> {
    let tables = tx.query(TABLES_SQL, &[]).await?;
    let columns = tx.query(COLUMNS_SQL, &[]).await?;
    let edges = tx.query(EDGES_SQL, &[]).await?;
    Ok(from_rows(tables, columns, edges))
}

/// Blocking twin of [`read`].
pub(crate) fn read_blocking(tx: &mut postgres::Transaction<'_>) -> Result<RawCatalog, Error> {
    let tables = tx.query(TABLES_SQL, &[])?;
    let columns = tx.query(COLUMNS_SQL, &[])?;
    let edges = tx.query(EDGES_SQL, &[])?;
    Ok(from_rows(tables, columns, edges))
}

fn from_rows(tables: Vec<Row>, columns: Vec<Row>, edges: Vec<Row>) -> RawCatalog {
    RawCatalog {
        tables: tables
            .iter()
            .map(|row| TableRow {
                schema: row.get(0),
                name: row.get(1),
            })
            .collect(),
        columns: columns
            .iter()
            .map(|row| ColumnRow {
                schema: row.get(0),
                table: row.get(1),
                name: row.get(2),
                position: row.get(3),
            })
            .collect(),
        edges: edges
            .iter()
            .map(|row| EdgeRow {
                schema: row.get(0),
                table: row.get(1),
                foreign_schema: row.get(2),
                foreign_table: row.get(3),
            })
            .collect(),
    }
}

/// Quote a SQL identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"` for use in generated statements.
pub(crate) fn quoted_table(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

/// Comma-separated quoted column list.
pub(crate) fn quoted_columns(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn test_quoted_table() {
        assert_eq!(quoted_table("public", "users"), "\"public\".\"users\"");
    }

    #[test]
    fn test_quoted_columns() {
        let cols = vec!["id".to_string(), "display name".to_string()];
        assert_eq!(quoted_columns(&cols), "\"id\", \"display name\"");
    }
}
