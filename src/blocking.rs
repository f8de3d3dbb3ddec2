//! Blocking forms of backup and restore.
//!
//! Same semantics and byte-identical output as the async forms, over the
//! synchronous `postgres` client (which shares row, statement, and error
//! types with `tokio-postgres`) and the blocking segment codec.

use std::io::{self, Read, Write};

use postgres::{Client, Config, IsolationLevel, NoTls};
use tracing::{debug, info};

use crate::backup::BackupSummary;
use crate::catalog::{self, quoted_columns, quoted_table};
use crate::error::Error;
use crate::header::TableHeader;
use crate::order;
use crate::restore::RestoreSummary;
use crate::segment::{SegmentReader, SegmentWriter, check_buffer_size, check_segment_size};

/// Blocking form of [`crate::backup`]. The calling thread is occupied for
/// the duration; output is byte-identical to the async form for the same
/// database state and `segment_size`.
pub fn backup<W: Write>(config: &Config, output: W, segment_size: usize) -> Result<BackupSummary, Error> {
    check_segment_size(segment_size)?;
    crate::ensure_dbname(config.get_dbname())?;
    let mut client = config.connect(NoTls)?;
    run_backup(&mut client, output, segment_size)
}

fn run_backup<W: Write>(
    client: &mut Client,
    output: W,
    segment_size: usize,
) -> Result<BackupSummary, Error> {
    let mut tx = client
        .build_transaction()
        .isolation_level(IsolationLevel::Serializable)
        .read_only(true)
        .deferrable(true)
        .start()?;

    let tables = order::sort_tables(catalog::read_blocking(&mut tx)?)?;
    info!(tables = tables.len(), "Computed dependency order");

    let mut writer = SegmentWriter::new(output);
    let mut summary = BackupSummary { tables: 0, bytes: 0 };

    for table in &tables {
        let target = quoted_table(&table.schema, &table.name);

        let exists = format!("SELECT EXISTS (SELECT 1 FROM {target})");
        let nonempty: bool = tx.query_one(exists.as_str(), &[])?.get(0);
        if !nonempty {
            debug!(schema = %table.schema, table = %table.name, "Table is empty, skipping");
            continue;
        }

        writer.write_string(&TableHeader::from(table).to_json()?)?;

        let copy = format!(
            "COPY {target} ({}) TO STDOUT (FORMAT BINARY)",
            quoted_columns(&table.columns)
        );
        let mut rows = tx.copy_out(copy.as_str())?;
        let bytes = writer.copy_from_reader(&mut rows, segment_size)?;

        info!(schema = %table.schema, table = %table.name, bytes, "Dumped table");
        summary.tables += 1;
        summary.bytes += bytes;
    }

    writer.flush()?;
    tx.commit()?;
    Ok(summary)
}

/// Blocking form of [`crate::restore`].
pub fn restore<R: Read>(config: &Config, input: R, buffer_size: usize) -> Result<RestoreSummary, Error> {
    check_buffer_size(buffer_size)?;
    crate::ensure_dbname(config.get_dbname())?;
    let mut client = config.connect(NoTls)?;
    run_restore(&mut client, input, buffer_size)
}

fn run_restore<R: Read>(
    client: &mut Client,
    input: R,
    buffer_size: usize,
) -> Result<RestoreSummary, Error> {
    let mut tx = client.transaction()?;
    let mut reader = SegmentReader::new(input);
    let mut summary = RestoreSummary { tables: 0, rows: 0 };

    while let Some(json) = reader.read_string()? {
        let header = TableHeader::from_json(&json)?;

        let copy = format!(
            "COPY {} ({}) FROM STDIN (FORMAT BINARY)",
            quoted_table(&header.schema, &header.table),
            quoted_columns(&header.columns)
        );
        let mut sink = tx.copy_in(copy.as_str())?;
        let mut block = reader.block_reader(buffer_size)?;
        io::copy(&mut block, &mut sink).map_err(Error::from_io)?;
        let rows = sink.finish()?;

        info!(schema = %header.schema, table = %header.table, rows, "Restored table");
        summary.tables += 1;
        summary.rows += rows;
    }

    tx.commit()?;
    Ok(summary)
}
