//! Backup orchestration, suspension-capable form.

use futures::StreamExt;
use tokio::io::AsyncWrite;
use tokio_postgres::{Client, Config, IsolationLevel, NoTls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{self, quoted_columns, quoted_table};
use crate::error::Error;
use crate::header::TableHeader;
use crate::order;
use crate::segment::aio::SegmentWriter;
use crate::segment::check_segment_size;

/// Counts from a completed backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupSummary {
    /// Non-empty tables dumped.
    pub tables: usize,
    /// Row payload bytes relayed (framing overhead not included).
    pub bytes: u64,
}

/// Dump every non-empty user table of the configured database to `output`,
/// in foreign-key dependency order, as of one consistent snapshot.
///
/// `segment_size` is the data segment payload size (1..=32767); see
/// [`crate::DEFAULT_SEGMENT_SIZE`].
pub async fn backup<W>(config: &Config, output: W, segment_size: usize) -> Result<BackupSummary, Error>
where
    W: AsyncWrite + Unpin,
{
    backup_cancellable(config, output, segment_size, &CancellationToken::new()).await
}

/// [`backup`] with cooperative cancellation, checked before each table and
/// before each relayed row batch. Cancelling rolls the snapshot transaction
/// back; bytes already written to `output` stay written and the caller owns
/// discarding them.
pub async fn backup_cancellable<W>(
    config: &Config,
    output: W,
    segment_size: usize,
    cancel: &CancellationToken,
) -> Result<BackupSummary, Error>
where
    W: AsyncWrite + Unpin,
{
    check_segment_size(segment_size)?;
    crate::ensure_dbname(config.get_dbname())?;

    let (mut client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            warn!(%err, "Connection task ended with error");
        }
    });

    run(&mut client, output, segment_size, cancel).await
}

async fn run<W>(
    client: &mut Client,
    output: W,
    segment_size: usize,
    cancel: &CancellationToken,
) -> Result<BackupSummary, Error>
where
    W: AsyncWrite + Unpin,
{
    // SERIALIZABLE READ ONLY DEFERRABLE: the whole dump observes one
    // consistent instant, waits for a safe snapshot instead of risking
    // serialization failures, and cannot block concurrent writers.
    let tx = client
        .build_transaction()
        .isolation_level(IsolationLevel::Serializable)
        .read_only(true)
        .deferrable(true)
        .start()
        .await?;

    let tables = order::sort_tables(catalog::read(&tx).await?)?;
    info!(tables = tables.len(), "Computed dependency order");

    let mut writer = SegmentWriter::new(output);
    let mut summary = BackupSummary { tables: 0, bytes: 0 };

    for table in &tables {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let target = quoted_table(&table.schema, &table.name);

        let exists = format!("SELECT EXISTS (SELECT 1 FROM {target})");
        let nonempty: bool = tx.query_one(exists.as_str(), &[]).await?.get(0);
        if !nonempty {
            debug!(schema = %table.schema, table = %table.name, "Table is empty, skipping");
            continue;
        }

        writer
            .write_string(&TableHeader::from(table).to_json()?)
            .await?;

        let copy = format!(
            "COPY {target} ({}) TO STDOUT (FORMAT BINARY)",
            quoted_columns(&table.columns)
        );
        let rows = tx.copy_out(copy.as_str()).await?;
        let guarded = rows.map(|batch| {
            if cancel.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                batch.map_err(Error::from)
            }
        });
        futures::pin_mut!(guarded);
        let bytes = writer.copy_from_stream(guarded, segment_size).await?;

        info!(schema = %table.schema, table = %table.name, bytes, "Dumped table");
        summary.tables += 1;
        summary.bytes += bytes;
    }

    writer.flush().await?;
    tx.commit().await?;
    Ok(summary)
}
