//! Restore orchestration, suspension-capable form.

use bytes::Bytes;
use futures::SinkExt;
use tokio::io::AsyncRead;
use tokio_postgres::{Client, Config, CopyInSink, NoTls};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{quoted_columns, quoted_table};
use crate::error::Error;
use crate::header::TableHeader;
use crate::segment::aio::SegmentReader;
use crate::segment::check_buffer_size;

/// Counts from a completed restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub tables: usize,
    pub rows: u64,
}

/// Replay a dump stream into the configured database, which must already
/// carry the same schema. Tables are loaded in the order they were dumped,
/// so foreign-key constraints are satisfied without deferred-constraint
/// tricks; the whole restore is one transaction.
///
/// `buffer_size` is the read-side buffer size in bytes; see
/// [`crate::DEFAULT_BUFFER_SIZE`].
pub async fn restore<R>(config: &Config, input: R, buffer_size: usize) -> Result<RestoreSummary, Error>
where
    R: AsyncRead + Unpin,
{
    restore_cancellable(config, input, buffer_size, &CancellationToken::new()).await
}

/// [`restore`] with cooperative cancellation, checked before each table and
/// before each relayed chunk. Cancelling rolls the transaction back; no
/// partial rows remain visible.
pub async fn restore_cancellable<R>(
    config: &Config,
    input: R,
    buffer_size: usize,
    cancel: &CancellationToken,
) -> Result<RestoreSummary, Error>
where
    R: AsyncRead + Unpin,
{
    check_buffer_size(buffer_size)?;
    crate::ensure_dbname(config.get_dbname())?;

    let (mut client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            warn!(%err, "Connection task ended with error");
        }
    });

    run(&mut client, input, buffer_size, cancel).await
}

async fn run<R>(
    client: &mut Client,
    input: R,
    buffer_size: usize,
    cancel: &CancellationToken,
) -> Result<RestoreSummary, Error>
where
    R: AsyncRead + Unpin,
{
    let tx = client.transaction().await?;
    let mut reader = SegmentReader::new(input);
    let mut summary = RestoreSummary { tables: 0, rows: 0 };

    while let Some(json) = reader.read_string().await? {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let header = TableHeader::from_json(&json)?;

        // Columns come from the header; a column the destination table lacks
        // is rejected by the server itself when the statement is prepared.
        let copy = format!(
            "COPY {} ({}) FROM STDIN (FORMAT BINARY)",
            quoted_table(&header.schema, &header.table),
            quoted_columns(&header.columns)
        );
        let sink: CopyInSink<Bytes> = tx.copy_in(copy.as_str()).await?;
        futures::pin_mut!(sink);

        let mut block = reader.block_reader(buffer_size)?;
        while let Some(chunk) = block.next_chunk().await? {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            sink.as_mut().send(chunk).await?;
        }
        let rows = sink.finish().await?;

        info!(schema = %header.schema, table = %header.table, rows, "Restored table");
        summary.tables += 1;
        summary.rows += rows;
    }

    tx.commit().await?;
    Ok(summary)
}
