//! Dolmen - data-only PostgreSQL backup and restore.
//!
//! This library dumps every row of every user table, as of one consistent
//! snapshot, through a length-prefixed segment framing into any byte stream,
//! and replays such a dump into a database with the same schema. Tables are
//! processed in foreign-key dependency order; row bytes are the server's own
//! binary `COPY` representation, relayed unmodified. Schema (DDL) transfer,
//! selective restore, and incremental backups are out of scope.
//!
//! Every operation exists in a suspension-capable form ([`backup()`],
//! [`restore()`]) and a blocking form ([`blocking::backup()`],
//! [`blocking::restore()`]); both produce byte-identical output for the same
//! database state and sizes.

pub mod backup;
pub mod blocking;
mod catalog;
pub mod error;
pub mod header;
pub mod order;
pub mod restore;
pub mod segment;

pub use backup::{BackupSummary, backup, backup_cancellable};
pub use error::Error;
pub use header::TableHeader;
pub use order::TableDescriptor;
pub use restore::{RestoreSummary, restore, restore_cancellable};
pub use segment::{DEFAULT_BUFFER_SIZE, DEFAULT_SEGMENT_SIZE, MAX_SEGMENT_SIZE};

/// A backup or restore target must name a database; checked before any
/// connection is opened.
pub(crate) fn ensure_dbname(dbname: Option<&str>) -> Result<(), Error> {
    match dbname {
        Some(name) if !name.is_empty() => Ok(()),
        _ => Err(Error::MissingDatabase),
    }
}
