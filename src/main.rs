use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lloggs::LoggingArgs;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tracing::info;

use dolmen::{DEFAULT_BUFFER_SIZE, DEFAULT_SEGMENT_SIZE};

#[derive(Parser)]
#[command(name = "dolmen")]
#[command(about = "Data-only PostgreSQL backup and restore")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    logging: LoggingArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Dump every non-empty user table to a file
    Backup {
        /// Connection string, e.g. "host=localhost user=postgres dbname=app"
        #[arg(long, short)]
        dsn: String,

        /// Output dump file
        #[arg(long, short)]
        output: PathBuf,

        /// Data segment payload size in bytes (1-32767)
        #[arg(long, default_value_t = DEFAULT_SEGMENT_SIZE)]
        segment_size: usize,
    },
    /// Replay a dump file into a database with the same schema
    Restore {
        /// Connection string, e.g. "host=localhost user=postgres dbname=app"
        #[arg(long, short)]
        dsn: String,

        /// Input dump file
        #[arg(long, short)]
        input: PathBuf,

        /// Read buffer size in bytes
        #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
        buffer_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let _guard = args.logging.setup(|v| match v {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    })?;

    match args.command {
        Command::Backup {
            dsn,
            output,
            segment_size,
        } => {
            let config: tokio_postgres::Config = dsn.parse()?;
            let mut file = BufWriter::new(File::create(&output).await?);
            info!(?output, segment_size, "Starting backup");

            let summary = dolmen::backup(&config, &mut file, segment_size).await?;
            file.shutdown().await?;

            eprintln!("Backup written to {:?}", output);
            eprintln!("  Tables: {}", summary.tables);
            eprintln!("  Row bytes: {}", summary.bytes);
        }
        Command::Restore {
            dsn,
            input,
            buffer_size,
        } => {
            let config: tokio_postgres::Config = dsn.parse()?;
            let file = BufReader::new(File::open(&input).await?);
            info!(?input, buffer_size, "Starting restore");

            let summary = dolmen::restore(&config, file, buffer_size).await?;

            eprintln!("Restore complete from {:?}", input);
            eprintln!("  Tables: {}", summary.tables);
            eprintln!("  Rows: {}", summary.rows);
        }
    }

    Ok(())
}
