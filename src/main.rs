use clap::{ArgAction, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use voxport_config::Config;
use voxport_export::{Context, ExportRequest, Sources, SystemOpener};
use voxport_shard::{QueryAggregator, ShardSet, discover_with_extension};
use voxport_transcode::CommandTranscoder;

/// Export voice messages from sharded SQLite message databases.
#[derive(Debug, Parser)]
#[command(name = "voxport", version, about)]
struct Cli {
    /// More logging on stderr; repeat for more. `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Configuration file (TOML, YAML or JSON).
    #[arg(short, long, global = true, env = "VOXPORT_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Export every incoming voice message of one account.
    Export {
        /// Account identifier or alias.
        account: String,
        /// Directory containing the databases.
        #[arg(long)]
        root: Option<PathBuf>,
        /// Files are written to `<dest>/<account>/`.
        #[arg(long)]
        dest: Option<PathBuf>,
        #[arg(long)]
        sample_rate: Option<u32>,
        /// Output file extension.
        #[arg(long)]
        format: Option<String>,
        /// Don't open the output directory afterwards.
        #[arg(long)]
        no_reveal: bool,
    },
    /// List the tables of one family of databases with their total row counts.
    Tables {
        #[arg(long)]
        root: Option<PathBuf>,
        /// File name prefix, e.g. `MSG` or `MediaMSG`.
        #[arg(long)]
        prefix: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut config = Config::load(cli.config.as_deref()).map_err(report)?;
    match cli.command {
        Command::Export { account, root, dest, sample_rate, format, no_reveal } => {
            if root.is_some() {
                config.database.root = root;
            }
            if let Some(dest) = dest {
                config.export.destination = dest;
            }
            if let Some(rate) = sample_rate {
                config.export.sample_rate = rate;
            }
            if let Some(format) = format {
                config.export.format = format;
            }
            config.export.reveal &= !no_reveal;
            config.validate().map_err(report)?;
            run_export(&config, account)
        },
        Command::Tables { root, prefix } => {
            let root = root.or(config.database.root.clone()).ok_or_else(missing_root)?;
            list_tables(root, &prefix, &config.database.extension)
        },
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn report<E: std::error::Error + Send + Sync + 'static>(err: exn::Exn<E>) -> miette::Report {
    miette!("{err:?}")
}

fn missing_root() -> miette::Report {
    miette!("no database directory: pass --root or set `database.root`")
}

fn run_export(config: &Config, account: String) -> Result<()> {
    let root = config.database.root.clone().ok_or_else(missing_root)?;
    let transcoder =
        CommandTranscoder::discover(&config.transcoder.program, config.transcoder.args.clone()).map_err(report)?;
    let mut ctx = Context::new(transcoder);
    if config.export.reveal
        && let Some(opener) = SystemOpener::discover()
    {
        ctx = ctx.with_reveal(opener);
    }

    let db = &config.database;
    let request = ExportRequest {
        account,
        root,
        destination: config.export.destination.clone(),
        sources: Sources {
            metadata_prefix: db.metadata_prefix.clone(),
            media_prefix: db.media_prefix.clone(),
            contacts_prefix: db.contacts_prefix.clone(),
            extension: db.extension.clone(),
        },
        sample_rate: config.export.sample_rate,
        format: config.export.format.clone(),
    };

    let mut handle = voxport_export::spawn(request, ctx).map_err(report)?;
    while let Some(progress) = handle.blocking_next() {
        println!("{progress}");
    }
    let summary = handle.join().map_err(report)?;
    tracing::info!(
        exported = summary.exported,
        skipped = summary.skipped,
        not_found = summary.not_found,
        failed = summary.failed,
        "Finished"
    );
    Ok(())
}

fn list_tables(root: PathBuf, prefix: &str, extension: &str) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().into_diagnostic()?;
    runtime.block_on(async {
        let files = discover_with_extension(&root, prefix, extension).await.map_err(report)?;
        let mut shards = QueryAggregator::from(ShardSet::open(files).await.map_err(report)?);
        let tables = shards.list_tables().await;
        if let Ok(tables) = &tables {
            for table in tables {
                // A table missing from some shards has no meaningful total.
                match shards.table_row_count(table).await {
                    Ok(count) => println!("{table}\t{count}"),
                    Err(err) => {
                        tracing::debug!(table = %table, error = ?err, "Could not count rows");
                        println!("{table}\t-");
                    },
                }
            }
        }
        shards.close().await;
        tables.map(drop).map_err(report)
    })
}
