//! rfid-ledger command line
//!
//! Records scans into a SQLite ledger and runs the analytic queries over it.
//! Results are printed as JSON on stdout; failures print the error code and
//! message on stderr and exit non-zero.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rfid_ledger::config::DB_PATH_ENV;
use rfid_ledger::import;
use rfid_ledger::logging::init_logging;
use rfid_ledger::validation::FormatValidator;
use rfid_ledger::{
    AnalyticsEngine, CreateTxRequest, LedgerConfig, LedgerError, SqliteStore, TransactionService,
    TxKey, UpdateTxRequest,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rfid-ledger", version, about = "RFID scan ledger and analytics")]
struct Cli {
    /// Debug-level logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the config)
    #[arg(long, global = true, env = DB_PATH_ENV)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database schema
    Init,

    /// Load sites.csv, locations.csv, products.csv and rfids.csv from a directory
    ImportReference {
        #[arg(long)]
        dir: PathBuf,
    },

    /// Record every scan in a CSV batch
    ImportScans {
        #[arg(long)]
        file: PathBuf,
    },

    /// Record one scan
    Add {
        #[arg(long)]
        site: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        epc: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        ref_code: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        rssi: Option<Decimal>,
        #[arg(long)]
        scan_date: Option<String>,
    },

    /// Change rssi and/or location of a recorded scan
    Update {
        #[arg(long)]
        tag: String,
        #[arg(long)]
        epc: String,
        #[arg(long)]
        scan_date: String,
        #[arg(long)]
        site: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        rssi: Option<Decimal>,
    },

    /// Delete a recorded scan by its exact key
    Delete {
        #[arg(long)]
        tag: String,
        #[arg(long)]
        epc: String,
        #[arg(long)]
        scan_date: String,
    },

    /// Latest scan per EPC in a window
    Latest {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        epc: Option<String>,
        #[arg(long)]
        site: Option<String>,
    },

    /// Most-read EPCs in a window
    Top {
        #[arg(short = 'n', long, default_value = "10", allow_hyphen_values = true)]
        n: i64,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },

    /// Scans matching every supplied filter
    Search {
        #[arg(long)]
        epc: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },

    ByEpc {
        epc: String,
    },

    ByTag {
        tag: String,
    },

    ByEpcTag {
        epc: String,
        tag: String,
    },

    ByDate {
        start: String,
        end: String,
    },

    /// Audit trail of one scan key
    History {
        #[arg(long)]
        tag: String,
        #[arg(long)]
        epc: String,
        #[arg(long)]
        scan_date: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("{:#}", err);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<LedgerError>() {
                Some(ledger) => eprintln!("{}|{}", ledger.code(), ledger),
                None => eprintln!("{:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = LedgerConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    FormatValidator::new(&config)?;

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;

    match cli.command {
        Commands::Init => {
            info!(path = %config.database_path.display(), "Database ready");
        }

        Commands::ImportReference { dir } => {
            let report = import::import_reference_dir(&store, &dir, &config.name_separator)?;
            print_json(&report)?;
        }

        Commands::ImportScans { file } => {
            let report = import::import_scans(&store, &file, &config)?;
            print_json(&report)?;
        }

        Commands::Add { site, location, epc, tag, ref_code, rssi, scan_date } => {
            let request = CreateTxRequest {
                site_name: site,
                epc,
                ref_code,
                tag_id: tag,
                location_name: location,
                rssi,
                scan_date,
            };
            let tx = TransactionService::new(&store, &config)?.create(&request)?;
            print_json(&tx)?;
        }

        Commands::Update { tag, epc, scan_date, site, location, rssi } => {
            let request = UpdateTxRequest {
                site_name: site,
                location_name: location,
                rssi,
            };
            let tx = TransactionService::new(&store, &config)?
                .update(&tag, &epc, &scan_date, &request)?;
            print_json(&tx)?;
        }

        Commands::Delete { tag, epc, scan_date } => {
            TransactionService::new(&store, &config)?.delete(&tag, &epc, &scan_date)?;
        }

        Commands::Latest { start, end, epc, site } => {
            let engine = AnalyticsEngine::new(&store, &config)?;
            print_json(&engine.latest_scans(&start, &end, epc.as_deref(), site.as_deref())?)?;
        }

        Commands::Top { n, start, end } => {
            let engine = AnalyticsEngine::new(&store, &config)?;
            print_json(&engine.top_reads(n, &start, &end)?)?;
        }

        Commands::Search { epc, tag, start, end } => {
            let engine = AnalyticsEngine::new(&store, &config)?;
            let found = engine.search(
                epc.as_deref(),
                tag.as_deref(),
                start.as_deref(),
                end.as_deref(),
            )?;
            print_json(&found)?;
        }

        Commands::ByEpc { epc } => {
            print_json(&AnalyticsEngine::new(&store, &config)?.by_epc(&epc)?)?;
        }

        Commands::ByTag { tag } => {
            print_json(&AnalyticsEngine::new(&store, &config)?.by_tag_id(&tag)?)?;
        }

        Commands::ByEpcTag { epc, tag } => {
            print_json(&AnalyticsEngine::new(&store, &config)?.by_epc_and_tag_id(&epc, &tag)?)?;
        }

        Commands::ByDate { start, end } => {
            print_json(&AnalyticsEngine::new(&store, &config)?.by_scan_date_range(&start, &end)?)?;
        }

        Commands::History { tag, epc, scan_date } => {
            let validator = FormatValidator::new(&config)?;
            let when = validator
                .parse_date(&scan_date)
                .ok_or_else(|| LedgerError::invalid(validator.date_message(&scan_date)))?;
            let key = TxKey::new(tag.trim().to_uppercase(), epc.trim().to_uppercase(), when);
            print_json(&store.events_for_transaction(&key)?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
