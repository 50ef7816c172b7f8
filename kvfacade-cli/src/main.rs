//! A small illustrative client over the façade: open a database, touch a
//! single `"main"` storage, run one command, print the resulting status.
//!
//! Not part of the tested surface (§6.3); grounded on
//! `examples/original_source/examples/cli/{main,command,Options}.{h,cpp}`,
//! whose `get`/`put`/`delete`/`scan` commands and `-D` attribute flags this
//! mirrors with `clap` derive instead of hand-rolled argv parsing.

use clap::{Parser, Subcommand};

use kvfacade_core::{
    Backend, Database, DatabaseOptions, EndPointKind, PutOperation, StatusCode, StorageOptions, TransactionOptions,
};

#[derive(Parser)]
#[command(name = "kvfacade-cli", about = "Run a single command against a kvfacade database")]
struct Cli {
    /// Which storage engine to open.
    #[arg(long, value_enum, default_value = "memory")]
    backend: BackendKind,

    /// Filesystem path, for the `lsm` backend.
    #[arg(long)]
    location: Option<String>,

    /// Database attribute, `-D key=value`, repeatable.
    #[arg(short = 'D', value_parser = parse_attribute)]
    attributes: Vec<(String, String)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, clap::ValueEnum)]
enum BackendKind {
    Memory,
    Lsm,
    Cc,
}

#[derive(Subcommand)]
enum Command {
    Get { key: String },
    Put { key: String, value: String },
    Delete { key: String },
    Scan { begin_key: String, end_key: String },
}

fn parse_attribute(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None => Ok((s.to_string(), String::new())),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let mut options = DatabaseOptions::new();
    for (k, v) in &cli.attributes {
        options = options.with(k.clone(), v.clone());
    }
    if let Some(location) = &cli.location {
        options = options.with("location", location.clone());
    }

    let backend: Box<dyn Backend> = match cli.backend {
        BackendKind::Memory => Box::new(kvfacade_memory::MemoryBackend::with_options(&options)),
        BackendKind::Lsm => {
            let path = options.location().unwrap_or("kvfacade-cli.db").to_string();
            match kvfacade_lsm::LsmBackend::open(kvfacade_lsm::DatabaseConfig::new(path)) {
                Ok(b) => Box::new(b),
                Err(status) => {
                    eprintln!("cannot open database: {status}");
                    return 1;
                }
            }
        }
        BackendKind::Cc => Box::new(kvfacade_cc::CcBackend::new()),
    };

    let db = match Database::open(backend, options) {
        Ok(db) => db,
        Err(status) => {
            eprintln!("cannot open database: {status}");
            return 1;
        }
    };

    let storage = match db.storage_get(b"main") {
        Ok(s) => s,
        Err(StatusCode::NotFound) => match db.storage_create(b"main", StorageOptions::new()) {
            Ok(s) => s,
            Err(status) => {
                eprintln!("failed to create storage: {status}");
                return 1;
            }
        },
        Err(status) => {
            eprintln!("failed to restore storage: {status}");
            return 1;
        }
    };

    let status = db.transaction_exec(TransactionOptions::short(), Some(0), |data| match &cli.command {
        Command::Get { key } => match data.get(storage.storage_id(), key.as_bytes()) {
            Ok(value) => {
                println!("get: {key}");
                println!("-> {}", String::from_utf8_lossy(&value));
                StatusCode::Ok
            }
            Err(status) => {
                println!("get: {key}");
                status
            }
        },
        Command::Put { key, value } => {
            println!("put: {key} = {value}");
            data.put(storage.storage_id(), key.as_bytes(), value.as_bytes(), PutOperation::CreateOrUpdate)
        }
        Command::Delete { key } => {
            println!("delete: {key}");
            let status = data.delete(storage.storage_id(), key.as_bytes());
            if status.is_ok() {
                println!("-> {key}");
            }
            status
        }
        Command::Scan { begin_key, end_key } => {
            let range = kvfacade_core::resolve_range(
                EndPointKind::Inclusive,
                begin_key.as_bytes(),
                EndPointKind::Exclusive,
                end_key.as_bytes(),
            );
            println!("scan: {begin_key} ... {end_key}");
            let cursor = match data.open_cursor(storage.storage_id(), range, false, 0) {
                Ok(c) => c,
                Err(status) => return status,
            };
            let mut scan = kvfacade_core::ScanCursor::new(cursor);
            loop {
                match scan.next() {
                    StatusCode::Ok => {
                        let key = String::from_utf8_lossy(scan.key().unwrap_or(&[])).into_owned();
                        let value = String::from_utf8_lossy(scan.value().unwrap_or(&[])).into_owned();
                        println!("-> {key} = {value}");
                    }
                    StatusCode::NotFound => break StatusCode::Ok,
                    other => break other,
                }
            }
        }
    });

    if status.is_ok() {
        0
    } else {
        eprintln!("command failed: {status}");
        1
    }
}
