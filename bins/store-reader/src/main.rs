//! A one-shot CLI client against a running store: attaches to an
//! already-created region (shared memory or file) and performs a single
//! read, write, or existence check, then exits. Exists to exercise
//! [`store_core::MvccStore`] from outside the owning process the way a
//! real client would, without a transport in front of it.

use clap::{Parser, Subcommand};
use store_config::StoreConfig;
use store_core::{Key, MvccStore, Role, StoreTriple};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "One-shot client for a shared-memory MVCC store")]
struct Args {
    #[arg(short = 'c', long)]
    config: Option<std::path::PathBuf>,

    #[arg(long)]
    size: Option<u64>,

    /// "shm" for POSIX shared memory, anything else for a plain file.
    #[arg(long)]
    ipc: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Read { key: String },
    Exists { key: String },
    Write { key: String, v1: f64, v2: f64, v3: f64 },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        StoreConfig::load(args.config.as_ref().map(|p| p.to_string_lossy().to_string()))?;
    config.apply_overrides(None, args.size, args.ipc.clone(), args.name.clone());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let store = if config.ipc == "shm" {
        MvccStore::open_or_create_shm(&config.name, config.size)?
    } else {
        MvccStore::open_or_create_file(&config.name, config.size)?
    };
    info!(role = %Role::Reader, ipc = %config.ipc, name = %config.name, "STORE-READER: attached");

    match args.command {
        Command::Read { key } => {
            let key = Key::new(&key)?;
            match store.reader()?.read::<StoreTriple>(&key) {
                Some(v) => println!("{} {} {}", v.v1, v.v2, v.v3),
                None => println!("(none)"),
            }
        }
        Command::Exists { key } => {
            let key = Key::new(&key)?;
            println!("{}", store.exists::<StoreTriple>(&key)?);
        }
        Command::Write { key, v1, v2, v3 } => {
            let key = Key::new(&key)?;
            let revision = store.writer()?.write(&key, StoreTriple { v1, v2, v3 })?;
            println!("revision {revision}");
        }
    }

    Ok(())
}
