//! The owning process: brings a region into existence (or reopens an
//! existing one), then loops forever sweeping reader metadata, draining
//! newly written keys into the deleter registry, and running garbage
//! collection against it. Every sweep instruction is dispatched through
//! the same [`store_wire::Dispatcher`] a future transport-backed request
//! loop would use, so this binary doubles as the simplest possible
//! client of it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use store_config::StoreConfig;
use store_core::{MvccStore, Role};
use store_log::LogOwnerHandle;
use store_region::{make_tag, Version};
use store_wire::{Dispatcher, Instruction};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Owning process for a shared-memory MVCC store")]
struct Args {
    /// Path to a TOML config file. Missing CLI flags fall back to this
    /// file's values, then to built-in defaults.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    size: Option<u64>,

    /// "shm" for POSIX shared memory, anything else for a plain file.
    #[arg(long)]
    ipc: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value_t = 500)]
    sweep_interval_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        StoreConfig::load(args.config.as_ref().map(|p| p.to_string_lossy().to_string()))?;
    config.apply_overrides(args.port, args.size, args.ipc.clone(), args.name.clone());

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

    let log_name = format!("{}.log", config.name);
    let log_tag = make_tag(b"MVCCLOG");
    let log_version = Version::new(1, 0, 0, 0);
    let log = if config.ipc == "shm" {
        LogOwnerHandle::open_or_create_shm(&log_name, config.size, log_tag, log_version)?
    } else {
        LogOwnerHandle::open_or_create_file(&log_name, config.size, log_tag, log_version)?
    };

    info!(role = %Role::Owner, port = config.port, ipc = %config.ipc, name = %config.name, "STORE-OWNER: region ready");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("STORE-OWNER: received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut dispatcher = Dispatcher::new(store, log);
    let mut seq: u64 = 0;
    while running.load(Ordering::SeqCst) {
        seq += 1;
        dispatcher.dispatch(Instruction::ProcessReadMetadata { seq, from: 0, to: u64::MAX });
        seq += 1;
        dispatcher.dispatch(Instruction::ProcessWriteMetadata { seq, max_attempts: 64 });
        seq += 1;
        dispatcher.dispatch(Instruction::CollectGarbage1 { seq, max_attempts: 64 });
        std::thread::sleep(Duration::from_millis(args.sweep_interval_ms));
    }

    info!("STORE-OWNER: shutting down");
    Ok(())
}
