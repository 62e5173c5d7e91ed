//! `ledgersyncd`: runs, unwinds and inspects the issuance stage over a fjall database.

pub mod config;

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use ledgersync_chainstate::{StageId, StageProgress};
use ledgersync_consensus::chain_params;
use ledgersync_log::{self as logging, log_info, log_warn};
use ledgersync_stages::{
    CancelHandle, Cancellation, IssuanceConfig, IssuanceStage, RunOutcome, UnwindOutcome,
};
use ledgersync_storage::fjall::{FjallOptions, FjallStore};
use serde_json::json;

use crate::config::{parse_args, usage, CliAction, Command, Config};

const DATA_DIR_LOCK_FILE_NAME: &str = ".lock";
const DB_DIR_NAME: &str = "db";

struct DataDirLock {
    _file: File,
}

fn lock_data_dir(data_dir: &Path) -> Result<DataDirLock, String> {
    let lock_path = data_dir.join(DATA_DIR_LOCK_FILE_NAME);
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|err| format!("failed to open lock file {}: {err}", lock_path.display()))?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = file.flush();
            Ok(DataDirLock { _file: file })
        }
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
            let mut holder = String::new();
            let _ =
                File::open(&lock_path).and_then(|mut reader| reader.read_to_string(&mut holder));
            let holder = holder.trim();
            let suffix = if holder.is_empty() {
                String::new()
            } else {
                format!(" ({holder})")
            };
            Err(format!(
                "data dir {} is already locked (another ledgersyncd may be running); lock file {}{suffix}",
                data_dir.display(),
                lock_path.display()
            ))
        }
        Err(err) => Err(format!(
            "failed to lock data dir {} (lock file {}): {err}",
            data_dir.display(),
            lock_path.display()
        )),
    }
}

pub async fn run_entry() -> Result<(), String> {
    match parse_args()? {
        CliAction::PrintHelp => {
            println!("{}", usage());
            Ok(())
        }
        CliAction::PrintVersion => {
            println!("ledgersyncd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliAction::Run(config) => run_with_config(config).await,
    }
}

async fn run_with_config(config: Config) -> Result<(), String> {
    logging::init(logging::LogConfig {
        level: config.log_level,
        format: config.log_format,
        timestamps: config.log_timestamps,
    });
    for key in &config.unsupported_conf_keys {
        log_warn!(
            "Ignoring unsupported key '{key}' in {}",
            config.conf_path.display()
        );
    }

    fs::create_dir_all(&config.data_dir).map_err(|err| {
        format!(
            "failed to create data dir {}: {err}",
            config.data_dir.display()
        )
    })?;
    let _data_dir_lock = lock_data_dir(&config.data_dir)?;

    let started = Instant::now();
    let store = Arc::new(open_store(&config)?);
    log_info!(
        "Opened database {} in {}ms (network {})",
        config.data_dir.join(DB_DIR_NAME).display(),
        started.elapsed().as_millis(),
        config.network.as_str()
    );

    let mut stage_config = IssuanceConfig::new(chain_params(config.network));
    stage_config.log_interval = Duration::from_secs(config.log_interval_secs);
    let stage = Arc::new(IssuanceStage::new(stage_config));

    match config.command {
        Command::Run => run_stage(store, stage).await,
        Command::Unwind { height } => {
            match stage
                .unwind(Arc::clone(&store), None, height)
                .map_err(|err| err.to_string())?
            {
                UnwindOutcome::Unwound { from, to } => {
                    log_info!("Issuance progress moved from {from} to {to}");
                }
                UnwindOutcome::Unchanged { progress } => {
                    log_info!("Issuance progress {progress} is not above {height}; nothing to unwind");
                }
            }
            store.persist().map_err(|err| err.to_string())
        }
        Command::Prune => {
            stage
                .prune(Arc::clone(&store), None)
                .map_err(|err| err.to_string())?;
            store.persist().map_err(|err| err.to_string())
        }
        Command::Status { height } => print_status(&config, store.as_ref(), &stage, height),
    }
}

fn open_store(config: &Config) -> Result<FjallStore, String> {
    let options = FjallOptions {
        cache_bytes: Some(config.db_cache_mb.saturating_mul(1024 * 1024)),
        write_buffer_bytes: Some(config.db_write_buffer_mb.saturating_mul(1024 * 1024)),
        journal_bytes: None,
        memtable_bytes: None,
        fsync_ms: config.db_fsync_ms,
    };
    let path = config.data_dir.join(DB_DIR_NAME);
    FjallStore::open_with_options(&path, options)
        .map_err(|err| format!("failed to open database {}: {err}", path.display()))
}

fn spawn_signal_handler(handle: CancelHandle) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {},
                        _ = sigterm.recv() => {},
                    }
                }
                Err(err) => {
                    log_warn!("failed to install SIGTERM handler: {err}");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        log_info!("Signal received; stopping at the next block boundary.");
        handle.cancel();
    });
}

async fn run_stage(store: Arc<FjallStore>, stage: Arc<IssuanceStage>) -> Result<(), String> {
    let (handle, cancel) = Cancellation::new();
    spawn_signal_handler(handle);

    let worker_store = Arc::clone(&store);
    let outcome = tokio::task::spawn_blocking(move || stage.run(worker_store, None, &cancel))
        .await
        .map_err(|err| format!("issuance worker failed: {err}"))?
        .map_err(|err| err.to_string())?;
    store.persist().map_err(|err| err.to_string())?;

    match outcome {
        RunOutcome::UpToDate { progress } => log_info!("Issuance up to date at {progress}"),
        RunOutcome::Skipped { from, to } => {
            log_info!("Issuance not tracked for this chain; progress {from} -> {to}")
        }
        RunOutcome::Completed { from, to, .. } => {
            log_info!("Issuance advanced from {from} to {to}")
        }
        RunOutcome::Cancelled { from, reached, .. } => {
            log_info!("Issuance interrupted; advanced from {from} to {reached}")
        }
    }
    Ok(())
}

fn print_status(
    config: &Config,
    store: &FjallStore,
    stage: &IssuanceStage,
    height: Option<u64>,
) -> Result<(), String> {
    let stages = StageProgress::new(store);
    let mut progress = serde_json::Map::new();
    for id in StageId::ALL {
        let value = stages.get(id).map_err(|err| err.to_string())?;
        progress.insert(id.as_str().to_string(), json!(value));
    }
    let issuance_progress = stage.progress(store).map_err(|err| err.to_string())?;
    let totals = stage
        .totals_at(store, issuance_progress)
        .map_err(|err| err.to_string())?;

    let mut status = json!({
        "network": config.network.as_str(),
        "consensus": format!("{:?}", stage.config().params.consensus),
        "head_stage": stage.config().head_stage.as_str(),
        "progress": progress,
        "totals": {
            "block": issuance_progress,
            "issued": totals.issued.to_string(),
            "burnt": totals.burnt.to_string(),
        },
    });
    if let Some(height) = height {
        let at = stage
            .totals_at(store, height)
            .map_err(|err| err.to_string())?;
        status["at_height"] = json!({
            "block": height,
            "issued": at.issued.to_string(),
            "burnt": at.burnt.to_string(),
            "beyond_progress": height > issuance_progress,
        });
    }
    let rendered = serde_json::to_string_pretty(&status).map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_lock_is_exclusive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = lock_data_dir(dir.path()).expect("first lock");
        let err = match lock_data_dir(dir.path()) {
            Ok(_) => panic!("second lock must fail"),
            Err(err) => err,
        };
        assert!(err.contains("already locked"));
        drop(lock);
        lock_data_dir(dir.path()).expect("relock after release");
    }
}
