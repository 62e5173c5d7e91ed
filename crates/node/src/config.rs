//! Command line and `ledgersync.conf` handling.
//!
//! Command line flags always win over the conf file; the conf file only fills in values
//! the command line left unset.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ledgersync_consensus::Network;
use ledgersync_log as logging;

pub const CONF_FILE_NAME: &str = "ledgersync.conf";
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_LOG_INTERVAL_SECS: u64 = 20;
pub const DEFAULT_DB_CACHE_MB: u64 = 256;
pub const DEFAULT_DB_WRITE_BUFFER_MB: u64 = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    Run,
    Unwind { height: u64 },
    Prune,
    Status { height: Option<u64> },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub command: Command,
    pub data_dir: PathBuf,
    pub conf_path: PathBuf,
    pub network: Network,
    pub log_level: logging::Level,
    pub log_format: logging::Format,
    pub log_timestamps: bool,
    pub log_interval_secs: u64,
    pub db_cache_mb: u64,
    pub db_write_buffer_mb: u64,
    pub db_fsync_ms: Option<u16>,
    /// Conf keys that were present but not understood.
    pub unsupported_conf_keys: Vec<String>,
}

#[derive(Debug)]
pub enum CliAction {
    Run(Config),
    PrintHelp,
    PrintVersion,
}

pub fn parse_args() -> Result<CliAction, String> {
    parse_args_from(std::env::args().skip(1))
}

pub fn parse_args_from<I>(raw_args: I) -> Result<CliAction, String>
where
    I: IntoIterator<Item = String>,
{
    let mut command: Option<Command> = None;
    let mut data_dir: Option<PathBuf> = None;
    let mut conf_path: Option<PathBuf> = None;
    let mut network = Network::Mainnet;
    let mut network_set = false;
    let mut log_level = logging::Level::Info;
    let mut log_level_set = false;
    let mut log_format = logging::Format::Text;
    let mut log_format_set = false;
    let mut log_timestamps = true;
    let mut log_timestamps_set = false;
    let mut log_interval_secs = DEFAULT_LOG_INTERVAL_SECS;
    let mut log_interval_set = false;
    let mut db_cache_mb = DEFAULT_DB_CACHE_MB;
    let mut db_cache_set = false;
    let mut db_write_buffer_mb = DEFAULT_DB_WRITE_BUFFER_MB;
    let mut db_write_buffer_set = false;
    let mut db_fsync_ms: Option<u16> = None;
    let mut db_fsync_set = false;
    let mut status_height: Option<u64> = None;

    let mut args = raw_args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" | "help" => return Ok(CliAction::PrintHelp),
            "--version" | "-V" | "version" => return Ok(CliAction::PrintVersion),
            "--data-dir" => {
                let value = required_value(&mut args, "--data-dir")?;
                data_dir = Some(PathBuf::from(value));
            }
            "--conf" => {
                let value = required_value(&mut args, "--conf")?;
                conf_path = Some(PathBuf::from(value));
            }
            "--network" => {
                let value = required_value(&mut args, "--network")?;
                network = Network::parse(&value).ok_or_else(|| {
                    format!(
                        "invalid network '{value}' (expected mainnet|testnet|dev)\n{}",
                        usage()
                    )
                })?;
                network_set = true;
            }
            "--log-level" => {
                let value = required_value(&mut args, "--log-level")?;
                log_level = logging::Level::parse(&value)
                    .ok_or_else(|| format!("invalid log level '{value}'\n{}", usage()))?;
                log_level_set = true;
            }
            "--log-format" => {
                let value = required_value(&mut args, "--log-format")?;
                log_format = logging::Format::parse(&value)
                    .ok_or_else(|| format!("invalid log format '{value}'\n{}", usage()))?;
                log_format_set = true;
            }
            "--log-timestamps" => {
                log_timestamps = true;
                log_timestamps_set = true;
            }
            "--no-log-timestamps" => {
                log_timestamps = false;
                log_timestamps_set = true;
            }
            "--log-interval-secs" => {
                let value = required_value(&mut args, "--log-interval-secs")?;
                log_interval_secs = parse_number(&value, "--log-interval-secs")?;
                log_interval_set = true;
            }
            "--db-cache-mb" => {
                let value = required_value(&mut args, "--db-cache-mb")?;
                db_cache_mb = parse_number(&value, "--db-cache-mb")?;
                db_cache_set = true;
            }
            "--db-write-buffer-mb" => {
                let value = required_value(&mut args, "--db-write-buffer-mb")?;
                db_write_buffer_mb = parse_number(&value, "--db-write-buffer-mb")?;
                db_write_buffer_set = true;
            }
            "--db-fsync-ms" => {
                let value = required_value(&mut args, "--db-fsync-ms")?;
                db_fsync_ms = Some(parse_number(&value, "--db-fsync-ms")?);
                db_fsync_set = true;
            }
            "--height" => {
                let value = required_value(&mut args, "--height")?;
                status_height = Some(parse_number(&value, "--height")?);
            }
            "run" | "prune" | "status" | "unwind" if command.is_some() => {
                return Err(format!("only one command may be given\n{}", usage()));
            }
            "run" => command = Some(Command::Run),
            "prune" => command = Some(Command::Prune),
            "status" => command = Some(Command::Status { height: None }),
            "unwind" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing height for unwind\n{}", usage()))?;
                command = Some(Command::Unwind {
                    height: parse_number(&value, "unwind")?,
                });
            }
            other => return Err(format!("unknown argument '{other}'\n{}", usage())),
        }
    }

    let command = match (command.unwrap_or(Command::Run), status_height) {
        (Command::Status { .. }, height) => Command::Status { height },
        (_, Some(_)) => {
            return Err(format!("--height is only valid with status\n{}", usage()));
        }
        (command, None) => command,
    };

    let data_dir = data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let conf_path = conf_path.unwrap_or_else(|| data_dir.join(CONF_FILE_NAME));
    let mut unsupported_conf_keys = Vec::new();

    if let Some(conf) = load_conf(&conf_path)? {
        let shown = conf_path.display();
        let mut keys: Vec<&String> = conf.keys().collect();
        keys.sort();
        for key in keys {
            let Some(raw) = conf.get(key).and_then(|values| values.last()) else {
                continue;
            };
            match key.as_str() {
                "network" if !network_set => {
                    network = Network::parse(raw)
                        .ok_or_else(|| format!("invalid network '{raw}' in {shown}"))?;
                }
                "testnet" | "dev" if !network_set => {
                    match parse_conf_bool(raw) {
                        Some(true) if key == "testnet" => network = Network::Testnet,
                        Some(true) => network = Network::Dev,
                        Some(false) => {}
                        None => return Err(format!("invalid {key} value '{raw}' in {shown}")),
                    }
                }
                "loglevel" if !log_level_set => {
                    log_level = logging::Level::parse(raw)
                        .ok_or_else(|| format!("invalid loglevel '{raw}' in {shown}"))?;
                }
                "logformat" if !log_format_set => {
                    log_format = logging::Format::parse(raw)
                        .ok_or_else(|| format!("invalid logformat '{raw}' in {shown}"))?;
                }
                "logtimestamps" if !log_timestamps_set => {
                    log_timestamps = parse_conf_bool(raw)
                        .ok_or_else(|| format!("invalid logtimestamps '{raw}' in {shown}"))?;
                }
                "logintervalsecs" if !log_interval_set => {
                    log_interval_secs = parse_conf_number(raw, key, &conf_path)?;
                }
                "dbcache" if !db_cache_set => {
                    db_cache_mb = parse_conf_number(raw, key, &conf_path)?;
                }
                "dbwritebuffer" if !db_write_buffer_set => {
                    db_write_buffer_mb = parse_conf_number(raw, key, &conf_path)?;
                }
                "dbfsyncms" if !db_fsync_set => {
                    db_fsync_ms = Some(parse_conf_number(raw, key, &conf_path)?);
                }
                "network" | "testnet" | "dev" | "loglevel" | "logformat" | "logtimestamps"
                | "logintervalsecs" | "dbcache" | "dbwritebuffer" | "dbfsyncms" => {}
                _ => unsupported_conf_keys.push(key.clone()),
            }
        }
    }
    unsupported_conf_keys.sort();

    if log_interval_secs == 0 {
        return Err("log interval must be at least 1 second".to_string());
    }

    Ok(CliAction::Run(Config {
        command,
        data_dir,
        conf_path,
        network,
        log_level,
        log_format,
        log_timestamps,
        log_interval_secs,
        db_cache_mb,
        db_write_buffer_mb,
        db_fsync_ms,
        unsupported_conf_keys,
    }))
}

fn required_value<I>(args: &mut I, flag: &str) -> Result<String, String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| format!("missing value for {flag}\n{}", usage()))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| format!("invalid value '{value}' for {flag}\n{}", usage()))
}

fn parse_conf_number<T: std::str::FromStr>(raw: &str, key: &str, path: &Path) -> Result<T, String> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| format!("invalid {key} '{raw}' in {}", path.display()))
}

/// Reads `key=value` lines; a missing file is not an error.
pub fn load_conf(path: &Path) -> Result<Option<HashMap<String, Vec<String>>>, String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(format!("failed to read {}: {err}", path.display())),
    };

    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for raw_line in contents.lines() {
        let mut line = raw_line.trim();
        if let Some(idx) = line.find(['#', ';']) {
            line = &line[..idx];
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line, "1"),
        };
        if key.is_empty() {
            continue;
        }
        out.entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.to_string());
    }
    Ok(Some(out))
}

pub fn parse_conf_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.is_empty() {
        return Some(true);
    }
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

pub fn usage() -> String {
    [
        "Usage:",
        "  ledgersyncd [options] [command]",
        "",
        "Commands:",
        "  run              Advance the issuance stage to the bodies watermark (default)",
        "  unwind <height>  Move the issuance watermark back to <height>",
        "  prune            Prune the issuance stage (snapshots are kept)",
        "  status           Print stage progress and totals as JSON",
        "",
        "Options:",
        "  --help, -h                Print this help and exit",
        "  --version, -V             Print version and exit",
        "  --data-dir <dir>          Base data directory (default: ./data)",
        "  --conf <file>             Config file (default: <data-dir>/ledgersync.conf)",
        "  --network <name>          mainnet|testnet|dev (default: mainnet)",
        "  --log-level <level>       error|warn|info|debug|trace (default: info)",
        "  --log-format <fmt>        text|json (default: text)",
        "  --log-timestamps          Prefix text log lines with a timestamp (default)",
        "  --no-log-timestamps       Omit timestamps from text log lines",
        "  --log-interval-secs <n>   Seconds between progress lines (default: 20)",
        "  --db-cache-mb <n>         Block cache size (default: 256)",
        "  --db-write-buffer-mb <n>  Write buffer size (default: 64)",
        "  --db-fsync-ms <n>         Background journal fsync interval",
        "  --height <n>              With status: also report totals at block <n>",
    ]
    .join("\n")
}
