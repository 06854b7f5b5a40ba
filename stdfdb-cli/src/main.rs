//! # stdfdb CLI
//!
//! Inspect STDF v4 files from the command line. Results go to stdout, logs to
//! stderr.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use stdfdb_core::config::{Config, LogFormat, LogLevel};
use stdfdb_core::metrics::Metrics;
use stdfdb_core::types::{BinKind, TestItem};
use stdfdb_core::utils::format_bytes;
use stdfdb_storage::coordinator::{spill_path_for, CancellationFlag, PROGRESS_PREFIX};
use stdfdb_storage::format::{decode_generic, detect_byte_order, RecordHeader};
use stdfdb_storage::{scan_source, FileHandle, ScanCoordinator, StdfSource};

#[derive(Parser)]
#[command(name = "stdfdb")]
#[command(version, about = "stdfdb - STDF v4 scanner, indexer and inspector")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides logging.level from the config
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// File header fields and record counts
    Info { file: PathBuf },
    /// List test identities
    Tests { file: PathBuf },
    /// Decode one test and print its statistics
    Series {
        file: PathBuf,
        /// Test number
        #[arg(long)]
        test: u32,
        /// Pin index of a multi-result test
        #[arg(long, default_value_t = 0)]
        pin: u32,
        /// Test name, when the number alone is ambiguous
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "head")]
        heads: Vec<u8>,
        #[arg(long = "site")]
        sites: Vec<u8>,
        /// Print every value
        #[arg(long)]
        values: bool,
    },
    /// Bin distribution
    Bins {
        file: PathBuf,
        #[arg(long)]
        head: Option<u8>,
        #[arg(long)]
        site: Option<u8>,
        /// Software bins instead of hardware bins
        #[arg(long)]
        soft: bool,
    },
    /// List wafers
    Wafers { file: PathBuf },
    /// Print the first records field by field
    Dump {
        file: PathBuf,
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Scan in the background and save the index
    Index {
        file: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Scan for a parent process; prints progress lines on stdout
    #[command(hide = true)]
    ScanWorker {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        file_id: u32,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    Ok(config)
}

fn init_logging(config: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(config.logging.level))
        .with_writer(io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config);

    match cli.command {
        Commands::Info { file } => info_cmd(&file, &config),
        Commands::Tests { file } => tests_cmd(&file, &config),
        Commands::Series { file, test, pin, name, heads, sites, values } => {
            series_cmd(&file, &config, test, pin, name.as_deref(), &heads, &sites, values)
        }
        Commands::Bins { file, head, site, soft } => bins_cmd(&file, &config, head, site, soft),
        Commands::Wafers { file } => wafers_cmd(&file, &config),
        Commands::Dump { file, count } => dump_cmd(&file, count),
        Commands::Index { file, output } => index_cmd(&file, &output, config).await,
        Commands::ScanWorker { input, output, file_id } => scan_worker(&input, &output, file_id, config).await,
    }
}

fn open(file: &Path, config: &Config) -> Result<FileHandle> {
    FileHandle::open_and_index(file, 0, config).with_context(|| format!("indexing {}", file.display()))
}

fn info_cmd(file: &Path, config: &Config) -> Result<()> {
    let handle = open(file, config)?;
    let store = handle.store();
    for (key, value) in handle.file_info() {
        println!("{:<20} {}", key, value.replace('\n', "\n                     "));
    }
    println!();
    println!("{:<20} {:?}", "Compression", store.compression());
    println!("{:<20} {}", "Tests", store.tests().len());
    println!("{:<20} {}", "Test entries", store.total_entries());
    println!("{:<20} {}", "DUTs", store.duts().len());
    println!("{:<20} {}", "Wafers", store.wafers().len());
    if store.truncated_records() > 0 {
        println!("{:<20} {}", "Truncated records", store.truncated_records());
    }
    println!();
    for (kind, count) in store.record_counts() {
        println!("{:<6} {}", kind.to_string(), count);
    }
    Ok(())
}

fn tests_cmd(file: &Path, config: &Config) -> Result<()> {
    let handle = open(file, config)?;
    for item in handle.list_test_items() {
        println!("{:>10} {:>5} {:<4} {}", item.test_num, item.pin_index, item.kind.to_string(), item.name);
    }
    Ok(())
}

fn find_item(handle: &FileHandle, test: u32, pin: u32, name: Option<&str>) -> Result<TestItem> {
    let mut matches: Vec<TestItem> = handle
        .list_test_items()
        .into_iter()
        .filter(|i| i.test_num == test && i.pin_index == pin)
        .filter(|i| name.map_or(true, |n| i.name == n))
        .collect();
    match matches.len() {
        0 => Err(anyhow!("no test {} pin {} in {}", test, pin, handle.path().display())),
        1 => Ok(matches.remove(0)),
        n => Err(anyhow!("test {} matches {} names; pass --name", test, n)),
    }
}

#[allow(clippy::too_many_arguments)]
fn series_cmd(
    file: &Path,
    config: &Config,
    test: u32,
    pin: u32,
    name: Option<&str>,
    heads: &[u8],
    sites: &[u8],
    show_values: bool,
) -> Result<()> {
    let handle = open(file, config)?;
    let item = find_item(&handle, test, pin, name)?;
    let series = handle.get_test_series(&item, heads, sites)?;
    let stats = &series.statistics;
    let limit = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{}", v));

    println!("{} {} [{}] {}", item.kind, item.test_num, item.pin_index, item.name);
    println!("unit      {}", series.unit);
    println!("limits    {} .. {}", limit(series.low_limit), limit(series.high_limit));
    println!("spec      {} .. {}", limit(series.low_spec), limit(series.high_spec));
    println!("count     {}", stats.count);
    println!("min/max   {} / {}", stats.min, stats.max);
    println!("median    {}", stats.median);
    println!("mean      {}", stats.mean);
    println!("stdev     {}", stats.stdev);
    println!("cpk       {}", stats.cpk);
    println!(
        "outcomes  pass {} fail {} indeterminate {} not tested {}",
        series.outcomes.pass, series.outcomes.fail, series.outcomes.indeterminate, series.outcomes.not_tested
    );
    println!("fails     {}", series.fail_count);

    if show_values {
        println!();
        for i in 0..series.values.len() {
            println!(
                "dut {:>6} head {:>3} site {:>3}  {:>14} flag {:#04x}",
                series.duts[i], series.heads[i], series.sites[i], series.values[i], series.flags[i]
            );
        }
    }
    Ok(())
}

fn bins_cmd(file: &Path, config: &Config, head: Option<u8>, site: Option<u8>, soft: bool) -> Result<()> {
    let handle = open(file, config)?;
    let kind = if soft { BinKind::Soft } else { BinKind::Hard };
    for bin in handle.get_bin_distribution(head, site, kind) {
        println!("{:>6} {} {:>8}  {}", bin.number, bin.class.as_char(), bin.count, bin.name);
    }
    Ok(())
}

fn wafers_cmd(file: &Path, config: &Config) -> Result<()> {
    let handle = open(file, config)?;
    for (index, id) in handle.list_wafers() {
        let parts = handle
            .store()
            .duts()
            .iter()
            .filter(|d| d.wafer_index == Some(index))
            .count();
        println!("{:>4} {:<24} {} parts", index, id, parts);
    }
    Ok(())
}

fn dump_cmd(file: &Path, count: usize) -> Result<()> {
    let source = StdfSource::open(file)?;
    source.with_forward_reader(Arc::new(AtomicU64::new(0)), |reader| {
        let mut prefix = [0u8; 5];
        reader.read_exact(&mut prefix)?;
        let order = detect_byte_order(&mut &prefix[..])?;
        let mut stream = (&prefix[..]).chain(reader);
        let mut offset = 0u64;

        for _ in 0..count {
            let mut header = [0u8; 4];
            if stream.read_exact(&mut header).is_err() {
                break;
            }
            let header = RecordHeader::parse(&header, order);
            let mut body = vec![0u8; header.length as usize];
            stream.read_exact(&mut body)?;
            match header.kind() {
                Some(kind) => {
                    println!("{} @ {} ({} bytes)", kind, offset, header.length);
                    for (name, value) in decode_generic(kind, &body, order) {
                        match value {
                            Some(value) => println!("    {:<10} {}", name, value),
                            None => println!("    {:<10} <omitted>", name),
                        }
                    }
                }
                None => println!("? {}/{} @ {} ({} bytes)", header.typ, header.sub, offset, header.length),
            }
            offset += RecordHeader::SIZE as u64 + header.length as u64;
        }
        Ok(())
    })?;
    Ok(())
}

async fn index_cmd(file: &Path, output: &Path, config: Config) -> Result<()> {
    let source = StdfSource::open(file)?;
    let size = source.file_size();
    let coordinator = ScanCoordinator::new(config, Metrics::new());
    let task = coordinator.start(source, 0);

    let cancel = task.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    let mut progress = task.subscribe();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let fraction = *progress.borrow();
            eprint!("\rIndexing {} {:5.1}%", format_bytes(size), fraction * 100.0);
        }
        eprintln!();
    });

    let result = task.wait().await;
    let _ = reporter.await;
    let scan = result?;
    scan.store.save(output)?;
    println!(
        "{} tests, {} entries, {} DUTs -> {}",
        scan.store.tests().len(),
        scan.store.total_entries(),
        scan.store.duts().len(),
        output.display()
    );
    Ok(())
}

async fn scan_worker(input: &Path, output: &Path, file_id: u32, config: Config) -> Result<()> {
    let source = StdfSource::open(input)?;
    let consumed = Arc::new(AtomicU64::new(0));
    let spill = spill_path_for(output);
    let period = config.scan.progress_interval();
    info!(input = %input.display(), output = %output.display(), "Scan worker started");

    let mut scan = tokio::task::spawn_blocking({
        let source = source.clone();
        let consumed = consumed.clone();
        move || {
            scan_source(
                &source,
                file_id,
                &config,
                Some(spill.as_path()),
                &CancellationFlag::new(),
                &Metrics::new(),
                consumed,
            )
        }
    });

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let output_scan = loop {
        tokio::select! {
            result = &mut scan => break result??,
            _ = ticker.tick() => println!("{}{}", PROGRESS_PREFIX, consumed.load(Ordering::Relaxed)),
        }
    };

    output_scan.store.save(output)?;
    println!("{}{}", PROGRESS_PREFIX, source.file_size());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_arguments() {
        let cli = Cli::parse_from([
            "stdfdb", "--log-level", "debug", "series", "lot.stdf", "--test", "1000", "--pin", "3",
            "--head", "1", "--site", "0", "--site", "2",
        ]);
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        match cli.command {
            Commands::Series { test, pin, heads, sites, values, .. } => {
                assert_eq!((test, pin), (1000, 3));
                assert_eq!(heads, vec![1]);
                assert_eq!(sites, vec![0, 2]);
                assert!(!values);
            }
            _ => panic!("expected series"),
        }
    }

    #[test]
    fn test_worker_invocation_parses() {
        let cli = Cli::parse_from([
            "stdfdb", "--config", "worker.toml", "scan-worker", "--input", "a.stdf.gz", "--output",
            "scan.sidx", "--file-id", "2",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("worker.toml")));
        assert!(matches!(cli.command, Commands::ScanWorker { file_id: 2, .. }));
    }
}
