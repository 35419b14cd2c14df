//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;

use crate::adapters::csv_adapter::{read_bar_file, CsvHoldings, CsvMarketData};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::sqlite_store::SqliteStore;
use crate::domain::bar::UpsertKind;
use crate::domain::batch::{BatchSummary, TaskOutcome};
use crate::domain::error::EngineError;
use crate::domain::range::{parse_date, DateRange, TimeRange};
use crate::domain::region::{Benchmarks, Region};
use crate::domain::service::AnalyticsService;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::price_store_port::PriceStorePort;

#[derive(Parser, Debug)]
#[command(name = "folioquant", about = "Portfolio time-series analytics engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a CSV drop of daily bars into the price store
    Ingest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        region: String,
    },
    /// Pull new bars for one symbol from the market-data drop directory
    Sync {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        region: String,
    },
    /// Recompute indicator series for stored symbols
    Recompute {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        region: Option<String>,
        /// Comma-separated symbol list; defaults to every stored symbol
        #[arg(long)]
        symbols: Option<String>,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Recompute every series a region's portfolio depends on
    RecomputePortfolio {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        region: String,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Show the latest indicator rows for one symbol
    Indicators {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        region: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Portfolio value series versus the region benchmark
    Valuation {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        region: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Allocation breakdown by stock type and rating
    Allocation {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        region: String,
        /// Valuation date, defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Cumulative and relative performance over a named window
    Performance {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        region: String,
        #[arg(long, default_value = "1Y")]
        range: String,
        /// Window end date, defaults to today
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Show stored data ranges
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        region: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Ingest {
            config,
            file,
            region,
        } => run_ingest(&config, &file, &region),
        Command::Sync {
            config,
            symbol,
            region,
        } => run_sync(&config, &symbol, &region),
        Command::Recompute {
            config,
            region,
            symbols,
            workers,
        } => run_recompute(&config, region.as_deref(), symbols.as_deref(), workers),
        Command::RecomputePortfolio {
            config,
            region,
            workers,
        } => run_recompute_portfolio(&config, &region, workers),
        Command::Indicators {
            config,
            symbol,
            region,
            limit,
        } => run_indicators(&config, &symbol, &region, limit),
        Command::Valuation {
            config,
            region,
            start,
            end,
        } => run_valuation(&config, &region, &start, &end),
        Command::Allocation {
            config,
            region,
            date,
        } => run_allocation(&config, &region, date.as_deref()),
        Command::Performance {
            config,
            region,
            range,
            as_of,
        } => run_performance(&config, &region, &range, as_of.as_deref()),
        Command::Info {
            config,
            symbol,
            region,
        } => run_info(&config, symbol.as_deref(), region.as_deref()),
    }
}

fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = EngineError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn open_store(config: &dyn ConfigPort) -> Result<SqliteStore, EngineError> {
    let store = SqliteStore::from_config(config)?;
    store.initialize_schema()?;
    Ok(store)
}

fn holdings_adapter(config: &dyn ConfigPort) -> CsvHoldings {
    let base = config
        .get_string("holdings", "path")
        .unwrap_or_else(|| ".".to_string());
    CsvHoldings::new(PathBuf::from(base))
}

pub fn benchmarks_from_config(config: &dyn ConfigPort) -> Benchmarks {
    let defaults = Benchmarks::default();
    Benchmarks::new(
        config
            .get_string("benchmarks", "usd")
            .unwrap_or_else(|| defaults.symbol_for(Region::Usd).to_string()),
        config
            .get_string("benchmarks", "cad")
            .unwrap_or_else(|| defaults.symbol_for(Region::Cad).to_string()),
        config
            .get_string("benchmarks", "intl")
            .unwrap_or_else(|| defaults.symbol_for(Region::Intl).to_string()),
    )
}

fn parse_region(value: &str) -> Result<Region, ExitCode> {
    Region::from_str(value).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn fail(e: &EngineError) -> ExitCode {
    eprintln!("error: {e}");
    e.into()
}

fn run_ingest(config_path: &PathBuf, file: &PathBuf, region_str: &str) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let region = match parse_region(region_str) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    eprintln!("Ingesting {} into {} price store", file.display(), region);
    let (bars, row_errors) = match read_bar_file(file, region) {
        Ok(result) => result,
        Err(e) => return fail(&e),
    };

    let mut inserted = 0usize;
    let mut updated = 0usize;
    let mut unchanged = 0usize;
    let mut backfills = 0usize;
    for bar in &bars {
        match store.upsert_bar(bar) {
            Ok(outcome) => {
                match outcome.kind {
                    UpsertKind::Inserted => inserted += 1,
                    UpsertKind::Updated => updated += 1,
                    UpsertKind::Unchanged => unchanged += 1,
                }
                if outcome.backfill {
                    backfills += 1;
                }
            }
            Err(e) => return fail(&e),
        }
    }

    println!(
        "Ingested {} bars: {} inserted, {} updated, {} unchanged",
        bars.len(),
        inserted,
        updated,
        unchanged
    );
    if backfills > 0 {
        println!("{backfills} backfills detected; affected series will fully recompute");
    }
    if !row_errors.is_empty() {
        println!("Skipped {} malformed rows:", row_errors.len());
        for error in &row_errors {
            println!("  line {}: {}", error.line, error.reason);
        }
    }

    ExitCode::SUCCESS
}

fn run_sync(config_path: &PathBuf, symbol: &str, region_str: &str) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let region = match parse_region(region_str) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    let base = config
        .get_string("market_data", "path")
        .unwrap_or_else(|| ".".to_string());
    let market_data = CsvMarketData::new(PathBuf::from(base));

    let symbol = symbol.to_uppercase();
    // Refetch the last stored day too; vendors restate it intraday.
    let since = match store.data_range(&symbol, region) {
        Ok(Some((_, max, _))) => max,
        Ok(None) => NaiveDate::MIN,
        Err(e) => return fail(&e),
    };

    let bars = match market_data.fetch_bars(&symbol, region, since) {
        Ok(b) => b,
        Err(e) => return fail(&e),
    };

    let mut written = 0usize;
    let mut backfills = 0usize;
    for bar in &bars {
        match store.upsert_bar(bar) {
            Ok(outcome) => {
                if outcome.kind != UpsertKind::Unchanged {
                    written += 1;
                }
                if outcome.backfill {
                    backfills += 1;
                }
            }
            Err(e) => return fail(&e),
        }
    }

    println!(
        "Synced {symbol} ({region}): {} bars fetched, {written} written",
        bars.len()
    );
    if backfills > 0 {
        println!("{backfills} backfills detected; series will fully recompute");
    }

    ExitCode::SUCCESS
}

fn selected_regions(region: Option<&str>) -> Result<Vec<Region>, ExitCode> {
    match region {
        Some(value) => Ok(vec![parse_region(value)?]),
        None => Ok(Region::ALL.to_vec()),
    }
}

fn run_recompute(
    config_path: &PathBuf,
    region: Option<&str>,
    symbols: Option<&str>,
    workers: Option<usize>,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let regions = match selected_regions(region) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    let mut tasks = Vec::new();
    for region in &regions {
        let region_symbols: Vec<String> = match symbols {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => match store.list_symbols(*region) {
                Ok(s) => s,
                Err(e) => return fail(&e),
            },
        };
        for symbol in region_symbols {
            tasks.push(crate::domain::batch::RecomputeTask::new(symbol, *region));
        }
    }

    if tasks.is_empty() {
        eprintln!("Nothing to recompute");
        return ExitCode::SUCCESS;
    }

    let workers = workers.unwrap_or_else(|| config.get_int("engine", "workers", 4) as usize);
    eprintln!("Recomputing {} series on {} workers...", tasks.len(), workers);

    let cancel = AtomicBool::new(false);
    let summary = match crate::domain::batch::run_batch(&store, &store, tasks, workers, &cancel) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    print_batch_summary(&summary)
}

fn run_recompute_portfolio(
    config_path: &PathBuf,
    region_str: &str,
    workers: Option<usize>,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let region = match parse_region(region_str) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let holdings = holdings_adapter(&config);
    let service = AnalyticsService::new(&store, &store, &holdings, benchmarks_from_config(&config));

    let workers = workers.unwrap_or_else(|| config.get_int("engine", "workers", 4) as usize);
    let cancel = AtomicBool::new(false);

    eprintln!("Recomputing {region} portfolio series on {workers} workers...");
    match service.recompute_portfolio(region, workers, &cancel) {
        Ok(summary) => print_batch_summary(&summary),
        Err(e) => fail(&e),
    }
}

fn print_batch_summary(summary: &BatchSummary) -> ExitCode {
    println!(
        "Batch finished: {} succeeded, {} skipped, {} failed",
        summary.succeeded(),
        summary.skipped(),
        summary.failed()
    );
    for report in &summary.reports {
        match &report.outcome {
            TaskOutcome::Succeeded(_) => {}
            TaskOutcome::Skipped { reason } => {
                println!(
                    "  skipped {} ({}): {reason}",
                    report.task.symbol, report.task.region
                );
            }
            TaskOutcome::Failed { reason } => {
                println!(
                    "  failed  {} ({}): {reason}",
                    report.task.symbol, report.task.region
                );
            }
        }
    }

    if summary.failed() > 0 {
        ExitCode::from(5)
    } else {
        ExitCode::SUCCESS
    }
}

fn format_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:>10.4}"),
        None => format!("{:>10}", "-"),
    }
}

fn run_indicators(config_path: &PathBuf, symbol: &str, region_str: &str, limit: usize) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let region = match parse_region(region_str) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let holdings = holdings_adapter(&config);
    let service = AnalyticsService::new(&store, &store, &holdings, benchmarks_from_config(&config));

    let snapshot = match service.indicators(symbol, region, limit) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    if snapshot.moving_averages.is_empty() {
        eprintln!("No indicator rows for {symbol} ({region}); run recompute first");
        return ExitCode::from(5);
    }

    println!("{symbol} ({region})");
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8} {:>8}",
        "date", "ma50", "ma200", "fast_ema", "slow_ema", "hist", "rsi9", "rsi14", "rsi21"
    );
    for (i, ma) in snapshot.moving_averages.iter().enumerate() {
        let macd = snapshot.macd.get(i);
        let rsi = snapshot.rsi.get(i);
        println!(
            "{:<12} {} {} {} {} {} {:>8} {:>8} {:>8}",
            ma.date.format("%Y-%m-%d"),
            format_opt(ma.ma50),
            format_opt(ma.ma200),
            format_opt(macd.and_then(|m| m.fast_ema)),
            format_opt(macd.and_then(|m| m.slow_ema)),
            format_opt(macd.and_then(|m| m.histogram)),
            rsi.and_then(|r| r.rsi9)
                .map_or("-".to_string(), |v| format!("{v:.2}")),
            rsi.and_then(|r| r.rsi14)
                .map_or("-".to_string(), |v| format!("{v:.2}")),
            rsi.and_then(|r| r.rsi21)
                .map_or("-".to_string(), |v| format!("{v:.2}")),
        );
    }

    ExitCode::SUCCESS
}

fn run_valuation(config_path: &PathBuf, region_str: &str, start: &str, end: &str) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let region = match parse_region(region_str) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let range = match parse_date(start)
        .and_then(|s| parse_date(end).and_then(|e| DateRange::new(s, e)))
    {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let holdings = holdings_adapter(&config);
    let service = AnalyticsService::new(&store, &store, &holdings, benchmarks_from_config(&config));

    let points = match service.valuation_series(region, &range) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    println!("{:<12} {:>16} {:>12}", "date", "portfolio", "benchmark");
    for point in &points {
        println!(
            "{:<12} {:>16.2} {:>12.2}",
            point.date.format("%Y-%m-%d"),
            point.portfolio_value,
            point.benchmark_value
        );
    }

    ExitCode::SUCCESS
}

fn run_allocation(config_path: &PathBuf, region_str: &str, date: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let region = match parse_region(region_str) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let date = match date {
        Some(value) => match parse_date(value) {
            Ok(d) => d,
            Err(e) => return fail(&e),
        },
        None => chrono::Local::now().date_naive(),
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let holdings = holdings_adapter(&config);
    let service = AnalyticsService::new(&store, &store, &holdings, benchmarks_from_config(&config));

    let breakdown = match service.allocation(region, date) {
        Ok(b) => b,
        Err(e) => return fail(&e),
    };

    println!("{region} allocation on {}", breakdown.date.format("%Y-%m-%d"));
    println!("By stock type:");
    for slice in &breakdown.by_stock_type {
        // Weights round to whole percent only here, at presentation time.
        println!("  {:<12} {:>4}%", slice.label, slice.weight.round() as i64);
    }
    println!("By rating:");
    for slice in &breakdown.by_rating {
        println!("  {:<12} {:>4}%", slice.label, slice.weight.round() as i64);
    }

    ExitCode::SUCCESS
}

fn run_performance(
    config_path: &PathBuf,
    region_str: &str,
    range_str: &str,
    as_of: Option<&str>,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let region = match parse_region(region_str) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let time_range = match TimeRange::from_str(range_str) {
        Ok(t) => t,
        Err(e) => return fail(&e),
    };
    let as_of: NaiveDate = match as_of {
        Some(value) => match parse_date(value) {
            Ok(d) => d,
            Err(e) => return fail(&e),
        },
        None => chrono::Local::now().date_naive(),
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let holdings = holdings_adapter(&config);
    let service = AnalyticsService::new(&store, &store, &holdings, benchmarks_from_config(&config));

    let points = match service.performance_series(region, time_range, as_of) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    println!(
        "{region} performance over {} (to {})",
        time_range.as_str(),
        as_of.format("%Y-%m-%d")
    );
    println!(
        "{:<12} {:>12} {:>12} {:>10}",
        "date", "portfolio", "benchmark", "relative"
    );
    for point in &points {
        println!(
            "{:<12} {:>11.2}% {:>11.2}% {:>9.2}%",
            point.date.format("%Y-%m-%d"),
            point.portfolio_cumulative_return * 100.0,
            point.benchmark_cumulative_return * 100.0,
            point.relative_performance * 100.0
        );
    }

    ExitCode::SUCCESS
}

fn run_info(config_path: &PathBuf, symbol: Option<&str>, region: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let regions = match selected_regions(region) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    for region in regions {
        let symbols: Vec<String> = match symbol {
            Some(s) => vec![s.to_uppercase()],
            None => match store.list_symbols(region) {
                Ok(s) => s,
                Err(e) => return fail(&e),
            },
        };

        for symbol in symbols {
            match store.data_range(&symbol, region) {
                Ok(Some((min, max, count))) => {
                    println!(
                        "{symbol} ({region}): {count} bars from {} to {}",
                        min.format("%Y-%m-%d"),
                        max.format("%Y-%m-%d")
                    );
                }
                Ok(None) => println!("{symbol} ({region}): no data"),
                Err(e) => return fail(&e),
            }
        }
    }

    ExitCode::SUCCESS
}
