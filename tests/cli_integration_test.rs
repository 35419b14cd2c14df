//! CLI integration tests: config loading plus end-to-end command flows
//! against real files and a file-backed store.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use folioquant::adapters::file_config_adapter::FileConfigAdapter;
use folioquant::adapters::sqlite_store::SqliteStore;
use folioquant::cli::{self, Cli, Command};
use folioquant::domain::region::Region;
use folioquant::ports::indicator_store_port::IndicatorStorePort;
use folioquant::ports::price_store_port::PriceStorePort;
use tempfile::TempDir;

fn assert_exit(actual: ExitCode, expected: ExitCode) {
    assert_eq!(format!("{actual:?}"), format!("{expected:?}"));
}

struct Workspace {
    _dir: TempDir,
    root: PathBuf,
    config: PathBuf,
}

fn setup() -> Workspace {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();

    let config = root.join("config.ini");
    fs::write(
        &config,
        format!(
            "[sqlite]\npath = {}\npool_size = 2\n\n\
             [engine]\nworkers = 2\n\n\
             [holdings]\npath = {root_display}\n\n\
             [market_data]\npath = {root_display}\n\n\
             [benchmarks]\nusd = SPY\n",
            root.join("prices.db").display(),
            root_display = root.display()
        ),
    )
    .unwrap();

    // 30 rising AAPL closes plus a matching benchmark series.
    let mut bars = String::from("symbol,date,open,high,low,close,volume,adjusted_close\n");
    for i in 0..30 {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
            + chrono::Days::new(i as u64);
        bars.push_str(&format!("AAPL,{date},,,,{},,\n", 150.0 + i as f64));
        bars.push_str(&format!("SPY,{date},,,,{},,\n", 500.0 + i as f64));
    }
    fs::write(root.join("bars.csv"), bars).unwrap();

    fs::write(
        root.join("holdings_USD.csv"),
        "symbol,quantity,stock_type,rating\nAAPL,10,Common,A\n",
    )
    .unwrap();

    Workspace {
        _dir: dir,
        root,
        config,
    }
}

#[test]
fn benchmarks_from_config_overrides_and_defaults() {
    let adapter = FileConfigAdapter::from_string("[benchmarks]\ncad = XIC\n").unwrap();
    let benchmarks = cli::benchmarks_from_config(&adapter);

    assert_eq!(benchmarks.symbol_for(Region::Cad), "XIC");
    assert_eq!(benchmarks.symbol_for(Region::Usd), "SPY");
    assert_eq!(benchmarks.symbol_for(Region::Intl), "VXUS");
}

#[test]
fn ingest_recompute_and_query_flow() {
    let ws = setup();

    let code = cli::run(Cli {
        command: Command::Ingest {
            config: ws.config.clone(),
            file: ws.root.join("bars.csv"),
            region: "USD".into(),
        },
    });
    assert_exit(code, ExitCode::SUCCESS);

    let code = cli::run(Cli {
        command: Command::Recompute {
            config: ws.config.clone(),
            region: Some("USD".into()),
            symbols: None,
            workers: Some(2),
        },
    });
    assert_exit(code, ExitCode::SUCCESS);

    // Rows landed in the store the CLI wrote to.
    let adapter = FileConfigAdapter::from_file(&ws.config).unwrap();
    let store = SqliteStore::from_config(&adapter).unwrap();
    let macd = store.macd("AAPL", Region::Usd, 30).unwrap();
    assert_eq!(macd.len(), 30);
    assert!(macd[25].histogram.is_some());

    let code = cli::run(Cli {
        command: Command::Valuation {
            config: ws.config.clone(),
            region: "USD".into(),
            start: "2024-01-01".into(),
            end: "2024-01-30".into(),
        },
    });
    assert_exit(code, ExitCode::SUCCESS);

    let code = cli::run(Cli {
        command: Command::Performance {
            config: ws.config.clone(),
            region: "USD".into(),
            range: "1M".into(),
            as_of: Some("2024-01-30".into()),
        },
    });
    assert_exit(code, ExitCode::SUCCESS);

    let code = cli::run(Cli {
        command: Command::Indicators {
            config: ws.config.clone(),
            symbol: "AAPL".into(),
            region: "USD".into(),
            limit: 5,
        },
    });
    assert_exit(code, ExitCode::SUCCESS);
}

#[test]
fn sync_pulls_new_bars_from_the_drop_directory() {
    let ws = setup();

    let code = cli::run(Cli {
        command: Command::Ingest {
            config: ws.config.clone(),
            file: ws.root.join("bars.csv"),
            region: "USD".into(),
        },
    });
    assert_exit(code, ExitCode::SUCCESS);

    // Collaborator drop restates the last stored day and adds one more.
    fs::write(
        ws.root.join("AAPL_USD.csv"),
        "symbol,date,open,high,low,close,volume,adjusted_close\n\
         AAPL,2024-01-30,,,,179.0,,\n\
         AAPL,2024-01-31,,,,180.5,,\n",
    )
    .unwrap();

    let code = cli::run(Cli {
        command: Command::Sync {
            config: ws.config.clone(),
            symbol: "AAPL".into(),
            region: "USD".into(),
        },
    });
    assert_exit(code, ExitCode::SUCCESS);

    let adapter = FileConfigAdapter::from_file(&ws.config).unwrap();
    let store = SqliteStore::from_config(&adapter).unwrap();
    let (_, max, count) = store.data_range("AAPL", Region::Usd).unwrap().unwrap();
    assert_eq!(max, chrono::NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    assert_eq!(count, 31);
}

#[test]
fn unknown_region_fails_with_structural_exit_code() {
    let ws = setup();

    let code = cli::run(Cli {
        command: Command::Ingest {
            config: ws.config.clone(),
            file: ws.root.join("bars.csv"),
            region: "AUD".into(),
        },
    });
    assert_exit(code, ExitCode::from(4));
}

#[test]
fn missing_config_file_fails_with_config_exit_code() {
    let code = cli::run(Cli {
        command: Command::Info {
            config: PathBuf::from("/nonexistent/config.ini"),
            symbol: None,
            region: None,
        },
    });
    assert_exit(code, ExitCode::from(2));
}

#[test]
fn indicators_before_recompute_reports_missing() {
    let ws = setup();

    let code = cli::run(Cli {
        command: Command::Ingest {
            config: ws.config.clone(),
            file: ws.root.join("bars.csv"),
            region: "USD".into(),
        },
    });
    assert_exit(code, ExitCode::SUCCESS);

    let code = cli::run(Cli {
        command: Command::Indicators {
            config: ws.config.clone(),
            symbol: "AAPL".into(),
            region: "USD".into(),
            limit: 5,
        },
    });
    assert_exit(code, ExitCode::from(5));
}
