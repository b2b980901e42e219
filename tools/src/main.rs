//! feed-runner: headless host for the LedgerFlow core.
//!
//! Usage:
//!   feed-runner --seed 12345 --initial 20000 --interval-ms 1000 --seconds 10 --db ledger.db
//!   feed-runner --config ledger.json --ipc-mode

use anyhow::Result;
use ledgerflow_core::{
    risk::RiskAnalytics,
    transaction::{FilterOptions, Transaction, TransactionSummary},
    Coordinator, LedgerConfig, PersistenceStatus,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const VIEW_PREVIEW: usize = 20;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetView,
    SetSearch { term: String },
    SetFilters { filters: FilterOptions },
    Select { id: String },
    Page { index: usize },
    RefreshNow,
    Start { interval_ms: u64 },
    Stop,
    Wait { ms: u64 },
    Quit,
}

#[derive(serde::Serialize)]
struct UiState<'a> {
    total_count: usize,
    view_count: usize,
    loading: bool,
    is_analyzing: bool,
    auto_refresh_ms: Option<u128>,
    summary_revision: u64,
    summary: &'a TransactionSummary,
    risk: Option<RiskDigest>,
    persistence: &'a PersistenceStatus,
    last_error: Option<&'a str>,
    preview: &'a [Transaction],
}

#[derive(serde::Serialize)]
struct RiskDigest {
    total_risk: f64,
    high_risk_transactions: usize,
    analyzed: usize,
}

impl From<&RiskAnalytics> for RiskDigest {
    fn from(r: &RiskAnalytics) -> Self {
        Self {
            total_risk: r.total_risk,
            high_risk_transactions: r.high_risk_transactions,
            analyzed: r.analyzed,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let seconds = parse_arg(&args, "--seconds", 5u64);

    let mut config = match string_arg(&args, "--config") {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(db) = string_arg(&args, "--db") {
        config.store.path = (db != ":memory:").then(|| PathBuf::from(db));
    }
    if let Some(seed) = string_arg(&args, "--seed").and_then(|s| s.parse().ok()) {
        config.generation.seed = Some(seed);
    }
    config.generation.initial_count =
        parse_arg(&args, "--initial", config.generation.initial_count);
    config.refresh.interval_ms = parse_arg(&args, "--interval-ms", config.refresh.interval_ms);

    if !ipc_mode {
        println!("LedgerFlow feed-runner");
        println!("  started:   {}", chrono::Utc::now().to_rfc3339());
        println!("  seed:      {:?}", config.generation.seed);
        println!("  initial:   {}", config.generation.initial_count);
        println!("  interval:  {}ms", config.refresh.interval_ms);
        println!("  db:        {:?}", config.store.path);
        println!();
    }

    let mut coordinator = Coordinator::start(config)?;

    if ipc_mode {
        run_ipc_loop(&mut coordinator)?;
    } else {
        let interval_ms = coordinator.config().refresh.interval_ms;
        coordinator.start_auto_refresh(interval_ms)?;
        drive(&mut coordinator, Duration::from_secs(seconds));
        coordinator.stop_auto_refresh();
        // Let the final summary and any queued completions land.
        let settle = coordinator.config().refresh.summary_debounce() * 2;
        drive(&mut coordinator, settle);
        print_summary(&coordinator);
    }

    coordinator.shutdown();
    Ok(())
}

fn drive(coordinator: &mut Coordinator, span: Duration) {
    let until = Instant::now() + span;
    while Instant::now() < until {
        coordinator.pump_blocking(until.saturating_duration_since(Instant::now()));
    }
}

fn run_ipc_loop(coordinator: &mut Coordinator) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", error_json(e))?;
                stdout.flush()?;
                continue;
            }
        };

        coordinator.pump();
        let reply = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetView => state_json(coordinator)?,
            IpcCommand::SetSearch { term } => {
                coordinator.set_search_term(term);
                state_json(coordinator)?
            }
            IpcCommand::SetFilters { filters } => {
                coordinator.set_filters(filters);
                state_json(coordinator)?
            }
            IpcCommand::Select { id } => {
                let record = coordinator.records().iter().find(|r| r.id == id).cloned();
                match record {
                    Some(record) => serde_json::to_string(coordinator.on_record_selected(&record))?,
                    None => error_json(format!("unknown transaction '{id}'")),
                }
            }
            IpcCommand::Page { index } => match coordinator.fetch_default_page(index) {
                Ok(page) => serde_json::to_string(&page)?,
                Err(e) => error_json(e),
            },
            IpcCommand::RefreshNow => match coordinator.refresh_now() {
                Ok(()) => state_json(coordinator)?,
                Err(e) => error_json(e),
            },
            IpcCommand::Start { interval_ms } => {
                if let Err(e) = coordinator.start_auto_refresh(interval_ms) {
                    log::warn!("start rejected: {e}");
                }
                state_json(coordinator)?
            }
            IpcCommand::Stop => {
                coordinator.stop_auto_refresh();
                state_json(coordinator)?
            }
            IpcCommand::Wait { ms } => {
                drive(coordinator, Duration::from_millis(ms));
                state_json(coordinator)?
            }
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn error_json(e: impl std::fmt::Display) -> String {
    serde_json::json!({ "error": e.to_string() }).to_string()
}

fn state_json(coordinator: &Coordinator) -> Result<String> {
    let view = coordinator.view();
    let state = UiState {
        total_count: view.total_count,
        view_count: view.records.len(),
        loading: view.loading,
        is_analyzing: view.is_analyzing,
        auto_refresh_ms: view.auto_refresh.map(|d| d.as_millis()),
        summary_revision: view.summary_revision,
        summary: view.summary,
        risk: view.risk_analytics.map(RiskDigest::from),
        persistence: view.persistence,
        last_error: view.last_error,
        preview: &view.records[..view.records.len().min(VIEW_PREVIEW)],
    };
    Ok(serde_json::to_string(&state)?)
}

fn print_summary(coordinator: &Coordinator) {
    let view = coordinator.view();
    let s = view.summary;

    println!("=== RUN SUMMARY ===");
    println!("  stored:         {}", view.total_count);
    println!("  in view:        {}", view.records.len());
    println!("  persistence:    {:?}", view.persistence);
    println!("  transactions:   {}", s.total_transactions);
    println!("  total amount:   {:.2}", s.total_amount);
    println!("  credits:        {:.2}", s.total_credits);
    println!("  debits:         {:.2}", s.total_debits);
    println!("  average:        {:.2}", s.avg_transaction_amount);
    if let Some(risk) = view.risk_analytics {
        println!(
            "  risk:           {:.1} total, {} high-risk of {} analyzed",
            risk.total_risk, risk.high_risk_transactions, risk.analyzed
        );
    }
    if let Some(err) = view.last_error {
        println!("  last error:     {err}");
    }

    println!();
    println!("=== TOP CATEGORIES ===");
    let mut categories: Vec<_> = s.category_counts.iter().collect();
    categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (category, count) in categories.into_iter().take(5) {
        println!("  {category:<16} {count}");
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
