//! game-runner: headless runner for the ready-mix business game.
//!
//! Usage:
//!   game-runner --seed 12345 --teams 6 --quarters 4 --db game.db
//!   game-runner --data-dir ./data --ipc-mode

use anyhow::Result;
use rmc_core::{
    bot,
    command::{AdminCommand, TeamCommand},
    config::GameConfig,
    engine::GameEngine,
    error::GameError,
    phase::GameState,
    store::GameStore,
    types::{MonthId, QuarterId},
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Admin {
        command: AdminCommand,
    },
    Team {
        command: TeamCommand,
    },
    Leaderboard {
        quarter: QuarterId,
    },
    Financials {
        quarter: QuarterId,
        month: Option<MonthId>,
    },
    EventsSince {
        seq: i64,
    },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let teams = parse_arg(&args, "--teams", 4usize);
    let quarters = parse_arg(&args, "--quarters", 4u32);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    let config = GameConfig::load(data_dir).unwrap_or_else(|e| {
        log::warn!("{e}; using built-in rule-sheet defaults");
        GameConfig::default_test()
    });

    let run_id = uuid::Uuid::new_v4();
    if !ipc_mode {
        println!("Ready-Mix Business Game: game-runner");
        println!("  run_id:    {run_id}");
        println!("  started:   {}", chrono::Utc::now().to_rfc3339());
        println!("  seed:      {seed}");
        println!("  teams:     {teams}");
        println!("  quarters:  {quarters}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    // For :memory: use a shared-memory URI so reader connections opened
    // with GameStore::reopen see the same database.
    let db_effective = if db == ":memory:" {
        format!("file:rmc_{}?mode=memory&cache=shared", run_id.simple())
    } else {
        db.to_string()
    };
    let engine = GameEngine::open(config, &db_effective)?;

    if ipc_mode {
        run_ipc_loop(&engine)?;
    } else {
        bot::play_game(&engine, seed, teams, quarters)?;
        print_summary(&engine, quarters)?;
    }

    Ok(())
}

fn run_ipc_loop(engine: &GameEngine<GameStore>) -> Result<()> {
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
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let reply = match handle_command(engine, cmd) {
            Ok(value) => value,
            Err(e) => serde_json::json!({
                "error": e.to_string(),
                "retryable": e.is_retryable(),
            }),
        };
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(
    engine: &GameEngine<GameStore>,
    cmd: IpcCommand,
) -> Result<serde_json::Value, GameError> {
    let value = match cmd {
        IpcCommand::GetState => serde_json::to_value(engine.snapshot()?)?,
        IpcCommand::Admin { command } => {
            let events = engine.apply_admin(command)?;
            serde_json::json!({ "events": events, "state": engine.snapshot()? })
        }
        IpcCommand::Team { command } => {
            let events = engine.apply_team(command)?;
            serde_json::json!({ "events": events })
        }
        IpcCommand::Leaderboard { quarter } => {
            let state = engine.state()?;
            serde_json::to_value(engine.leaderboard(&state, quarter)?)?
        }
        IpcCommand::Financials { quarter, month } => {
            serde_json::to_value(engine.financial_rows(quarter, month)?)?
        }
        IpcCommand::EventsSince { seq } => serde_json::to_value(engine.events_since(seq)?)?,
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn print_summary(engine: &GameEngine<GameStore>, quarters: u32) -> Result<()> {
    let state: GameState = engine.state()?;
    let config = engine.config();
    let last_quarter = quarters.min(config.max_quarters).max(1);

    println!("=== RUN SUMMARY ===");
    println!("  final phase:    {}", state.phase.as_str());
    println!("  final quarter:  {}", state.current_quarter);

    println!();
    println!("=== QUARTERLY EBITDA ===");
    for q in 1..=last_quarter {
        let rows = engine.financial_rows(q, None)?;
        if rows.is_empty() {
            println!("  Q{q}: (not played)");
            continue;
        }
        let revenue: i64 = rows.iter().map(|r| r.revenue_paise).sum();
        let ebitda: i64 = rows.iter().map(|r| r.ebitda_paise).sum();
        let sold: i64 = rows.iter().map(|r| r.sales_vol).sum();
        println!(
            "  Q{q}: sold {sold} m3 | revenue Rs {} | EBITDA Rs {}",
            rupees(revenue),
            rupees(ebitda)
        );
    }

    println!();
    println!("=== LEADERBOARD ===");
    let board = engine.leaderboard(&state, state.current_quarter.min(last_quarter))?;
    for e in board {
        println!(
            "  #{:<2} {:<12} total Rs {:>16} | last quarter Rs {:>16}",
            e.rank,
            e.team_name,
            rupees(e.total_game_ebitda_paise),
            rupees(e.quarter_ebitda_paise)
        );
    }
    Ok(())
}

fn rupees(paise: i64) -> String {
    format!("{:.2}", paise as f64 / 100.0)
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
