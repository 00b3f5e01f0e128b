//! console-runner: headless runner for the Rakshasutra console core.
//!
//! Usage:
//!   console-runner --seed 12345 --duration-ms 60000
//!   console-runner --config console.json --width 1280 --height 720
//!   console-runner --ipc-mode

use anyhow::Result;
use rakshasutra_core::{
    config::ConsoleConfig,
    console::ConsoleEngine,
    error::ConsoleError,
    event::Notice,
    feed::synthetic_providers,
    geo::Size,
    overlay::GeoPoint,
    surface::{Container, Viewport},
    table::{CategoryFilter, ReportRow},
    types::{Category, LooseBatch, Millis, StreamKind},
};
use std::env;
use std::io::{self, BufRead, Write};

const CONTAINER_ID: &str = "map";
const STEP_MS: Millis = 1_000;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Advance {
        ms: Millis,
    },
    Points {
        batch: LooseBatch<GeoPoint>,
    },
    Rows {
        #[serde(default)]
        rows: LooseBatch<ReportRow>,
        #[serde(default)]
        error: Option<String>,
    },
    SetFilter {
        filter: CategoryFilter,
    },
    RunScoring,
    Resize {
        width: f64,
        height: f64,
    },
    Quit,
}

#[derive(serde::Serialize)]
struct RowView {
    id: String,
    category: &'static str,
    area: String,
    payload: String,
    created: String,
    prediction: String,
    score: String,
}

#[derive(serde::Serialize)]
struct UiState {
    now: Millis,
    mounted: bool,
    session_id: Option<String>,
    viewport: Option<Viewport>,
    markers: usize,
    filter: CategoryFilter,
    total_rows: usize,
    visible_rows: usize,
    rejected_rows: usize,
    scored_rows: usize,
    scoring_in_flight: bool,
    last_error: Option<String>,
    notices: Vec<Notice>,
    events: usize,
    rows: Vec<RowView>,
    error: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let duration_ms = parse_arg(&args, "--duration-ms", 30_000u64);
    let width = parse_arg(&args, "--width", 1024.0f64);
    let height = parse_arg(&args, "--height", 640.0f64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].as_str());

    let config = match config_path {
        Some(path) => ConsoleConfig::load(path)?,
        None => ConsoleConfig::default(),
    };

    if !ipc_mode {
        println!("Rakshasutra console: console-runner");
        println!("  started:   {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        println!("  seed:      {seed}");
        println!("  duration:  {duration_ms} ms");
        println!("  container: {width}x{height}");
        println!("  config:    {}", config_path.unwrap_or("(defaults)"));
        println!();
    }

    let center = config.map.default_center;
    let mut engine = ConsoleEngine::build(config)?;
    if !ipc_mode {
        engine.attach_providers(synthetic_providers(seed, center));
    }
    engine.mount(Container::new(CONTAINER_ID, Size::new(width, height)))?;

    if ipc_mode {
        run_ipc_loop(&mut engine)?;
    } else {
        run_batch(&mut engine, duration_ms)?;
    }

    engine.unmount()?;
    Ok(())
}

fn run_batch(engine: &mut ConsoleEngine, duration_ms: Millis) -> Result<()> {
    let midway = duration_ms / 2;
    let mut elapsed = 0;
    let mut scoring_sent = false;

    while elapsed < duration_ms {
        let step = STEP_MS.min(duration_ms - elapsed);
        engine.advance(step)?;
        elapsed += step;

        if !scoring_sent && elapsed >= midway {
            scoring_sent = true;
            engine.set_filter(CategoryFilter::Only(Category::Sms))?;
            match engine.run_scoring() {
                Ok(items) => log::info!("scoring batch of {items} sent at {} ms", engine.now()),
                Err(e) => log::warn!("scoring not sent: {e}"),
            }
        }
    }

    print_summary(engine)
}

fn run_ipc_loop(engine: &mut ConsoleEngine) -> Result<()> {
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
        let error = handle_command(engine, cmd).err().map(|e| e.to_string());
        let state = build_ui_state(engine, error);
        writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
        stdout.flush()?;
    }
    Ok(())
}

/// Apply one command. Errors are reported back in the state line; they
/// never end the loop.
fn handle_command(engine: &mut ConsoleEngine, cmd: IpcCommand) -> Result<()> {
    match cmd {
        IpcCommand::GetState | IpcCommand::Quit => {}
        IpcCommand::Advance { ms } => {
            engine.advance(ms)?;
        }
        IpcCommand::Points { batch } => {
            engine.points_decoded(batch)?;
        }
        IpcCommand::Rows { rows, error } => {
            let outcome = match error {
                Some(reason) => Err(ConsoleError::Fetch { stream: StreamKind::Rows, reason }),
                None => Ok(rows),
            };
            engine.rows_decoded(outcome)?;
        }
        IpcCommand::SetFilter { filter } => {
            engine.set_filter(filter)?;
        }
        IpcCommand::RunScoring => {
            engine.run_scoring()?;
        }
        IpcCommand::Resize { width, height } => {
            engine.container_resized(Size::new(width, height))?;
        }
    }
    Ok(())
}

fn build_ui_state(engine: &mut ConsoleEngine, error: Option<String>) -> UiState {
    let events = engine.take_events().len();
    let notices = engine.drain_notices();
    let table = engine.table();

    let rows = engine
        .display_rows()
        .iter()
        .map(|d| RowView {
            id: d.row.id.to_string(),
            category: d.category_label(),
            area: d.row.area.clone(),
            payload: d.payload_text().to_string(),
            created: d.created_label(),
            prediction: d.prediction_label().to_string(),
            score: d.score_label(),
        })
        .collect();

    UiState {
        now: engine.now(),
        mounted: engine.is_mounted(),
        session_id: engine.session_id().map(str::to_string),
        viewport: engine.viewport(),
        markers: engine.markers().len(),
        filter: table.filter(),
        total_rows: table.rows().len(),
        visible_rows: table.visible_count(),
        rejected_rows: table.rejected_rows(),
        scored_rows: table.rows().iter().filter(|r| table.results().contains(&r.id)).count(),
        scoring_in_flight: engine.scoring_in_flight(),
        last_error: table.last_error().map(str::to_string),
        notices,
        events,
        rows,
        error,
    }
}

fn print_summary(engine: &ConsoleEngine) -> Result<()> {
    let table = engine.table();
    let scored = table.rows().iter().filter(|r| table.results().contains(&r.id)).count();

    println!("=== RUN SUMMARY ===");
    println!("  virtual time:   {} ms", engine.now());
    println!("  session:        {}", engine.session_id().unwrap_or("-"));
    println!("  overlay cycles: {}", engine.overlay_cycles());
    println!("  markers:        {}", engine.markers().len());
    match engine.viewport() {
        Some(v) => println!(
            "  viewport:       {:.4}, {:.4} @ z{}",
            v.center.lat, v.center.lon, v.zoom
        ),
        None => println!("  viewport:       (no surface)"),
    }
    println!("  filter:         {}", table.filter());
    println!("  rows:           {} ({} visible)", table.rows().len(), table.visible_count());
    println!("  scored rows:    {scored}");
    if let Some(err) = table.last_error() {
        println!("  last error:     {err}");
    }
    println!("  journal events: {}", engine.store().total_events()?);

    println!();
    println!("=== VISIBLE ROWS (first 10) ===");
    let rows = engine.display_rows();
    if rows.is_empty() {
        println!("  (no rows)");
    }
    for d in rows.iter().take(10) {
        println!(
            "  #{:<5} {:<4} {:<14} {:<6} {:<9} {}",
            d.row.id.as_str(),
            d.category_label(),
            d.row.area,
            d.score_label(),
            d.prediction_label(),
            d.payload_text()
        );
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
