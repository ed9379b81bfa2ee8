// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use etour_smos::smos::{sample, Smos};
use etour_smos::{
    count_events, get_events_for_entity, get_recent_events, insert_events, load_roster_csv,
    open_database, scenarios, AppConfig, Event, Scenario, Transcript,
};

/// eTour and SMOS use cases on the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "ETOUR_SMOS_CONFIG")]
    config: Option<PathBuf>,

    /// Probability (0-1) that a server call is interrupted
    #[arg(long, global = true)]
    failure_rate: Option<f64>,

    /// Seed for the simulated connection
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a narrated use case against the sample data
    Demo {
        /// Scenario name (see `scenarios`)
        scenario: Option<String>,

        /// Run every scenario
        #[arg(long, conflicts_with = "scenario")]
        all: bool,
    },

    /// List the available scenarios
    Scenarios,

    /// Import a student roster CSV into the sample school
    ImportRoster {
        csv: PathBuf,
    },

    /// Show the stored audit events
    Audit {
        #[arg(long, requires = "entity_id")]
        entity_type: Option<String>,

        #[arg(long, requires = "entity_type")]
        entity_id: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Browse the sample systems in the terminal
    Ui,
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Command::Ui) {
        Command::Demo { scenario, all } => run_demo(&config, scenario.as_deref(), all),
        Command::Scenarios => {
            list_scenarios();
            Ok(())
        }
        Command::ImportRoster { csv } => run_import(&config, &csv),
        Command::Audit { entity_type, entity_id, limit } => {
            run_audit(&config, entity_type.as_deref().zip(entity_id.as_deref()), limit)
        }
        Command::Ui => run_ui_mode(&config),
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref())?;

    if let Some(rate) = cli.failure_rate {
        config.link.failure_rate = rate;
    }
    if let Some(seed) = cli.seed {
        config.link.seed = Some(seed);
    }

    config.validate()?;
    Ok(config)
}

fn list_scenarios() {
    println!("🎬 Scenarios");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for scenario in Scenario::all() {
        println!("  {:<28} {}", scenario.name(), scenario.description());
    }
}

fn run_demo(config: &AppConfig, scenario: Option<&str>, all: bool) -> Result<()> {
    let selected: Vec<Scenario> = match (scenario, all) {
        (_, true) => Scenario::all().to_vec(),
        (Some(name), false) => vec![name.parse::<Scenario>().map_err(|e| anyhow!(e))?],
        (None, false) => return Err(anyhow!("Name a scenario or pass --all (see `scenarios`)")),
    };

    println!(
        "📡 Failure rate: {:.0}%{}",
        config.link.failure_rate * 100.0,
        config.link.seed.map(|s| format!(" (seed {})", s)).unwrap_or_default()
    );

    let mut transcripts = Vec::new();
    for scenario in selected {
        let transcript = scenarios::run(scenario, config);
        print_transcript(&transcript);
        transcripts.push(transcript);
    }

    let events: Vec<Event> = transcripts.iter().flat_map(|t| t.events.clone()).collect();
    persist_events(&config.db_path, &events)?;

    if transcripts.len() > 1 {
        let passed = transcripts.iter().filter(|t| t.succeeded).count();
        println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for t in &transcripts {
            println!("{} {}", if t.succeeded { "✅" } else { "❌" }, t.scenario);
        }
        println!("\n{} of {} scenarios completed", passed, transcripts.len());
    }

    Ok(())
}

fn print_transcript(transcript: &Transcript) {
    println!("\n▶ {} - {}", transcript.scenario.name(), transcript.scenario.description());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for line in &transcript.lines {
        println!("{}", line);
    }
}

fn persist_events(db_path: &Path, events: &[Event]) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }

    let mut conn = open_database(db_path)?;
    let inserted = insert_events(&mut conn, events)?;
    tracing::info!(inserted, db = %db_path.display(), "audit events stored");
    println!("\n💾 {} audit events saved to {}", inserted, db_path.display());
    Ok(())
}

fn run_import(config: &AppConfig, csv: &Path) -> Result<()> {
    println!("🗄️  Roster import - CSV → SMOS");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading {}...", csv.display());
    let rows = load_roster_csv(csv)?;
    println!("✓ Loaded {} rows", rows.len());

    // 2. Sign in to the sample school
    println!("\n🔐 Signing in as {}...", sample::ADMIN.0);
    let mut smos = Smos::with_sample_data(config)?;
    let admin = smos.login(sample::ADMIN.0, sample::ADMIN.1)?;

    // 3. Import
    println!("\n💾 Importing into {}...", smos.school_year());
    let summary = match smos.import_roster(&admin, &rows) {
        Ok(summary) => summary,
        Err(err) => {
            println!("❌ {}", err);
            persist_events(&config.db_path, &smos.audit().events())?;
            return Ok(());
        }
    };

    println!("✓ Students added: {}", summary.students_added);
    println!("✓ Classes created: {}", summary.classes_created);
    println!("✓ Duplicates skipped: {}", summary.duplicates_skipped);
    if !summary.invalid_rows.is_empty() {
        println!("\n⚠️  Invalid rows: {}", summary.invalid_rows.len());
        for row in &summary.invalid_rows {
            println!("   {}", row);
        }
    }

    persist_events(&config.db_path, &smos.audit().events())?;
    Ok(())
}

fn run_audit(config: &AppConfig, entity: Option<(&str, &str)>, limit: usize) -> Result<()> {
    if !config.db_path.exists() {
        eprintln!("❌ Audit database not found: {}", config.db_path.display());
        eprintln!("   Run: etour-smos demo --all");
        eprintln!("   to record some events first.");
        std::process::exit(1);
    }

    let conn = open_database(&config.db_path)?;
    let events = match entity {
        Some((entity_type, entity_id)) => get_events_for_entity(&conn, entity_type, entity_id)?,
        None => get_recent_events(&conn, limit)?,
    };

    println!("🗄️  Audit trail ({} events stored)", count_events(&conn)?);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for event in &events {
        println!(
            "{}  {:<28} {:<18} {:<38} by {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type,
            event.entity_type,
            event.entity_id,
            event.actor
        );
    }
    if events.is_empty() {
        println!("(no events)");
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig) -> Result<()> {
    use etour_smos::Etour;
    use std::collections::HashMap;

    println!("🖥️  Loading eTour / SMOS browser...\n");

    // Browsing is read-only, so the link never drops
    let mut browse = config.clone();
    browse.link.failure_rate = 0.0;

    let mut etour = Etour::with_sample_data(&browse)?;
    let points = etour.search_refreshment_points("")?;
    let mut banners = HashMap::new();
    for point in &points {
        banners.insert(point.id.clone(), etour.banners_for_point(&point.id)?);
    }

    let mut smos = Smos::with_sample_data(&browse)?;
    let admin = smos.login(sample::ADMIN.0, sample::ADMIN.1)?;
    let users = smos.list_users(&admin)?;
    let flagged = smos.monitor_students(&admin)?;

    println!("✓ Loaded {} refreshment points, {} users\n", points.len(), users.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(points, banners, users, flagged);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin etour-smos-server --features server");
    std::process::exit(1);
}
