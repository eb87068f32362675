//! `contrail`: one scheduling cycle of the flight lifecycle engine.
//!
//! Each invocation opens the SQLite store, runs one step of the cycle over a
//! JSON input file (or stdin with `-`), prints a JSON report on stdout and
//! exits.
//!
//! # Usage
//!
//! ```
//! contrail triage --signals signals.json
//! contrail reconcile --observations scraped.json --static metadata.json
//! contrail snapshot --input positions.json
//! contrail close-stale
//! contrail views --timeline live --callsign AFR1234 --limit 20
//! contrail merged AFR1234
//! ```

mod settings;

use std::{
  io::{self, Read as _, Write as _},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use contrail_core::{
  engine::{RawObservation, Reconciler},
  live::{LiveObservation, LiveSignal},
  partition::Timeline,
  static_data::StaticRecord,
  store::LegStore as _,
};
use contrail_store_sqlite::SqliteStore;
use serde::{Serialize, de::DeserializeOwned};
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(author, version, about = "Flight lifecycle reconciliation engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "contrail.toml")]
  config: PathBuf,

  /// Evaluate the cycle as of this RFC 3339 instant instead of the clock.
  #[arg(long, env = "CONTRAIL_NOW")]
  now: Option<DateTime<Utc>>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Select the live signals whose legs need a fresh status observation.
  Triage {
    /// JSON array of `{callsign, tail_id, on_ground}`.
    #[arg(long, value_name = "FILE")]
    signals: PathBuf,
  },

  /// Reconcile scraped status observations into stored legs.
  Reconcile {
    /// JSON array of raw observations.
    #[arg(long, value_name = "FILE")]
    observations: PathBuf,

    /// JSON array of static metadata records, stored before reconciling.
    #[arg(long = "static", value_name = "FILE")]
    static_records: Option<PathBuf>,
  },

  /// Stamp live positional observations with their leg and store them.
  Snapshot {
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
  },

  /// Force-close every open leg that has gone silent.
  CloseStale,

  /// Print the auto-closure ledger.
  Closures,

  /// Print the done/current views.
  Views {
    #[arg(long, default_value_t = Timeline::All)]
    timeline: Timeline,

    #[arg(long)]
    callsign: Option<String>,

    #[arg(long)]
    limit: Option<usize>,
  },

  /// Print static metadata plus every leg of one callsign.
  Merged { callsign: String },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  // Logs go to stderr so stdout stays valid JSON.
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  let engine = Arc::new(Reconciler::new(Arc::new(store), settings.engine));
  let now = cli.now.unwrap_or_else(Utc::now);

  match cli.command {
    Command::Triage { signals } => {
      let signals: Vec<LiveSignal> = read_json(&signals)?;
      emit(&engine.triage(signals, now).await)
    }

    Command::Reconcile { observations, static_records } => {
      if let Some(path) = static_records {
        let records: Vec<StaticRecord> = read_json(&path)?;
        let failures = engine.ingest_static(records).await;
        if !failures.is_empty() {
          tracing::warn!(failed = failures.len(), "some static records were not stored");
        }
      }
      let observations: Vec<RawObservation> = read_json(&observations)?;
      emit(&engine.reconcile_batch(observations, now).await)
    }

    Command::Snapshot { input } => {
      let observations: Vec<LiveObservation> = read_json(&input)?;
      emit(&engine.record_snapshots(observations, now).await)
    }

    Command::CloseStale => {
      let closures = engine.close_stale(now).await.context("auto-closure sweep failed")?;
      emit(&closures)
    }

    Command::Closures => {
      let closures = engine.store().closures().await.context("failed to read closures")?;
      emit(&closures)
    }

    Command::Views { timeline, callsign, limit } => {
      let views = engine.views(now).await.context("failed to build views")?;
      emit(&views.select(timeline, callsign.as_deref(), limit))
    }

    Command::Merged { callsign } => {
      let view = engine
        .callsign_view(&callsign, now)
        .await
        .context("failed to build callsign view")?
        .with_context(|| format!("no static metadata for {callsign}"))?;
      emit(&view)
    }
  }
}

// ─── I/O helpers ─────────────────────────────────────────────────────────────

/// Deserialize a JSON document from `path`, or from stdin when `path` is `-`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let raw = if path == Path::new("-") {
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf).context("reading stdin")?;
    buf
  } else {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
  };
  serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
  let mut stdout = io::stdout().lock();
  serde_json::to_writer_pretty(&mut stdout, value).context("writing output")?;
  writeln!(stdout).context("writing output")?;
  Ok(())
}
