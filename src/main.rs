mod cache;
mod config;
mod error;
mod fetch;
mod football;
mod logging;
mod store;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde_json::json;
use std::path::PathBuf;

use cache::{CacheResult, CacheSource};
use fetch::Payload;
use football::{apply_crests, FootballService};

#[derive(Parser, Debug)]
#[command(name = "scoreline")]
#[command(about = "Football standings and fixtures that keep working when the API does not")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/scoreline/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(clap::Args, Debug)]
struct Target {
  /// Competition code, e.g. PL or BL1
  #[arg(long, default_value = "PL")]
  competition: String,

  /// Season start year
  #[arg(long, default_value = "2023")]
  season: String,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// League table
  Standings {
    #[command(flatten)]
    target: Target,

    /// Add team crests
    #[arg(long)]
    enrich: bool,
  },
  /// Fixtures with a given status
  Matches {
    #[command(flatten)]
    target: Target,

    #[arg(long, default_value = "SCHEDULED")]
    status: String,

    /// Add team crests
    #[arg(long)]
    enrich: bool,
  },
  /// Team crest list
  Crests {
    #[command(flatten)]
    target: Target,
  },
  /// Standings plus scheduled and finished fixtures with crests
  Overview {
    #[command(flatten)]
    target: Target,
  },
  /// Delete stored records older than the given number of days
  Prune {
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(..=36_500))]
    older_than_days: u32,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init_logging(&config.logging);

  let service = FootballService::new(&config)?;

  let output = match args.command {
    Command::Standings { target, enrich } => {
      let result = service.get_standings(&target.competition, &target.season).await?;
      let result = if enrich {
        with_crests(&service, &target, result, "standings").await
      } else {
        result
      };
      describe(result)
    }
    Command::Matches {
      target,
      status,
      enrich,
    } => {
      let result = service
        .get_matches(&target.competition, &target.season, &status)
        .await?;
      let result = if enrich {
        with_crests(&service, &target, result, "matches").await
      } else {
        result
      };
      describe(result)
    }
    Command::Crests { target } => {
      describe(service.get_crests(&target.competition, &target.season).await?)
    }
    Command::Overview { target } => {
      service
        .get_overview(&target.competition, &target.season)
        .await?
    }
    Command::Prune { older_than_days } => {
      let removed = service.prune(chrono::Duration::days(i64::from(older_than_days)))?;
      tracing::info!(removed, older_than_days, "Pruned stored records");
      json!({ "removed": removed })
    }
  };

  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}

async fn with_crests<T, S>(
  service: &FootballService<T, S>,
  target: &Target,
  mut result: CacheResult<Payload>,
  section: &str,
) -> CacheResult<Payload>
where
  T: fetch::Transport,
  S: store::RecordStore,
{
  let crests = service
    .crest_list(&target.competition, &target.season)
    .await;
  apply_crests(&mut result.data, section, &crests);
  result
}

/// Wrap a result with where it came from, so stale data is visible to the caller.
fn describe(result: CacheResult<Payload>) -> Payload {
  let source = match result.source {
    CacheSource::Remote => "remote",
    CacheSource::Stored => "stored",
    CacheSource::Offline => "offline",
  };
  json!({
    "source": source,
    "cached_at": result.cached_at.map(|at| at.to_rfc3339()),
    "data": result.data,
  })
}
