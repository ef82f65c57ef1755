use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use nba_prop_stats::api::projections_api::ProjectionsApiClient;
use nba_prop_stats::api::stats_api::{game_ids_in_range, StatsApiClient};
use nba_prop_stats::data::{
    extract_props, load_game_ids, read_checkpoint, save_skipped_units, write_dataset_csv,
    ResultCsv,
};
use nba_prop_stats::{
    collect_box_scores, discover_games, Config, EntityScope, HttpTransport, ResultTable, WorkUnit,
};
use std::path::PathBuf;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(author, version, about = "Box score and player prop scraper")]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merged advanced + traditional player box scores, one row per player per game
    Players(BoxScoreArgs),
    /// Merged advanced + traditional team box scores, one row per team per game
    Teams(BoxScoreArgs),
    /// Find game ids for a date range and append them to the cache
    Games {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value = "game_ids_cache.json")]
        cache: PathBuf,
    },
    /// Download player projections for one or more leagues
    Props {
        /// League as ID:NAME, e.g. 7:NBA or 9:NFL
        #[arg(long = "league", value_parser = parse_league, required = true)]
        leagues: Vec<League>,
        #[arg(long, default_value_t = 1000)]
        per_page: u32,
        #[arg(long, default_value_t = 1)]
        pages: u32,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Don't join player attributes onto each projection
        #[arg(long)]
        no_players: bool,
    },
    /// Trim a projections CSV down to league, player, stat, line and type
    Extract {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct BoxScoreArgs {
    /// JSON file with a "game_ids" list
    #[arg(long, conflicts_with = "prefix")]
    cache: Option<PathBuf>,

    /// Season prefix for generated ids, e.g. 002240
    #[arg(long, requires = "to")]
    prefix: Option<String>,

    #[arg(long, default_value_t = 0)]
    from: u32,

    #[arg(long)]
    to: Option<u32>,

    /// Skip this many ids from the front of the list
    #[arg(long, default_value_t = 0)]
    skip: usize,

    #[arg(long)]
    out: PathBuf,

    /// Rewritten after every game
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Reload the checkpoint and skip games already in it
    #[arg(long, requires = "checkpoint")]
    resume: bool,

    /// Write skipped games and reasons here as JSON
    #[arg(long)]
    failed_out: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct League {
    id: u32,
    name: String,
}

fn parse_league(s: &str) -> Result<League, String> {
    let (id, name) = s
        .split_once(':')
        .ok_or_else(|| format!("expected ID:NAME, got '{}'", s))?;
    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("league id '{}' is not a number", id))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("league name missing in '{}'", s));
    }
    Ok(League {
        id,
        name: name.to_string(),
    })
}

fn work_units(args: &BoxScoreArgs) -> Result<Vec<WorkUnit>> {
    let units = if let Some(cache) = &args.cache {
        load_game_ids(cache)
            .with_context(|| format!("Failed to read game id cache {}", cache.display()))?
            .game_ids
    } else if let (Some(prefix), Some(to)) = (&args.prefix, args.to) {
        game_ids_in_range(prefix, args.from, to)
    } else {
        bail!("either --cache or --prefix/--to is required");
    };

    Ok(units.into_iter().skip(args.skip).collect())
}

async fn run_box_scores(config: &Config, scope: EntityScope, args: BoxScoreArgs) -> Result<()> {
    let units = work_units(&args)?;
    if units.is_empty() {
        bail!("no game ids to process");
    }

    let columns = scope.schema().output_columns();
    let table = match &args.checkpoint {
        Some(path) if args.resume && path.exists() => {
            let table = read_checkpoint(path, columns)
                .with_context(|| format!("Failed to reload checkpoint {}", path.display()))?;
            info!(rows = table.len(), "loaded checkpoint");
            table
        }
        _ => ResultTable::new(columns),
    };

    // may be the checkpoint itself, so only opened once that is loaded
    let out = ResultCsv::create(&args.out).context("Cannot open output file")?;

    let client = StatsApiClient::new(HttpTransport::new(config)?, config);
    let report = collect_box_scores(
        &client,
        &units,
        scope,
        table,
        args.checkpoint.as_deref(),
        config.unit_delay,
    )
    .await?;

    let path = out.path().to_path_buf();
    out.write(&report.table)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Saved {} rows to {}", report.table.len(), path.display());

    if !report.skipped.is_empty() {
        println!("Skipped {} games:", report.skipped.len());
        for skipped in &report.skipped {
            println!("  {}: {}", skipped.unit, skipped.reason);
        }
        if let Some(failed) = &args.failed_out {
            match save_skipped_units(failed, &report.skipped) {
                Ok(()) => println!("Saved skipped games to {}", failed.display()),
                Err(e) => warn!(error = %e, "failed to save skipped games"),
            }
        }
    }

    Ok(())
}

async fn run_props(
    config: &Config,
    leagues: Vec<League>,
    per_page: u32,
    pages: u32,
    out_dir: PathBuf,
    include_players: bool,
) -> Result<()> {
    let client = ProjectionsApiClient::new(HttpTransport::new(config)?, config);

    for (i, league) in leagues.iter().enumerate() {
        if i > 0 {
            let wait = config.unit_delay.sample(&mut rand::thread_rng());
            tokio::time::sleep(wait).await;
        }

        let table = match client
            .fetch_league(league.id, per_page, pages, include_players)
            .await
        {
            Ok(table) => table,
            Err(e) if e.is_unit_skip() => {
                warn!(league = %league.name, reason = %e, "skipping league");
                println!("{}_Failed", league.name);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let raw = out_dir.join(format!("{}_Prize_picks.csv", league.name));
        write_dataset_csv(&raw, &table)
            .with_context(|| format!("Failed to write {}", raw.display()))?;
        println!("Saved {} projections to {}", table.len(), raw.display());

        let props = out_dir.join(format!("{}_PrizeProps.csv", league.name));
        let count = extract_props(&raw, &props)
            .with_context(|| format!("Failed to write {}", props.display()))?;
        println!("Saved {} prop lines to {}", count, props.display());
    }

    Ok(())
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(log_level(cli.verbose))
        .init();

    let config = Config::from_env().context("Invalid configuration")?;

    match cli.command {
        Command::Players(args) => run_box_scores(&config, EntityScope::Player, args).await?,
        Command::Teams(args) => run_box_scores(&config, EntityScope::Team, args).await?,
        Command::Games { start, end, cache } => {
            let client = StatsApiClient::new(HttpTransport::new(&config)?, &config);
            let found = discover_games(&client, start, end, &cache, config.unit_delay).await?;
            println!("Found {} games, cached in {}", found.len(), cache.display());
        }
        Command::Props {
            leagues,
            per_page,
            pages,
            out_dir,
            no_players,
        } => run_props(&config, leagues, per_page, pages, out_dir, !no_players).await?,
        Command::Extract { input, output } => {
            let count = extract_props(&input, &output)?;
            println!("Saved {} prop lines to {}", count, output.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_league() {
        let league = parse_league("7:NBA").unwrap();
        assert_eq!(league.id, 7);
        assert_eq!(league.name, "NBA");
        assert!(parse_league("NBA").is_err());
        assert!(parse_league("x:NBA").is_err());
        assert!(parse_league("9:").is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_units_from_range_with_skip() {
        let cli = Cli::try_parse_from([
            "cli", "players", "--prefix", "002240", "--to", "701", "--skip", "525", "--out", "x.csv",
        ])
        .unwrap();
        let Command::Players(args) = cli.command else {
            panic!("expected players command");
        };
        let units = work_units(&args).unwrap();
        assert_eq!(units.len(), 176);
        assert_eq!(units[0].as_str(), "0022400525");
    }

    #[test]
    fn test_verbosity_levels() {
        let cli = Cli::try_parse_from(["cli", "-vv", "extract", "--input", "a", "--output", "b"]).unwrap();
        assert_eq!(log_level(cli.verbose), Level::DEBUG);
        assert_eq!(log_level(0), Level::WARN);
        assert_eq!(log_level(1), Level::INFO);
        assert_eq!(log_level(7), Level::TRACE);
    }

    #[test]
    fn test_resume_with_output_at_checkpoint_path() {
        let cli = Cli::try_parse_from([
            "cli", "players", "--prefix", "002240", "--to", "3", "--out", "stats.csv",
            "--checkpoint", "stats.csv", "--resume",
        ])
        .unwrap();
        let Command::Players(args) = cli.command else {
            panic!("expected players command");
        };
        assert_eq!(args.out, args.checkpoint.unwrap());
        assert!(args.resume);
    }

    #[test]
    fn test_bad_date_rejected() {
        assert!(Cli::try_parse_from(["cli", "games", "--start", "2022-13-01", "--end", "2023-04-09"]).is_err());
    }
}
