pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod utils;

pub use api::*;
pub use config::*;
pub use error::{Error, Result};
pub use models::*;
pub use utils::*;

use api::stats_api::{game_ids_on, StatsApiClient};
use chrono::NaiveDate;
use std::path::Path;
use tracing::{info, warn};
use utils::data::{append_game_ids, write_checkpoint, SkippedUnit};
use utils::merge::merge;

/// Everything a box score run produced
#[derive(Debug, Default)]
pub struct RunReport {
    pub table: ResultTable,
    pub skipped: Vec<SkippedUnit>,
}

async fn pause(delay: &DelayRange) {
    let wait = delay.sample(&mut rand::thread_rng());
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
}

async fn collect_unit<T: Transport>(
    client: &StatsApiClient<T>,
    unit: &WorkUnit,
    scope: EntityScope,
) -> Result<Vec<MergedRecord>> {
    let advanced = client.fetch(unit, ResourceKind::Advanced, scope).await?;
    let traditional = client.fetch(unit, ResourceKind::Traditional, scope).await?;
    merge(unit, &advanced, &traditional, scope.schema())
}

/// Fetch, merge and accumulate box scores for `units`, in order.
///
/// `table` may already hold rows from an earlier run; units present in it
/// are not fetched again. Units that fail are logged and recorded in the
/// report. When `checkpoint` is set the whole table is rewritten there after
/// every unit; a failed checkpoint write is only logged.
pub async fn collect_box_scores<T: Transport>(
    client: &StatsApiClient<T>,
    units: &[WorkUnit],
    scope: EntityScope,
    mut table: ResultTable,
    checkpoint: Option<&Path>,
    unit_delay: DelayRange,
) -> Result<RunReport> {
    let done = table.processed_units();
    let mut skipped = Vec::new();
    let pending: Vec<&WorkUnit> = units.iter().filter(|u| !done.contains(*u)).collect();

    if pending.len() < units.len() {
        info!(
            already_done = units.len() - pending.len(),
            "resuming from earlier checkpoint"
        );
    }

    for (i, unit) in pending.iter().enumerate() {
        info!(%unit, n = i + 1, of = pending.len(), "fetching box scores");

        match collect_unit(client, unit, scope).await {
            Ok(records) => {
                info!(%unit, rows = records.len(), "merged");
                table.append(records);

                if let Some(path) = checkpoint {
                    if let Err(e) = write_checkpoint(path, &table) {
                        warn!(error = %e, "checkpoint write failed");
                    }
                }
            }
            Err(e) if e.is_unit_skip() => {
                warn!(%unit, reason = %e, "skipping unit");
                skipped.push(SkippedUnit {
                    unit: (*unit).clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }

        if i + 1 < pending.len() {
            pause(&unit_delay).await;
        }
    }

    info!(
        rows = table.len(),
        skipped = skipped.len(),
        "box score run finished"
    );
    Ok(RunReport { table, skipped })
}

/// Walk `start..=end`, collect the game ids played on each day and append
/// them to the JSON cache at `cache`.
///
/// Days the scoreboard can't be fetched for are logged and skipped.
pub async fn discover_games<T: Transport>(
    client: &StatsApiClient<T>,
    start: NaiveDate,
    end: NaiveDate,
    cache: &Path,
    day_delay: DelayRange,
) -> Result<Vec<WorkUnit>> {
    if start > end {
        return Err(Error::Config(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }

    let mut found = Vec::new();
    let mut day = start;
    loop {
        info!(date = %day, "fetching games");
        match client.fetch_scoreboard(day).await {
            Ok(scoreboard) => {
                let ids = game_ids_on(&scoreboard, day);
                if ids.is_empty() {
                    warn!(date = %day, "no games found");
                } else {
                    match append_game_ids(cache, &ids) {
                        Ok(added) => info!(date = %day, games = ids.len(), added, "cached game ids"),
                        Err(e) => warn!(date = %day, error = %e, "failed to update game id cache"),
                    }
                    found.extend(ids);
                }
            }
            Err(e) if e.is_unit_skip() => warn!(date = %day, reason = %e, "skipping date"),
            Err(e) => return Err(e),
        }

        match day.succ_opt() {
            Some(next) if next <= end => day = next,
            _ => break,
        }
        pause(&day_delay).await;
    }

    info!(games = found.len(), "discovery finished");
    Ok(found)
}
