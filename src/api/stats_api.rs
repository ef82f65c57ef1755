use crate::api::fetcher::{Fetcher, Transport};
use crate::config::Config;
use crate::error::Result;
use crate::models::{EntityScope, RawDataset, ResourceKind, WorkUnit};
use crate::utils::flatten::normalize;
use chrono::NaiveDate;
use serde_json::{Map, Value};

const SCOREBOARD_ENDPOINT: &str = "scoreboardv2";
const LEAGUE_ID: &str = "00";
// whole game, no period or time slicing
const BOX_SCORE_RANGE: &str = "StartPeriod=0&EndPeriod=0&StartRange=0&EndRange=0&RangeType=0";
const BOX_SCORE_KEYS: [&str; 2] = ["boxScoreAdvanced", "boxScoreTraditional"];
const SIDES: [&str; 2] = ["homeTeam", "awayTeam"];

/// Client for the league stats API (box scores and scoreboards)
pub struct StatsApiClient<T> {
    fetcher: Fetcher<T>,
    base_url: String,
}

impl<T: Transport> StatsApiClient<T> {
    pub fn new(transport: T, config: &Config) -> Self {
        Self {
            fetcher: Fetcher::new(transport, config.retry),
            base_url: config.stats_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn box_score_url(&self, unit: &WorkUnit, kind: ResourceKind) -> String {
        format!(
            "{}/{}?GameID={}&{}",
            self.base_url,
            kind.endpoint(),
            unit,
            BOX_SCORE_RANGE
        )
    }

    pub fn scoreboard_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}?GameDate={}&LeagueID={}&DayOffset=0",
            self.base_url,
            SCOREBOARD_ENDPOINT,
            date.format("%Y-%m-%d"),
            LEAGUE_ID
        )
    }

    /// Fetch one flavour of box score for a game
    pub async fn fetch(
        &self,
        unit: &WorkUnit,
        kind: ResourceKind,
        scope: EntityScope,
    ) -> Result<RawDataset> {
        let url = self.box_score_url(unit, kind);
        let resource = format!("{} {}", kind, scope.label());
        self.fetcher
            .fetch_with(unit, &resource, &url, |doc| box_score_dataset(doc, scope))
            .await
    }

    /// Fetch the game header rows for a single date
    pub async fn fetch_scoreboard(&self, date: NaiveDate) -> Result<RawDataset> {
        let unit = WorkUnit::new(date.format("%Y-%m-%d").to_string());
        let url = self.scoreboard_url(date);
        self.fetcher
            .fetch_with(&unit, "scoreboard", &url, RawDataset::from_document)
            .await
    }
}

fn copy_scalars(from: &Map<String, Value>, row: &mut Map<String, Value>) {
    for (key, value) in from {
        if !value.is_object() && !value.is_array() {
            row.insert(key.clone(), value.clone());
        }
    }
}

/// Reshape a box score document into one row per player or per team.
///
/// The live payload nests everything under `boxScoreAdvanced` or
/// `boxScoreTraditional`. `homeTeam` and `awayTeam` each carry the team's
/// fields, a team `statistics` object and a `players` list whose entries have
/// their own `statistics`. Rows start with `gameId`, then team fields, then
/// player fields, then statistics. Documents already in `headers`/`data` or
/// `resultSets` form are read as they are.
pub fn box_score_dataset(doc: &Value, scope: EntityScope) -> std::result::Result<RawDataset, String> {
    let Some(box_score) = BOX_SCORE_KEYS.iter().find_map(|key| doc.get(*key)) else {
        return RawDataset::from_document(doc);
    };
    let box_score = box_score.as_object().ok_or("box score is not an object")?;
    let game_id = box_score.get("gameId").cloned().unwrap_or(Value::Null);

    let mut rows = Vec::new();
    for side in SIDES {
        let team = box_score
            .get(side)
            .and_then(Value::as_object)
            .ok_or_else(|| format!("missing '{}'", side))?;
        let mut team_fields = Map::new();
        team_fields.insert("gameId".to_string(), game_id.clone());
        copy_scalars(team, &mut team_fields);

        match scope {
            EntityScope::Team => {
                let stats = team
                    .get("statistics")
                    .and_then(Value::as_object)
                    .ok_or_else(|| format!("missing 'statistics' for {}", side))?;
                let mut row = team_fields;
                copy_scalars(stats, &mut row);
                rows.push(Value::Object(row));
            }
            EntityScope::Player => {
                let players = team
                    .get("players")
                    .and_then(Value::as_array)
                    .ok_or_else(|| format!("missing 'players' for {}", side))?;
                for player in players {
                    let player = player.as_object().ok_or("player entry is not an object")?;
                    let mut row = team_fields.clone();
                    copy_scalars(player, &mut row);
                    if let Some(stats) = player.get("statistics").and_then(Value::as_object) {
                        copy_scalars(stats, &mut row);
                    }
                    rows.push(Value::Object(row));
                }
            }
        }
    }

    Ok(normalize(&rows, 0))
}

/// Game ids on the scoreboard whose `GAME_DATE_EST` falls on `date`.
///
/// Rows lacking either column are ignored.
pub fn game_ids_on(scoreboard: &RawDataset, date: NaiveDate) -> Vec<WorkUnit> {
    let day = date.format("%Y-%m-%d").to_string();
    (0..scoreboard.len())
        .filter(|&row| {
            scoreboard
                .cell(row, "GAME_DATE_EST")
                .and_then(|v| v.as_str())
                .is_some_and(|s| s.starts_with(&day))
        })
        .filter_map(|row| scoreboard.cell(row, "GAME_ID")?.as_str().map(WorkUnit::from))
        .collect()
}

/// Game ids built from a season prefix and a zero-padded index,
/// e.g. `002240` + `0525`
pub fn game_ids_in_range(prefix: &str, start: u32, end: u32) -> Vec<WorkUnit> {
    (start..end)
        .map(|i| WorkUnit::new(format!("{}{:04}", prefix, i)))
        .collect()
}
