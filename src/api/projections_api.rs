use crate::api::fetcher::{Fetcher, Transport};
use crate::config::Config;
use crate::error::Result;
use crate::models::{RawDataset, WorkUnit};
use crate::utils::flatten::{drop_null_columns, filter_eq, normalize, DEFAULT_MAX_LEVEL};
use crate::utils::merge::left_join;
use serde_json::Value;
use tracing::{debug, info};

const PLAYER_TYPE: &str = "new_player";
const PLAYER_REF: [&str; 2] = [
    "relationships.new_player.data.id",
    "relationships.new_player.data.type",
];
const PLAYER_SUFFIX: &str = "_new_player";

/// A single page of the projections feed
#[derive(Debug, Clone, Default)]
pub struct ProjectionsPage {
    pub data: Vec<Value>,
    pub included: Vec<Value>,
}

impl ProjectionsPage {
    pub fn from_document(doc: &Value) -> std::result::Result<Self, String> {
        let list = |key: &str| -> std::result::Result<Vec<Value>, String> {
            doc.get(key)
                .ok_or_else(|| format!("missing '{}'", key))?
                .as_array()
                .cloned()
                .ok_or_else(|| format!("'{}' is not a list", key))
        };
        Ok(Self {
            data: list("data")?,
            included: list("included")?,
        })
    }
}

/// Flatten a page into one row per projection, optionally pulling in the
/// attributes of the player each projection points at.
pub fn projections_table(page: &ProjectionsPage, include_players: bool) -> Result<RawDataset> {
    let projections = normalize(&page.data, DEFAULT_MAX_LEVEL);
    if !include_players || projections.is_empty() {
        return Ok(projections);
    }

    let included = normalize(&page.included, DEFAULT_MAX_LEVEL);
    let players = drop_null_columns(&filter_eq(&included, "type", PLAYER_TYPE));
    if players.is_empty() {
        debug!("no player entities included, skipping player join");
        return Ok(projections);
    }

    left_join(
        &projections,
        &players,
        &PLAYER_REF,
        &["id", "type"],
        PLAYER_SUFFIX,
    )
}

/// Client for the paginated player projections feed
pub struct ProjectionsApiClient<T> {
    fetcher: Fetcher<T>,
    base_url: String,
}

impl<T: Transport> ProjectionsApiClient<T> {
    pub fn new(transport: T, config: &Config) -> Self {
        Self {
            fetcher: Fetcher::new(transport, config.retry),
            base_url: config.projections_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn projections_url(&self, league_id: u32, per_page: u32, page: u32) -> String {
        format!(
            "{}/projections?league_id={}&per_page={}&page={}",
            self.base_url, league_id, per_page, page
        )
    }

    pub async fn fetch_page(&self, league_id: u32, per_page: u32, page: u32) -> Result<ProjectionsPage> {
        let url = self.projections_url(league_id, per_page, page);
        let unit = WorkUnit::new(url.clone());
        self.fetcher
            .fetch_with(&unit, "projections", &url, ProjectionsPage::from_document)
            .await
    }

    /// Fetch up to `max_pages` pages for a league, stopping at the first empty
    /// one, and stack them into a single table.
    pub async fn fetch_league(
        &self,
        league_id: u32,
        per_page: u32,
        max_pages: u32,
        include_players: bool,
    ) -> Result<RawDataset> {
        let mut tables = Vec::new();
        for page in 1..=max_pages.max(1) {
            let fetched = self.fetch_page(league_id, per_page, page).await?;
            if fetched.data.is_empty() {
                break;
            }
            tables.push(projections_table(&fetched, include_players)?);
        }

        let table = RawDataset::concat(tables);
        info!(league_id, rows = table.len(), "collected projections");
        Ok(table)
    }
}
