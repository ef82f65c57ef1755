//! Static column tables for the box score merge.
//!
//! Player and team box scores share the stat columns; they differ only in
//! their identifying columns and in the key the two flavours are joined on.

use crate::models::EntityScope;

/// Column written first in every output table, holding the work unit id
pub const UNIT_COLUMN: &str = "UNIT_ID";

/// Traditional box score stats kept after the join
pub const TRADITIONAL_STATS: &[&str] = &[
    "fieldGoalsMade",
    "fieldGoalsAttempted",
    "fieldGoalsPercentage",
    "threePointersMade",
    "threePointersAttempted",
    "threePointersPercentage",
    "freeThrowsMade",
    "freeThrowsAttempted",
    "freeThrowsPercentage",
    "reboundsOffensive",
    "reboundsDefensive",
    "reboundsTotal",
    "assists",
    "steals",
    "blocks",
    "turnovers",
    "points",
    "plusMinusPoints",
];

/// Advanced box score stats kept after the join, under their source names
pub const ADVANCED_STATS: &[&str] = &[
    "estimatedOffensiveRating",
    "offensiveRating",
    "estimatedDefensiveRating",
    "defensiveRating",
    "estimatedNetRating",
    "netRating",
    "assistPercentage",
    "assistToTurnover",
    "assistRatio",
    "offensiveReboundPercentage",
    "defensiveReboundPercentage",
    "reboundPercentage",
    "turnoverRatio",
    "effectiveFieldGoalPercentage",
    "trueShootingPercentage",
    "usagePercentage",
    "estimatedUsagePercentage",
    "estimatedPace",
    "pace",
    "pacePer40",
    "possessions",
    "PIE",
];

/// Source name -> canonical name for traditional columns
pub const CANONICAL_NAMES: &[(&str, &str)] = &[
    ("gameId", "GAME_ID"),
    ("teamId", "TEAM_ID"),
    ("teamCity", "TEAM_CITY"),
    ("teamName", "TEAM_NAME"),
    ("personId", "PLAYER_ID"),
    ("firstName", "FIRST_NAME"),
    ("familyName", "LAST_NAME"),
    ("minutes", "MINUTES"),
    ("fieldGoalsMade", "FGM"),
    ("fieldGoalsAttempted", "FGA"),
    ("fieldGoalsPercentage", "FG%"),
    ("threePointersMade", "3PM"),
    ("threePointersAttempted", "3PA"),
    ("threePointersPercentage", "3P%"),
    ("freeThrowsMade", "FTM"),
    ("freeThrowsAttempted", "FTA"),
    ("freeThrowsPercentage", "FT%"),
    ("reboundsOffensive", "OREB"),
    ("reboundsDefensive", "DREB"),
    ("reboundsTotal", "TREB"),
    ("assists", "AST"),
    ("steals", "STL"),
    ("blocks", "BLK"),
    ("turnovers", "TO"),
    ("points", "PTS"),
    ("plusMinusPoints", "+/-"),
];

#[derive(Debug)]
pub struct MergeSchema {
    pub name: &'static str,
    /// Columns both flavours are matched on
    pub join_key: &'static [&'static str],
    /// Traditional columns placed ahead of `TRADITIONAL_STATS`
    pub identity_columns: &'static [&'static str],
}

pub static PLAYER_SCHEMA: MergeSchema = MergeSchema {
    name: "player",
    join_key: &["personId"],
    identity_columns: &[
        "gameId",
        "teamId",
        "teamCity",
        "teamName",
        "personId",
        "firstName",
        "familyName",
        "minutes",
    ],
};

pub static TEAM_SCHEMA: MergeSchema = MergeSchema {
    name: "team",
    join_key: &["gameId", "teamId"],
    identity_columns: &["gameId", "teamId", "teamCity", "teamName"],
};

impl EntityScope {
    pub fn schema(&self) -> &'static MergeSchema {
        match self {
            EntityScope::Player => &PLAYER_SCHEMA,
            EntityScope::Team => &TEAM_SCHEMA,
        }
    }
}

/// Canonical name for a traditional source column; unmapped names pass through
pub fn canonical_name(source: &str) -> &str {
    CANONICAL_NAMES
        .iter()
        .find(|(from, _)| *from == source)
        .map(|(_, to)| *to)
        .unwrap_or(source)
}

impl MergeSchema {
    /// Traditional allow-list in output order (source names)
    pub fn traditional_columns(&self) -> impl Iterator<Item = &'static str> {
        let identity: &'static [&'static str] = self.identity_columns;
        identity.iter().chain(TRADITIONAL_STATS.iter()).copied()
    }

    pub fn advanced_columns(&self) -> impl Iterator<Item = &'static str> {
        ADVANCED_STATS.iter().copied()
    }

    /// Canonical names of the traditional side, in output order
    pub fn canonical_columns(&self) -> Vec<String> {
        self.traditional_columns()
            .map(|c| canonical_name(c).to_string())
            .collect()
    }

    /// Header of a result table: unit id, canonical traditional, advanced
    pub fn output_columns(&self) -> Vec<String> {
        std::iter::once(UNIT_COLUMN.to_string())
            .chain(self.canonical_columns())
            .chain(self.advanced_columns().map(str::to_string))
            .collect()
    }
}
