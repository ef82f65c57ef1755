use crate::error::{Error, Result};
use crate::models::{MergedRecord, RawDataset, ResultTable, WorkUnit};
use crate::utils::schema::UNIT_COLUMN;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// On-disk list of discovered game ids
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameIdCache {
    pub game_ids: Vec<WorkUnit>,
}

/// A unit that was skipped, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedUnit {
    pub unit: WorkUnit,
    pub reason: String,
}

/// One line of the trimmed props export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropLine {
    #[serde(rename = "League")]
    pub league: String,
    #[serde(rename = "PlayerName")]
    pub player_name: String,
    #[serde(rename = "Stat")]
    pub stat: String,
    #[serde(rename = "PropLine")]
    pub prop_line: String,
    #[serde(rename = "Type")]
    pub odds_type: String,
}

/// Write via a temp file in the target's directory, then rename over it
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write = || -> std::io::Result<()> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    };
    write().map_err(|e| Error::persistence(path, e))
}

/// Load the game id cache. A missing file is an empty cache.
pub fn load_game_ids(path: &Path) -> Result<GameIdCache> {
    if !path.exists() {
        return Ok(GameIdCache::default());
    }
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Append ids not already cached and rewrite the file. Returns how many were new.
pub fn append_game_ids(path: &Path, new_ids: &[WorkUnit]) -> Result<usize> {
    let mut cache = load_game_ids(path)?;
    let before = cache.game_ids.len();
    for id in new_ids {
        if !cache.game_ids.contains(id) {
            cache.game_ids.push(id.clone());
        }
    }
    let json = serde_json::to_string_pretty(&cache)?;
    write_atomic(path, json.as_bytes())?;
    Ok(cache.game_ids.len() - before)
}

pub fn save_skipped_units(path: &Path, skipped: &[SkippedUnit]) -> Result<()> {
    let json = serde_json::to_string_pretty(skipped)?;
    write_atomic(path, json.as_bytes())
}

/// Text form of a cell: null is empty, strings unquoted, the rest as JSON
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_table<W: Write>(table: &ResultTable, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(table.columns())?;
    for record in table.records() {
        let row = table.columns().iter().map(|column| {
            if column == UNIT_COLUMN {
                record.work_unit.to_string()
            } else {
                record.get(column).map(cell_text).unwrap_or_default()
            }
        });
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn table_bytes(path: &Path, table: &ResultTable) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_table(table, &mut writer)?;
    writer
        .into_inner()
        .map_err(|e| Error::persistence(path, e.into_error()))
}

/// Final CSV destination, checked up front so a bad path fails before any
/// fetching happens. An existing file is left untouched until `write`.
pub struct ResultCsv {
    path: PathBuf,
}

impl ResultCsv {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::persistence(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(self, table: &ResultTable) -> Result<()> {
        let bytes = table_bytes(&self.path, table)?;
        write_atomic(&self.path, &bytes)
    }
}

/// Rewrite the checkpoint with everything collected so far
pub fn write_checkpoint(path: &Path, table: &ResultTable) -> Result<()> {
    let bytes = table_bytes(path, table)?;
    write_atomic(path, &bytes)
}

/// Reload a checkpoint written by a previous run.
///
/// Cells come back as strings (empty ones as null) laid out on `columns`;
/// the file must carry the unit id column.
pub fn read_checkpoint(path: &Path, columns: Vec<String>) -> Result<ResultTable> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_string(), i))
        .collect();
    let unit_idx = *headers.get(UNIT_COLUMN).ok_or_else(|| {
        Error::Config(format!(
            "checkpoint {} has no {} column",
            path.display(),
            UNIT_COLUMN
        ))
    })?;

    let mut table = ResultTable::new(columns.clone());
    for row in reader.records() {
        let row = row?;
        let fields = columns
            .iter()
            .filter(|c| *c != UNIT_COLUMN)
            .map(|c| {
                let value = match headers.get(c).and_then(|&i| row.get(i)) {
                    Some(text) if !text.is_empty() => Value::String(text.to_string()),
                    _ => Value::Null,
                };
                (c.clone(), value)
            })
            .collect();
        table.append(vec![MergedRecord {
            work_unit: WorkUnit::new(row.get(unit_idx).unwrap_or_default()),
            fields,
        }]);
    }
    Ok(table)
}

/// Dump an arbitrary dataset with its own header
pub fn write_dataset_csv(path: &Path, ds: &RawDataset) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::persistence(path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(&ds.columns)?;
    for row in &ds.rows {
        let cells = (0..ds.columns.len()).map(|i| row.get(i).map(cell_text).unwrap_or_default());
        writer.write_record(cells)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reduce a raw projections CSV to league, player, stat, line and odds type.
/// Returns the number of lines written.
pub fn extract_props(input: &Path, output: &Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(input)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let league = column("attributes.league");
    let name = column("attributes.name");
    let stat = column("attributes.stat_display_name");
    let line = column("attributes.line_score");
    let odds = column("attributes.odds_type");

    let file = File::create(output).map_err(|e| Error::persistence(output, e))?;
    let mut writer = csv::Writer::from_writer(file);
    let mut count = 0;

    for row in reader.records() {
        let row = row?;
        let get = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .unwrap_or_default()
                .to_string()
        };
        writer.serialize(PropLine {
            league: get(league),
            player_name: get(name),
            stat: get(stat),
            prop_line: get(line),
            odds_type: get(odds),
        })?;
        count += 1;
    }

    if count == 0 {
        writer.write_record(["League", "PlayerName", "Stat", "PropLine", "Type"])?;
    }
    writer.flush()?;
    Ok(count)
}
