// File-based run storage: one JSON line per saved segment time plus a JSON catalog

use std::{
    collections::BTreeSet,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::{debug, info};

use super::{
    RunStorage,
    types::{Catalog, RunRow},
};
use crate::{TimeTrialError, run::RunRecord};

const RUNS_FILE: &str = "runs.jsonl";
const CATALOG_FILE: &str = "catalog.json";

/// Stores runs under a directory as `runs.jsonl` and `catalog.json`
pub struct JsonLinesStorage {
    storage_path: PathBuf,
}

impl JsonLinesStorage {
    /// Create a storage rooted at `storage_path`, creating the directory if needed
    pub fn new(storage_path: PathBuf) -> Result<Self, TimeTrialError> {
        if !storage_path.exists() {
            fs::create_dir_all(&storage_path)
                .map_err(|e| TimeTrialError::StorageIOError { source: e })?;
        }
        Ok(Self { storage_path })
    }

    /// Create storage in the default application data directory
    pub fn new_default() -> Result<Self, TimeTrialError> {
        Self::new(Self::default_storage_path()?)
    }

    pub fn default_storage_path() -> Result<PathBuf, TimeTrialError> {
        let data_dir = dirs::data_dir().ok_or(TimeTrialError::NoDataDir)?;
        Ok(data_dir.join("timetrial"))
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn runs_path(&self) -> PathBuf {
        self.storage_path.join(RUNS_FILE)
    }

    fn catalog_path(&self) -> PathBuf {
        self.storage_path.join(CATALOG_FILE)
    }

    /// Every saved row for `game`, oldest first
    pub fn runs(&self, game: &str) -> Result<Vec<RunRow>, TimeTrialError> {
        let path = self.runs_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let rows = serde_jsonlines::json_lines::<RunRow, _>(&path)
            .map_err(|e| TimeTrialError::StorageIOError { source: e })?
            .collect::<Result<Vec<RunRow>, io::Error>>()
            .map_err(|e| TimeTrialError::StorageIOError { source: e })?;
        Ok(rows.into_iter().filter(|row| row.game == game).collect())
    }

    pub fn catalog(&self) -> Result<Catalog, TimeTrialError> {
        let path = self.catalog_path();
        if !path.exists() {
            return Ok(Catalog::default());
        }
        let content =
            fs::read_to_string(&path).map_err(|e| TimeTrialError::StorageIOError { source: e })?;
        serde_json::from_str(&content)
            .map_err(|e| TimeTrialError::StorageSerializeError { source: e })
    }

    /// Replace the catalog through a temporary file so readers never see a partial write
    fn write_catalog(&self, catalog: &Catalog) -> Result<(), TimeTrialError> {
        let path = self.catalog_path();
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(catalog)
            .map_err(|e| TimeTrialError::StorageSerializeError { source: e })?;
        {
            let mut temp_file = fs::File::create(&temp_path)
                .map_err(|e| TimeTrialError::StorageIOError { source: e })?;
            temp_file
                .write_all(content.as_bytes())
                .map_err(|e| TimeTrialError::StorageIOError { source: e })?;
            temp_file
                .sync_all()
                .map_err(|e| TimeTrialError::StorageIOError { source: e })?;
        }
        fs::rename(&temp_path, &path).map_err(|e| TimeTrialError::StorageIOError { source: e })
    }
}

impl RunStorage for JsonLinesStorage {
    fn save_run(&mut self, game: &str, record: &RunRecord) -> Result<(), TimeTrialError> {
        let mut catalog = self.catalog()?;
        catalog.upsert(game, record);
        self.write_catalog(&catalog)?;

        let rows = RunRow::from_record(game, record);
        if !rows.is_empty() {
            serde_jsonlines::append_json_lines(self.runs_path(), &rows)
                .map_err(|e| TimeTrialError::StorageIOError { source: e })?;
        }
        info!(
            "{}: saved {} time(s) for '{}' on '{}'",
            game,
            rows.len(),
            record.car_name,
            record.track_name
        );
        Ok(())
    }

    fn saved_tracks(&self, game: &str) -> Result<Vec<String>, TimeTrialError> {
        let catalog = self.catalog()?;
        Ok(catalog
            .games
            .get(game)
            .map(|entry| entry.tracks.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn saved_track_conditions(&self, game: &str) -> Result<Vec<String>, TimeTrialError> {
        Ok(self
            .runs(game)?
            .into_iter()
            .map(|row| row.track_conditions)
            .filter(|conditions| !conditions.is_empty())
            .sorted()
            .dedup()
            .collect())
    }

    fn saved_cars(&self, game: &str) -> Result<Vec<(String, String)>, TimeTrialError> {
        let catalog = self.catalog()?;
        Ok(catalog
            .games
            .get(game)
            .map(|entry| entry.cars.clone().into_iter().collect())
            .unwrap_or_default())
    }

    fn saved_car_classes(&self, game: &str) -> Result<Vec<String>, TimeTrialError> {
        Ok(self
            .saved_cars(game)?
            .into_iter()
            .map(|(_, class)| class)
            .filter(|class| !class.is_empty())
            .sorted()
            .dedup()
            .collect())
    }

    fn saved_tags(&self, game: &str) -> Result<Vec<String>, TimeTrialError> {
        let mut tags: BTreeSet<String> = self.catalog()?.tags;
        tags.extend(self.runs(game)?.into_iter().flat_map(|row| row.tags));
        debug!("{}: {} known tag(s)", game, tags.len());
        Ok(tags.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(car: &str, class: &str, track: &str, times: &[f32]) -> RunRecord {
        RunRecord {
            segment_times: times.to_vec(),
            car_name: car.to_string(),
            car_class: class.to_string(),
            track_name: track.to_string(),
            ..Default::default()
        }
    }

    fn storage() -> (TempDir, JsonLinesStorage) {
        let dir = TempDir::new().unwrap();
        let storage = JsonLinesStorage::new(dir.path().join("runs")).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_new_creates_directory() {
        let (dir, storage) = storage();
        assert!(dir.path().join("runs").is_dir());
        assert_eq!(storage.storage_path(), dir.path().join("runs"));
    }

    #[test]
    fn test_empty_storage_queries() {
        let (_dir, storage) = storage();
        assert!(storage.saved_tracks("DirtRally2").unwrap().is_empty());
        assert!(storage.saved_track_conditions("DirtRally2").unwrap().is_empty());
        assert!(storage.saved_cars("DirtRally2").unwrap().is_empty());
        assert!(storage.saved_tags("DirtRally2").unwrap().is_empty());
        assert!(storage.runs("DirtRally2").unwrap().is_empty());
    }

    #[test]
    fn test_one_row_per_segment() {
        let (_dir, mut storage) = storage();
        storage
            .save_run("DirtRally2", &record("Ford Fiesta R5", "R5", "Spain, Comienzo", &[101.5, 99.8, 100.2]))
            .unwrap();

        let rows = storage.runs("DirtRally2").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|row| row.runtime_seconds).collect::<Vec<_>>(),
            vec![101.5, 99.8, 100.2]
        );
        assert!(rows.iter().all(|row| row.car == "Ford Fiesta R5"));
    }

    #[test]
    fn test_distinct_dimension_queries() {
        let (_dir, mut storage) = storage();
        let mut wet = record("Ford Fiesta R5", "R5", "Spain, Comienzo", &[100.]);
        wet.track_conditions = "Wet".to_string();
        storage.save_run("DirtRally2", &wet).unwrap();
        storage.save_run("DirtRally2", &wet).unwrap();
        storage
            .save_run("DirtRally2", &record("Lancia Stratos", "H3 (RWD)", "Wales, Pant Mawr", &[90.]))
            .unwrap();

        assert_eq!(
            storage.saved_tracks("DirtRally2").unwrap(),
            vec!["Spain, Comienzo".to_string(), "Wales, Pant Mawr".to_string()]
        );
        assert_eq!(storage.saved_track_conditions("DirtRally2").unwrap(), vec!["Wet".to_string()]);
        assert_eq!(
            storage.saved_cars("DirtRally2").unwrap(),
            vec![
                ("Ford Fiesta R5".to_string(), "R5".to_string()),
                ("Lancia Stratos".to_string(), "H3 (RWD)".to_string()),
            ]
        );
        assert_eq!(
            storage.saved_car_classes("DirtRally2").unwrap(),
            vec!["H3 (RWD)".to_string(), "R5".to_string()]
        );
    }

    #[test]
    fn test_games_are_kept_apart() {
        let (_dir, mut storage) = storage();
        storage.save_run("DirtRally2", &record("A", "X", "T1", &[1.])).unwrap();
        storage.save_run("OtherGame", &record("B", "Y", "T2", &[2.])).unwrap();

        assert_eq!(storage.saved_tracks("DirtRally2").unwrap(), vec!["T1".to_string()]);
        assert_eq!(storage.runs("OtherGame").unwrap().len(), 1);
    }

    #[test]
    fn test_tags_are_normalized_and_shared() {
        let (_dir, mut storage) = storage();
        let mut tagged = record("A", "X", "T1", &[1.]);
        tagged.tags = BTreeSet::from(["  Club ".to_string(), "NIGHT".to_string()]);
        storage.save_run("OtherGame", &tagged).unwrap();

        let rows = storage.runs("OtherGame").unwrap();
        assert_eq!(rows[0].tags, vec!["club".to_string(), "night".to_string()]);

        // every known tag is offered, even ones only used by another game
        assert_eq!(
            storage.saved_tags("DirtRally2").unwrap(),
            vec!["club".to_string(), "night".to_string()]
        );
    }

    #[test]
    fn test_empty_segments_write_no_rows() {
        let (_dir, mut storage) = storage();
        storage.save_run("DirtRally2", &record("A", "X", "T1", &[])).unwrap();
        assert!(storage.runs("DirtRally2").unwrap().is_empty());
        assert_eq!(storage.saved_tracks("DirtRally2").unwrap(), vec!["T1".to_string()]);
    }

    #[test]
    fn test_storage_survives_reopen() {
        let (dir, mut storage) = storage();
        storage.save_run("DirtRally2", &record("A", "X", "T1", &[5.])).unwrap();
        drop(storage);

        let reopened = JsonLinesStorage::new(dir.path().join("runs")).unwrap();
        assert_eq!(reopened.runs("DirtRally2").unwrap().len(), 1);
        assert!(!dir.path().join("runs").join("catalog.json.tmp").exists());
    }
}
