//! JSON inputs and outputs of the CLI.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use clap::ValueEnum;
use serde::Deserialize;
use velopix_core::{Event, Hit, ParamValue, ParameterSchema, ParameterSet, TruthTrack};
use velopix_optim::{Dimension, Objective, OptimizationResult, SearchSpace};

use crate::{CliError, Result};

/// One event as stored on disk.
#[derive(Debug, Deserialize)]
struct EventRecord {
    hits: Vec<Hit>,
    #[serde(default)]
    truth: Option<Vec<TruthTrack>>,
}

/// Search strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Exhaustive grid
    Grid,
    /// Seeded uniform sampling
    Random,
    /// Seeded coordinate hill climbing
    Local,
}

/// Optimization settings read from `--config`.
///
/// Dimensions are searched in name order.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Overrides applied to the schema defaults.
    #[serde(default)]
    pub base: BTreeMap<String, ParamValue>,
    /// Searched parameters.
    pub dimensions: BTreeMap<String, Dimension>,
    pub strategy: Option<StrategyKind>,
    pub budget: Option<usize>,
    pub patience: Option<usize>,
    pub seed: Option<u64>,
    pub objective: Option<Objective>,
}

impl SearchConfig {
    /// Builds the search space for `schema`, validating it.
    pub fn search_space(&self, schema: &ParameterSchema) -> Result<SearchSpace> {
        let base = with_overrides(schema, self.base.clone())?;
        let space = SearchSpace::new(base, self.dimensions.clone())?;
        space.validate_against(schema)?;
        Ok(space)
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| CliError::InvalidInput(format!("{}: {e}", path.display())))
}

/// Reads an array of events.
pub fn load_events(path: &Path) -> Result<Vec<Event>> {
    let records: Vec<EventRecord> = serde_json::from_reader(open(path)?)?;
    if records.is_empty() {
        return Err(CliError::InvalidInput(format!(
            "{}: no events",
            path.display()
        )));
    }
    records
        .into_iter()
        .map(|r| Event::new(r.hits, r.truth).map_err(CliError::from))
        .collect()
}

/// Schema defaults with `overrides` applied, validated.
pub fn with_overrides(
    schema: &ParameterSchema,
    overrides: impl IntoIterator<Item = (String, ParamValue)>,
) -> Result<ParameterSet> {
    let mut params = schema.defaults();
    for (name, value) in overrides {
        params.insert(name, value);
    }
    schema.validate(&params)?;
    Ok(params)
}

/// Reads a parameter override file (`{"name": value, ...}`).
pub fn load_params(path: &Path, schema: &ParameterSchema) -> Result<ParameterSet> {
    let overrides: BTreeMap<String, ParamValue> = serde_json::from_reader(open(path)?)?;
    with_overrides(schema, overrides)
}

/// Reads an optimization config.
pub fn load_search_config(path: &Path) -> Result<SearchConfig> {
    Ok(serde_json::from_reader(open(path)?)?)
}

/// Writes the optimization result as pretty JSON.
pub fn write_result(path: &Path, result: &OptimizationResult) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, result)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use velopix_algorithms::{Algorithm, ReconstructionAlgorithm};

    fn temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const EVENTS: &str = r#"[
        {
            "hits": [
                {"id": 1, "x": 0.0, "y": 0.0, "z": 0.0, "module": 0},
                {"id": 2, "x": 0.1, "y": 0.0, "z": 10.0, "module": 1},
                {"id": 3, "x": 0.2, "y": 0.0, "z": 20.0, "module": 2}
            ],
            "truth": [{"id": 0, "hits": [1, 2, 3]}]
        },
        {
            "hits": [{"id": 9, "x": 1.0, "y": 1.0, "z": 0.0, "module": 0}]
        }
    ]"#;

    #[test]
    fn test_load_events() {
        let file = temp_json(EVENTS);
        let events = load_events(file.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].has_truth());
        assert!(!events[1].has_truth());
        assert_eq!(events[0].num_layers(), 3);
    }

    #[test]
    fn test_invalid_event_reported() {
        let file = temp_json(
            r#"[{"hits": [
                {"id": 1, "x": 0.0, "y": 0.0, "z": 0.0, "module": 0},
                {"id": 1, "x": 0.5, "y": 0.0, "z": 10.0, "module": 1}
            ]}]"#,
        );
        assert!(matches!(
            load_events(file.path()),
            Err(CliError::Core(velopix_core::Error::InvalidEvent(_)))
        ));
        let empty = temp_json("[]");
        assert!(matches!(
            load_events(empty.path()),
            Err(CliError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_params_override_defaults() {
        let schema = Algorithm::TrackFollowing.schema();
        let file = temp_json(r#"{"max_tolerance": 0.25, "distance_metric": "manhattan"}"#);
        let params = load_params(file.path(), &schema).unwrap();
        assert_eq!(params.len(), schema.specs().len());
        assert_eq!(params.choice("distance_metric").unwrap(), "manhattan");

        let bad = temp_json(r#"{"max_tolerance": -1.0}"#);
        assert!(matches!(
            load_params(bad.path(), &schema),
            Err(CliError::Core(velopix_core::Error::InvalidParameter { .. }))
        ));
    }

    #[test]
    fn test_search_config() {
        let file = temp_json(
            r#"{
                "base": {"min_track_length": 4},
                "dimensions": {
                    "max_tolerance": {"float": {"min": 0.1, "max": 0.5, "steps": 3}},
                    "distance_metric": {"discrete": ["euclidean", "chebyshev"]}
                },
                "strategy": "local",
                "seed": 3,
                "objective": {"weighted": {"efficiency": 1.0, "ghost_rate": 0.5, "clone_rate": 0.5}}
            }"#,
        );
        let config = load_search_config(file.path()).unwrap();
        assert_eq!(config.strategy, Some(StrategyKind::Local));
        assert_eq!(config.objective, Some(Objective::weighted(1.0, 0.5, 0.5)));
        let space = config
            .search_space(&Algorithm::TrackFollowing.schema())
            .unwrap();
        assert_eq!(space.grid_size(), 6);
        assert_eq!(space.base().int("min_track_length").unwrap(), 4);

        let unknown = temp_json(r#"{"dimensions": {"speed": {"int": {"min": 0, "max": 1}}}}"#);
        let config = load_search_config(unknown.path()).unwrap();
        assert!(matches!(
            config.search_space(&Algorithm::TrackFollowing.schema()),
            Err(CliError::Optim(velopix_optim::Error::InvalidSearchSpace(_)))
        ));
    }

    #[test]
    fn test_write_result() {
        let out = NamedTempFile::new().unwrap();
        write_result(out.path(), &OptimizationResult::default()).unwrap();
        let value: serde_json::Value =
            serde_json::from_reader(File::open(out.path()).unwrap()).unwrap();
        assert!(value["history"].as_array().unwrap().is_empty());
        assert!(value["best"].is_null());
    }
}
