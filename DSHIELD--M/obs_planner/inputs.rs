use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use planit::{GroundPointId, SatelliteId, Tick};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    command::{Angle, CommandCatalog, CommandError},
    ground::{
        error_table::{ErrorRow, ErrorTable, ErrorTables},
        GroundPoint, GroundRegistry, FALLBACK_CATEGORY,
    },
    slew::{SlewRow, SlewTable},
};

/// Fatal problems with planner inputs, raised before search starts.
#[derive(Debug, Error)]
pub enum InputError {
    /// The scenario file could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The scenario is not valid JSON for the expected layout.
    #[error("parsing {origin}: {source}")]
    Malformed {
        /// File path or `<inline>`.
        origin: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// An event references a ground point missing from `ground_points`.
    #[error("satellite {satellite} tick {tick} references unknown ground point {ground_point}")]
    UnknownGroundPoint {
        /// Satellite of the event.
        satellite: SatelliteId,
        /// Tick of the event.
        tick: Tick,
        /// Missing ground point.
        ground_point: GroundPointId,
    },
    /// A command label failed to parse.
    #[error("satellite {satellite} tick {tick}: {source}")]
    InvalidCommand {
        /// Satellite of the event.
        satellite: SatelliteId,
        /// Tick of the event.
        tick: Tick,
        /// Parse failure.
        #[source]
        source: CommandError,
    },
    /// Two pointing angles in use have no slew entry.
    #[error("slew table has no entry {from} -> {to}")]
    MissingSlewPair {
        /// Starting angle.
        from: Angle,
        /// Target angle.
        to: Angle,
    },
    /// No error table for a required category.
    #[error("no measurement error table for category {0}")]
    MissingErrorTable(u8),
    /// Nothing to plan.
    #[error("scenario has no {0}")]
    EmptyScenario(&'static str),
}

/// Candidate commands of one satellite at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    /// Tick of the decision.
    pub tick: Tick,
    /// Command label -> ground points it would observe.
    pub choices: IndexMap<String, Vec<GroundPointId>>,
}

/// Preprocessed planning inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Ground points of the horizon.
    #[serde(default)]
    pub ground_points: Vec<GroundPoint>,
    /// Access events by satellite.
    #[serde(default)]
    pub events: BTreeMap<SatelliteId, Vec<AccessEvent>>,
    /// Slew durations and energies.
    #[serde(default)]
    pub slew_table: Vec<SlewRow>,
    /// Measurement error rows by biome category.
    #[serde(default)]
    pub error_tables: BTreeMap<u8, Vec<ErrorRow>>,
    /// Ground points already observed in earlier horizons.
    #[serde(default)]
    pub prior_observations: Vec<GroundPointId>,
}

/// Validated lookup structures derived from a [`Scenario`].
#[derive(Debug, Clone)]
pub struct PreparedInputs {
    /// Ground points with access ticks merged from the events.
    pub ground: GroundRegistry,
    /// Every command label of the scenario.
    pub catalog: CommandCatalog,
    /// Slew lookup.
    pub slew: SlewTable,
    /// Error tables by category.
    pub tables: ErrorTables,
}

impl Scenario {
    /// Reads a JSON scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, &path.display().to_string())
    }

    /// Parses scenario JSON; `origin` names the source in errors.
    pub fn parse(raw: &str, origin: &str) -> Result<Self, InputError> {
        serde_json::from_str(raw).map_err(|source| InputError::Malformed {
            origin: origin.to_string(),
            source,
        })
    }

    /// Number of access events across satellites.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    /// Validates the scenario and builds its lookup structures.
    ///
    /// Every referenced ground point must exist, every label must parse, every pair
    /// of distinct pointing angles in use must have a slew entry and the fallback
    /// error category must be present.
    pub fn prepare(&self) -> Result<PreparedInputs, InputError> {
        if self.ground_points.is_empty() {
            return Err(InputError::EmptyScenario("ground points"));
        }
        if self.event_count() == 0 {
            return Err(InputError::EmptyScenario("access events"));
        }
        let mut ground = GroundRegistry::new(self.ground_points.iter().cloned());
        let mut catalog = CommandCatalog::default();
        for (satellite, events) in &self.events {
            for event in events {
                for (label, ground_points) in &event.choices {
                    catalog
                        .register(label)
                        .map_err(|source| InputError::InvalidCommand {
                            satellite: *satellite,
                            tick: event.tick,
                            source,
                        })?;
                    for &ground_point in ground_points {
                        if !ground.contains(ground_point) {
                            return Err(InputError::UnknownGroundPoint {
                                satellite: *satellite,
                                tick: event.tick,
                                ground_point,
                            });
                        }
                        ground.add_access(ground_point, event.tick);
                    }
                }
            }
        }

        let slew = SlewTable::new(self.slew_table.iter().copied());
        if let Some((from, to)) = slew.missing_pair(&catalog.angles()) {
            return Err(InputError::MissingSlewPair { from, to });
        }

        let tables = ErrorTables::new(
            self.error_tables
                .iter()
                .filter(|(_, rows)| !rows.is_empty())
                .map(|(category, rows)| (*category, ErrorTable::new(rows.iter().copied())))
                .collect(),
        );
        if tables.category(FALLBACK_CATEGORY).is_none() {
            return Err(InputError::MissingErrorTable(FALLBACK_CATEGORY));
        }

        Ok(PreparedInputs {
            ground,
            catalog,
            slew,
            tables,
        })
    }

    /// Distinct ground points referenced by any event.
    #[must_use]
    pub fn referenced_ground_points(&self) -> BTreeSet<GroundPointId> {
        self.events
            .values()
            .flatten()
            .flat_map(|event| event.choices.values().flatten().copied())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Two ground points, one satellite, angles 10 and 30.
    pub(crate) const SCENARIO: &str = r#"{
        "ground_points": [
            {"id": 1, "biome": 1, "model_error": [0.05, 0.05], "access_ticks": [10]},
            {"id": 2, "biome": 16, "model_error": [0.05, 0.05]}
        ],
        "events": {
            "1": [
                {"tick": 10, "choices": {"L.30": [1], "L.10": [1, 2]}},
                {"tick": 20, "choices": {"L.30": [1]}}
            ]
        },
        "slew_table": [
            {"from": 30, "to": 10, "time": 4.5, "energy": 1.0},
            {"from": 10, "to": 30, "time": 4.5, "energy": 1.0}
        ],
        "error_tables": {
            "1": [{"l_code": 1, "p_code": 0, "error": 0.01}],
            "5": [{"l_code": 1, "p_code": 0, "error": 0.02}]
        },
        "prior_observations": [2]
    }"#;
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn loads_and_prepares_a_scenario_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scenario.json");
        fs::write(&path, fixtures::SCENARIO).unwrap();
        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.event_count(), 2);
        assert_eq!(scenario.prior_observations, vec![2]);
        assert_eq!(
            scenario.events[&1][0].choices.keys().collect::<Vec<_>>(),
            vec!["L.30", "L.10"]
        );

        let prepared = scenario.prepare().unwrap();
        assert_eq!(prepared.ground.access_ticks(1).collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(prepared.catalog.angles(), vec![10, 30]);
        assert_eq!(prepared.slew.cost(30, 10).unwrap().time, 5);
    }

    #[test]
    fn missing_file_and_bad_json_are_reported() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Scenario::load(dir.path().join("absent.json")),
            Err(InputError::Io { .. })
        ));
        assert!(matches!(
            Scenario::parse("{\"events\": 3}", "<inline>"),
            Err(InputError::Malformed { .. })
        ));
    }

    #[test]
    fn validation_rejects_inconsistent_inputs() {
        let base = Scenario::parse(fixtures::SCENARIO, "<inline>").unwrap();

        let mut unknown_point = base.clone();
        unknown_point.events.get_mut(&1).unwrap()[1]
            .choices
            .insert("L.30".into(), vec![7]);
        assert!(matches!(
            unknown_point.prepare(),
            Err(InputError::UnknownGroundPoint { ground_point: 7, .. })
        ));

        let mut bad_label = base.clone();
        bad_label.events.get_mut(&1).unwrap()[1]
            .choices
            .insert("X.30".into(), vec![1]);
        assert!(matches!(
            bad_label.prepare(),
            Err(InputError::InvalidCommand { tick: 20, .. })
        ));

        let mut no_slew = base.clone();
        no_slew.slew_table.pop();
        assert!(matches!(
            no_slew.prepare(),
            Err(InputError::MissingSlewPair { from: 10, to: 30 })
        ));

        let mut no_fallback = base.clone();
        no_fallback.error_tables.remove(&5);
        assert!(matches!(
            no_fallback.prepare(),
            Err(InputError::MissingErrorTable(5))
        ));

        let empty = Scenario::default();
        assert!(matches!(
            empty.prepare(),
            Err(InputError::EmptyScenario(_))
        ));
    }
}
