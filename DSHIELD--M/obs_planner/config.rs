use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use planit::{SatelliteId, SearchConfig, Tick};
use serde::Deserialize;
use shared_logging::LogLevel;

use crate::heuristics::ValueRanking;

/// Node ranking strategy with its node beam width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Newest node first, one node per iteration.
    DepthFirst,
    /// Highest plan reward first, `width` nodes per iteration.
    Beam {
        /// Node beam width.
        width: usize,
    },
}

impl Strategy {
    /// Nodes expanded per iteration.
    #[must_use]
    pub const fn node_beam_width(self) -> usize {
        match self {
            Self::DepthFirst => 1,
            Self::Beam { width } => width,
        }
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    /// Accepts `dfs`, `beam` (width 1) and `beam.N`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once('.') {
            None if s == "dfs" => Ok(Self::DepthFirst),
            None if s == "beam" => Ok(Self::Beam { width: 1 }),
            Some(("beam", width)) => {
                let width: usize = width
                    .parse()
                    .with_context(|| format!("invalid beam width in strategy `{s}`"))?;
                if width == 0 {
                    bail!("beam width must be positive in strategy `{s}`");
                }
                Ok(Self::Beam { width })
            }
            _ => bail!("unknown strategy `{s}` (expected dfs, beam or beam.N)"),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DepthFirst => f.write_str("dfs"),
            Self::Beam { width } => write!(f, "beam.{width}"),
        }
    }
}

/// Planner settings after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    /// Satellites to plan.
    pub satellites: Vec<SatelliteId>,
    /// First tick of the horizon.
    pub horizon_start: Tick,
    /// Last tick of the horizon (inclusive).
    pub horizon_end: Tick,
    /// Node ranking strategy.
    pub strategy: Strategy,
    /// Choices branched per expansion; `None` = all.
    pub choice_beam_width: Option<usize>,
    /// Value-ranking heuristic.
    pub value_ranking: ValueRanking,
    /// Events after this tick are ignored.
    pub max_tick: Option<Tick>,
    /// Wall-clock limit of the search.
    pub time_limit: Option<Duration>,
    /// Expansion budget of the search.
    pub max_expansions: Option<usize>,
    /// Whether nodes keep their own plan traces.
    pub store_plan_traces: bool,
}

impl PlannerSettings {
    /// Engine configuration.
    #[must_use]
    pub const fn search_config(&self) -> SearchConfig {
        SearchConfig {
            node_beam_width: self.strategy.node_beam_width(),
            choice_beam_width: self.choice_beam_width,
            time_limit: self.time_limit,
            max_expansions: self.max_expansions,
            store_plan_traces: self.store_plan_traces,
        }
    }

    /// Whether `tick` is inside the horizon and not past `max_tick`.
    #[must_use]
    pub fn in_horizon(&self, tick: Tick) -> bool {
        (self.horizon_start..=self.horizon_end).contains(&tick)
            && self.max_tick.map_or(true, |max| tick <= max)
    }
}

/// Telemetry sinks; relative paths are resolved against the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    /// JSON-lines log file.
    pub log_path: Option<PathBuf>,
    /// JSON-lines event file.
    pub event_log: Option<PathBuf>,
    /// Severity floor of the log file.
    pub min_level: LogLevel,
}

/// Planner configuration document.
#[derive(Debug, Clone)]
pub struct PlannerDocument {
    /// Schema version (currently informational).
    pub version: u32,
    /// Search and horizon settings.
    pub planner: PlannerSettings,
    /// Scenario JSON file.
    pub scenario: PathBuf,
    /// Telemetry sinks.
    pub telemetry: TelemetrySettings,
}

impl PlannerDocument {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading planner config {}", path.display()))?;
        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&raw, source_dir).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses TOML text; relative paths resolve against `source_dir`.
    pub fn parse(raw: &str, source_dir: impl Into<PathBuf>) -> Result<Self> {
        let source_dir = source_dir.into();
        let document: DocumentSerde = toml::from_str(raw)?;
        let planner = document.planner;
        if planner.satellites.is_empty() {
            bail!("planner.satellites must not be empty");
        }
        if planner.horizon_start > planner.horizon_end {
            bail!(
                "invalid horizon: start {} > end {}",
                planner.horizon_start,
                planner.horizon_end
            );
        }
        let strategy: Strategy = planner.strategy.parse()?;
        let value_ranking: ValueRanking = planner.value_ranking.parse()?;
        let time_limit = match planner.time_limit_secs {
            Some(secs) if !(secs.is_finite() && secs > 0.0) => {
                bail!("planner.time_limit_secs must be positive, got {secs}")
            }
            Some(secs) => Some(Duration::from_secs_f64(secs)),
            None => None,
        };
        let min_level: LogLevel = document.telemetry.min_level.parse()?;
        let resolve = |candidate: PathBuf| {
            if candidate.is_relative() {
                source_dir.join(candidate)
            } else {
                candidate
            }
        };
        Ok(Self {
            version: document.version,
            planner: PlannerSettings {
                satellites: planner.satellites,
                horizon_start: planner.horizon_start,
                horizon_end: planner.horizon_end,
                strategy,
                choice_beam_width: (planner.choice_beam_width > 0)
                    .then_some(planner.choice_beam_width),
                value_ranking,
                max_tick: planner.max_tick,
                time_limit,
                max_expansions: planner.max_expansions,
                store_plan_traces: planner.store_plan_traces,
            },
            scenario: resolve(document.inputs.scenario),
            telemetry: TelemetrySettings {
                log_path: document.telemetry.log_path.map(resolve),
                event_log: document.telemetry.event_log.map(resolve),
                min_level,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct DocumentSerde {
    #[serde(default)]
    version: u32,
    planner: PlannerSerde,
    inputs: InputsSerde,
    #[serde(default)]
    telemetry: TelemetrySerde,
}

#[derive(Debug, Deserialize)]
struct PlannerSerde {
    satellites: Vec<SatelliteId>,
    #[serde(default)]
    horizon_start: Tick,
    #[serde(default = "default_horizon_end")]
    horizon_end: Tick,
    #[serde(default = "default_strategy")]
    strategy: String,
    #[serde(default = "default_choice_beam_width")]
    choice_beam_width: usize,
    #[serde(default = "default_value_ranking")]
    value_ranking: String,
    #[serde(default)]
    max_tick: Option<Tick>,
    #[serde(default)]
    time_limit_secs: Option<f64>,
    #[serde(default)]
    max_expansions: Option<usize>,
    #[serde(default = "default_true")]
    store_plan_traces: bool,
}

#[derive(Debug, Deserialize)]
struct InputsSerde {
    scenario: PathBuf,
}

#[derive(Debug, Deserialize)]
struct TelemetrySerde {
    #[serde(default)]
    log_path: Option<PathBuf>,
    #[serde(default)]
    event_log: Option<PathBuf>,
    #[serde(default = "default_min_level")]
    min_level: String,
}

impl Default for TelemetrySerde {
    fn default() -> Self {
        Self {
            log_path: None,
            event_log: None,
            min_level: default_min_level(),
        }
    }
}

const fn default_horizon_end() -> Tick {
    6 * 60 * 60 - 1
}

fn default_strategy() -> String {
    "beam".into()
}

const fn default_choice_beam_width() -> usize {
    1
}

fn default_value_ranking() -> String {
    "max-error-reduction".into()
}

const fn default_true() -> bool {
    true
}

fn default_min_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    const DOCUMENT: &str = r#"
        version = 1
        [planner]
        satellites = [1, 2, 3]
        horizon_start = 0
        horizon_end = 21599
        strategy = "beam.3"
        choice_beam_width = 0
        value_ranking = "ranked-choice-voting"
        max_tick = 12000
        time_limit_secs = 30.0
        store_plan_traces = false
        [inputs]
        scenario = "scenario.json"
        [telemetry]
        log_path = "logs/planner.log"
        min_level = "debug"
    "#;

    #[test]
    fn loads_document_and_resolves_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("planner.toml");
        fs::write(&path, DOCUMENT).unwrap();
        let document = PlannerDocument::load(&path).unwrap();
        assert_eq!(document.version, 1);
        assert_eq!(document.scenario, dir.path().join("scenario.json"));
        assert_eq!(
            document.telemetry.log_path,
            Some(dir.path().join("logs/planner.log"))
        );
        assert_eq!(document.telemetry.min_level, LogLevel::Debug);

        let planner = &document.planner;
        assert_eq!(planner.strategy, Strategy::Beam { width: 3 });
        assert_eq!(planner.value_ranking, ValueRanking::RankedChoiceVoting);
        assert!(planner.in_horizon(12_000));
        assert!(!planner.in_horizon(12_001));
        let search = planner.search_config();
        assert_eq!(search.node_beam_width, 3);
        assert_eq!(search.choice_beam_width, None);
        assert_eq!(search.time_limit, Some(Duration::from_secs(30)));
        assert!(!search.store_plan_traces);
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let document = PlannerDocument::parse(
            "[planner]\nsatellites = [4]\n[inputs]\nscenario = \"/tmp/s.json\"\n",
            ".",
        )
        .unwrap();
        assert_eq!(document.scenario, PathBuf::from("/tmp/s.json"));
        assert_eq!(document.planner.strategy, Strategy::Beam { width: 1 });
        assert_eq!(document.planner.choice_beam_width, Some(1));
        assert_eq!(document.planner.horizon_end, 21_599);
        assert_eq!(document.telemetry.min_level, LogLevel::Info);
    }

    #[test]
    fn rejects_invalid_settings() {
        let with = |planner: &str| {
            PlannerDocument::parse(
                &format!("[planner]\n{planner}\n[inputs]\nscenario = \"s.json\"\n"),
                ".",
            )
        };
        assert!(with("satellites = []").is_err());
        assert!(with("satellites = [1]\nhorizon_start = 10\nhorizon_end = 5").is_err());
        assert!(with("satellites = [1]\nstrategy = \"beam.0\"").is_err());
        assert!(with("satellites = [1]\nstrategy = \"astar\"").is_err());
        assert!(with("satellites = [1]\ntime_limit_secs = 0.0").is_err());
        assert!(with("satellites = [1]\nvalue_ranking = \"random\"").is_err());
        assert!(with("satellites = [1]").is_ok());
    }

    #[test]
    fn strategy_round_trips_through_display() {
        for text in ["dfs", "beam.1", "beam.12"] {
            assert_eq!(text.parse::<Strategy>().unwrap().to_string(), text);
        }
        assert_eq!("beam".parse::<Strategy>().unwrap(), Strategy::Beam { width: 1 });
    }
}
