use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pointing angle in degrees, as used in command labels and the slew table.
pub type Angle = i32;

/// Failure to parse a command label.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Label with no content.
    #[error("empty command label")]
    Empty,
    /// Neither `<payload>.<angle>` nor `<payload>.<angle>.<payload>.<angle>`.
    #[error("command `{0}` must have 2 or 4 dot-separated parts")]
    Arity(String),
    /// Payload other than `L` or `P`.
    #[error("unknown payload `{payload}` in command `{label}`")]
    UnknownPayload {
        /// Full label.
        label: String,
        /// Offending payload.
        payload: String,
    },
    /// Angle that is not an integer.
    #[error("invalid angle `{angle}` in command `{label}`")]
    BadAngle {
        /// Full label.
        label: String,
        /// Offending angle text.
        angle: String,
    },
    /// Dual observation using the same payload twice.
    #[error("command `{0}` uses the same payload twice")]
    DuplicatePayload(String),
}

/// Instrument of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Payload {
    /// L-band radar.
    #[serde(rename = "L")]
    LBand,
    /// P-band radar.
    #[serde(rename = "P")]
    PBand,
}

impl Payload {
    /// Single-letter label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::LBand => "L",
            Self::PBand => "P",
        }
    }
}

/// Error-table code of a pointing angle; 0 outside the tabulated bands.
#[must_use]
pub const fn error_code(angle: Angle) -> u8 {
    match angle {
        28..=35 => 1,
        22..=27 | 36..=41 => 2,
        14..=21 | 42..=49 => 3,
        _ => 0,
    }
}

/// One payload pointed at one angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    /// Instrument.
    pub payload: Payload,
    /// Pointing angle.
    pub angle: Angle,
}

impl Observation {
    /// Error-table code of the angle.
    #[must_use]
    pub const fn error_code(self) -> u8 {
        error_code(self.angle)
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.payload.label(), self.angle)
    }
}

/// Parsed command label: one observation, or two simultaneous ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    primary: Observation,
    secondary: Option<Observation>,
}

impl Command {
    /// Parses `L.33` or `L.33.P.33`.
    pub fn parse(label: &str) -> Result<Self, CommandError> {
        let label = label.trim().trim_matches('\'');
        if label.is_empty() {
            return Err(CommandError::Empty);
        }
        let parts: Vec<&str> = label.split('.').collect();
        let observation = |payload: &str, angle: &str| -> Result<Observation, CommandError> {
            let payload = match payload {
                "L" => Payload::LBand,
                "P" => Payload::PBand,
                other => {
                    return Err(CommandError::UnknownPayload {
                        label: label.to_string(),
                        payload: other.to_string(),
                    })
                }
            };
            let angle = angle.parse().map_err(|_| CommandError::BadAngle {
                label: label.to_string(),
                angle: angle.to_string(),
            })?;
            Ok(Observation { payload, angle })
        };
        match parts.as_slice() {
            [payload, angle] => Ok(Self {
                primary: observation(payload, angle)?,
                secondary: None,
            }),
            [p1, a1, p2, a2] => {
                let primary = observation(p1, a1)?;
                let secondary = observation(p2, a2)?;
                if primary.payload == secondary.payload {
                    return Err(CommandError::DuplicatePayload(label.to_string()));
                }
                Ok(Self {
                    primary,
                    secondary: Some(secondary),
                })
            }
            _ => Err(CommandError::Arity(label.to_string())),
        }
    }

    /// First observation.
    #[must_use]
    pub const fn primary(&self) -> Observation {
        self.primary
    }

    /// Second simultaneous observation, if any.
    #[must_use]
    pub const fn secondary(&self) -> Option<Observation> {
        self.secondary
    }

    /// Angle the satellite points at; the first observation's angle.
    #[must_use]
    pub const fn pointing_angle(&self) -> Angle {
        self.primary.angle
    }

    /// 1 or 2.
    #[must_use]
    pub const fn observation_count(&self) -> usize {
        if self.secondary.is_some() {
            2
        } else {
            1
        }
    }

    /// Error-table row `(l_code, p_code)`; an absent payload contributes 0.
    #[must_use]
    pub fn error_row(&self) -> (u8, u8) {
        let mut row = (0, 0);
        for obs in std::iter::once(self.primary).chain(self.secondary) {
            match obs.payload {
                Payload::LBand => row.0 = obs.error_code(),
                Payload::PBand => row.1 = obs.error_code(),
            }
        }
        row
    }

    /// Candidate class used by ranked-choice voting: payloads with error codes.
    #[must_use]
    pub fn error_class(&self) -> String {
        let mut class = format!("{}.{}", self.primary.payload.label(), self.primary.error_code());
        if let Some(second) = self.secondary {
            class.push_str(&format!(".{}.{}", second.payload.label(), second.error_code()));
        }
        class
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if let Some(second) = self.secondary {
            write!(f, ".{second}")?;
        }
        Ok(())
    }
}

/// Every command label of a scenario, parsed once.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    commands: HashMap<String, Command>,
}

impl CommandCatalog {
    /// Parses and stores `label`; repeated labels are parsed once.
    pub fn register(&mut self, label: &str) -> Result<Command, CommandError> {
        if let Some(command) = self.commands.get(label) {
            return Ok(*command);
        }
        let command = Command::parse(label)?;
        self.commands.insert(label.to_string(), command);
        Ok(command)
    }

    /// Looks up a registered label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Command> {
        self.commands.get(label)
    }

    /// Distinct pointing angles of all registered commands.
    #[must_use]
    pub fn angles(&self) -> Vec<Angle> {
        let mut angles: Vec<Angle> = self
            .commands
            .values()
            .map(Command::pointing_angle)
            .collect();
        angles.sort_unstable();
        angles.dedup();
        angles
    }

    /// Number of distinct labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_dual_labels() {
        let single: Command = "L.33".parse().unwrap();
        assert_eq!(single.pointing_angle(), 33);
        assert_eq!(single.observation_count(), 1);
        assert_eq!(single.error_row(), (1, 0));
        assert_eq!(single.to_string(), "L.33");

        let dual = Command::parse("L.24.P.44").unwrap();
        assert_eq!(dual.pointing_angle(), 24);
        assert_eq!(dual.observation_count(), 2);
        assert_eq!(dual.error_row(), (2, 3));
        assert_eq!(dual.error_class(), "L.2.P.3");

        let p_only = Command::parse("P.50").unwrap();
        assert_eq!(p_only.error_row(), (0, 0));
    }

    #[test]
    fn rejects_malformed_labels() {
        assert_eq!(Command::parse(""), Err(CommandError::Empty));
        assert!(matches!(Command::parse("L.33.P"), Err(CommandError::Arity(_))));
        assert!(matches!(
            Command::parse("X.33"),
            Err(CommandError::UnknownPayload { .. })
        ));
        assert!(matches!(
            Command::parse("L.abc"),
            Err(CommandError::BadAngle { .. })
        ));
        assert!(matches!(
            Command::parse("L.30.L.31"),
            Err(CommandError::DuplicatePayload(_))
        ));
    }

    #[test]
    fn error_code_bands() {
        let codes: Vec<u8> = [13, 14, 21, 22, 27, 28, 35, 36, 41, 42, 49, 50]
            .into_iter()
            .map(error_code)
            .collect();
        assert_eq!(codes, vec![0, 3, 3, 2, 2, 1, 1, 2, 2, 3, 3, 0]);
    }

    #[test]
    fn catalog_collects_distinct_angles() {
        let mut catalog = CommandCatalog::default();
        for label in ["L.30", "P.30", "L.10.P.40", "L.30"] {
            catalog.register(label).unwrap();
        }
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.angles(), vec![10, 30]);
    }
}
