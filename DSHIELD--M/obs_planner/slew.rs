use std::collections::HashMap;

use planit::Tick;
use serde::{Deserialize, Serialize};

use crate::command::Angle;

/// Ticks an observation occupies before a slew may start, plus the tick the next
/// command needs after the slew ends.
pub const REQUIRED_GAP: Tick = 3;

/// One input row of the slew table; `time` is in (fractional) ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlewRow {
    /// Starting angle.
    pub from: Angle,
    /// Target angle.
    pub to: Angle,
    /// Slew duration.
    pub time: f64,
    /// Energy spent.
    pub energy: f64,
}

/// Slew cost with the duration rounded up to whole ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlewCost {
    /// Whole ticks.
    pub time: Tick,
    /// Energy spent.
    pub energy: f64,
}

/// `(from, to)` -> slew cost lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlewTable {
    costs: HashMap<(Angle, Angle), SlewCost>,
    max_time: Tick,
}

impl SlewTable {
    /// Builds the table, rounding every duration up to whole ticks.
    pub fn new(rows: impl IntoIterator<Item = SlewRow>) -> Self {
        let mut table = Self::default();
        for row in rows {
            // durations are small non-negative tick counts
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let time = row.time.max(0.0).ceil() as Tick;
            table.max_time = table.max_time.max(time);
            table.costs.insert(
                (row.from, row.to),
                SlewCost {
                    time,
                    energy: row.energy,
                },
            );
        }
        table
    }

    /// Cost of slewing `from` -> `to`; zero for identical angles.
    #[must_use]
    pub fn cost(&self, from: Angle, to: Angle) -> Option<SlewCost> {
        if from == to {
            return Some(SlewCost {
                time: 0,
                energy: 0.0,
            });
        }
        self.costs.get(&(from, to)).copied()
    }

    /// Longest slew in the table.
    #[must_use]
    pub const fn max_time(&self) -> Tick {
        self.max_time
    }

    /// First tick a command at `to` may start after a command at `from` started at
    /// `tick`; `tick + REQUIRED_GAP + slew`.
    #[must_use]
    pub fn earliest_start(&self, tick: Tick, from: Angle, to: Angle) -> Option<Tick> {
        if from == to {
            return Some(tick);
        }
        self.cost(from, to)
            .map(|cost| tick + REQUIRED_GAP + cost.time)
    }

    /// First ordered pair of distinct `angles` missing from the table.
    #[must_use]
    pub fn missing_pair(&self, angles: &[Angle]) -> Option<(Angle, Angle)> {
        angles.iter().find_map(|from| {
            angles
                .iter()
                .find(|to| from != *to && !self.costs.contains_key(&(*from, **to)))
                .map(|to| (*from, *to))
        })
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.costs.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SlewTable {
        SlewTable::new([
            SlewRow { from: 30, to: 10, time: 4.2, energy: 1.5 },
            SlewRow { from: 10, to: 30, time: 4.2, energy: 1.5 },
            SlewRow { from: 30, to: 50, time: 7.0, energy: 2.0 },
        ])
    }

    #[test]
    fn durations_round_up() {
        let table = table();
        assert_eq!(table.cost(30, 10).unwrap().time, 5);
        assert_eq!(table.cost(30, 50).unwrap().time, 7);
        assert_eq!(table.max_time(), 7);
        assert_eq!(table.cost(30, 30).unwrap().time, 0);
        assert!(table.cost(50, 30).is_none());
    }

    #[test]
    fn earliest_start_adds_required_gap() {
        let table = table();
        assert_eq!(table.earliest_start(100, 30, 10), Some(108));
        assert_eq!(table.earliest_start(100, 30, 30), Some(100));
        assert_eq!(table.earliest_start(100, 50, 10), None);
    }

    #[test]
    fn reports_missing_pairs() {
        let table = table();
        assert_eq!(table.missing_pair(&[10, 30]), None);
        assert_eq!(table.missing_pair(&[10, 30, 50]), Some((10, 50)));
    }
}
