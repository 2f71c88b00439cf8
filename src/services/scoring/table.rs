//! Static action scoring tables keyed by scenario name.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::dao::models::TeamRole;

/// Scenario whose table is used when a scenario has no table of its own.
pub const FALLBACK_SCENARIO: &str = "Ransomware Incident Response";
/// Name of the introductory scenario shipped with the catalog.
pub const TUTORIAL_SCENARIO: &str = "Tutorial: Basic Security Incident";

/// Score given to an action absent from a table.
pub const UNKNOWN_ACTION_POINTS: i32 = 0;

type PhaseRows = &'static [(i32, TeamRole, &'static [(&'static str, i32)])];

const RANSOMWARE: PhaseRows = &[
    (
        0,
        TeamRole::Red,
        &[
            ("Establish persistence", 10),
            ("Cover tracks", 7),
            ("Escalate privileges", 4),
            ("Move laterally", 3),
            ("Exfiltrate data", 1),
        ],
    ),
    (
        0,
        TeamRole::Blue,
        &[
            ("Isolate host", 10),
            ("Collect forensic evidence", 8),
            ("Block IP address", 6),
            ("Deploy countermeasures", 5),
            ("Escalate to management", 4),
        ],
    ),
    (
        1,
        TeamRole::Red,
        &[
            ("Establish persistence", 10),
            ("Move laterally", 9),
            ("Escalate privileges", 7),
            ("Cover tracks", 6),
            ("Exfiltrate data", 2),
        ],
    ),
    (
        1,
        TeamRole::Blue,
        &[
            ("Block IP address", 10),
            ("Deploy countermeasures", 8),
            ("Collect forensic evidence", 7),
            ("Isolate host", 6),
            ("Escalate to management", 5),
        ],
    ),
    (
        2,
        TeamRole::Red,
        &[
            ("Escalate privileges", 10),
            ("Move laterally", 10),
            ("Cover tracks", 7),
            ("Establish persistence", 6),
            ("Exfiltrate data", 4),
        ],
    ),
    (
        2,
        TeamRole::Blue,
        &[
            ("Isolate host", 10),
            ("Deploy countermeasures", 9),
            ("Escalate to management", 8),
            ("Collect forensic evidence", 6),
            ("Block IP address", 5),
        ],
    ),
    (
        3,
        TeamRole::Red,
        &[
            ("Exfiltrate data", 10),
            ("Cover tracks", 8),
            ("Establish persistence", 7),
            ("Move laterally", 5),
            ("Escalate privileges", 4),
        ],
    ),
    (
        3,
        TeamRole::Blue,
        &[
            ("Block IP address", 10),
            ("Collect forensic evidence", 9),
            ("Escalate to management", 8),
            ("Deploy countermeasures", 6),
            ("Isolate host", 5),
        ],
    ),
    (
        4,
        TeamRole::Red,
        &[
            ("Move laterally", 10),
            ("Cover tracks", 9),
            ("Establish persistence", 8),
            ("Exfiltrate data", 6),
            ("Escalate privileges", 5),
        ],
    ),
    (
        4,
        TeamRole::Blue,
        &[
            ("Isolate host", 10),
            ("Deploy countermeasures", 9),
            ("Escalate to management", 8),
            ("Collect forensic evidence", 6),
            ("Block IP address", 4),
        ],
    ),
];

const TUTORIAL: PhaseRows = &[
    (
        0,
        TeamRole::Red,
        &[
            ("Establish persistence", 8),
            ("Cover tracks", 6),
            ("Escalate privileges", 5),
            ("Move laterally", 3),
            ("Exfiltrate data", 1),
        ],
    ),
    (
        0,
        TeamRole::Blue,
        &[
            ("Isolate host", 9),
            ("Collect forensic evidence", 8),
            ("Block IP address", 7),
            ("Escalate to management", 5),
            ("Deploy countermeasures", 4),
        ],
    ),
    (
        1,
        TeamRole::Red,
        &[
            ("Cover tracks", 9),
            ("Establish persistence", 7),
            ("Move laterally", 6),
            ("Escalate privileges", 4),
            ("Exfiltrate data", 2),
        ],
    ),
    (
        1,
        TeamRole::Blue,
        &[
            ("Isolate host", 10),
            ("Block IP address", 9),
            ("Deploy countermeasures", 7),
            ("Collect forensic evidence", 6),
            ("Escalate to management", 4),
        ],
    ),
];

/// Points per action for every `(phase ordinal, role)` of one scenario.
#[derive(Debug, Clone, Default)]
pub struct ScenarioTable {
    entries: HashMap<(i32, TeamRole), IndexMap<String, i32>>,
}

impl ScenarioTable {
    fn from_rows(rows: PhaseRows) -> Self {
        let entries = rows
            .iter()
            .map(|(phase, role, actions)| {
                let actions = actions
                    .iter()
                    .map(|(name, points)| ((*name).to_owned(), *points))
                    .collect();
                ((*phase, *role), actions)
            })
            .collect();
        Self { entries }
    }

    /// Actions scored for a phase and role, best first.
    pub fn actions(&self, phase_ordinal: i32, role: TeamRole) -> Option<&IndexMap<String, i32>> {
        self.entries.get(&(phase_ordinal, role))
    }

    /// Points of `action`, [`UNKNOWN_ACTION_POINTS`] when the phase, role or action is unknown.
    pub fn points(&self, phase_ordinal: i32, role: TeamRole, action: &str) -> i32 {
        self.actions(phase_ordinal, role)
            .and_then(|actions| actions.get(action).copied())
            .unwrap_or(UNKNOWN_ACTION_POINTS)
    }

    /// Best achievable points for a phase and role.
    pub fn max_points(&self, phase_ordinal: i32, role: TeamRole) -> Option<i32> {
        self.actions(phase_ordinal, role)
            .and_then(|actions| actions.values().copied().max())
    }
}

/// Table resolved for a scenario name.
#[derive(Debug, Clone, Copy)]
pub struct TableLookup<'a> {
    /// Table to score with.
    pub table: &'a ScenarioTable,
    /// Whether the scenario had no table and the fallback one was returned.
    pub fallback_used: bool,
}

/// Immutable process-wide scoring data.
#[derive(Debug, Clone)]
pub struct ScoringTable {
    scenarios: HashMap<String, ScenarioTable>,
    fallback: ScenarioTable,
}

impl ScoringTable {
    /// Tables compiled into the binary.
    pub fn builtin() -> Self {
        let fallback = ScenarioTable::from_rows(RANSOMWARE);
        let scenarios = HashMap::from([
            (FALLBACK_SCENARIO.to_owned(), fallback.clone()),
            (TUTORIAL_SCENARIO.to_owned(), ScenarioTable::from_rows(TUTORIAL)),
        ]);
        Self {
            scenarios,
            fallback,
        }
    }

    /// Whether the scenario has a table of its own.
    pub fn has_scenario(&self, scenario_name: &str) -> bool {
        self.scenarios.contains_key(scenario_name)
    }

    /// Table of a scenario, or the fallback table when it has none.
    pub fn lookup(&self, scenario_name: &str) -> TableLookup<'_> {
        match self.scenarios.get(scenario_name) {
            Some(table) => TableLookup {
                table,
                fallback_used: false,
            },
            None => TableLookup {
                table: &self.fallback,
                fallback_used: true,
            },
        }
    }
}

impl Default for ScoringTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tutorial_first_phase_points() {
        let table = ScoringTable::builtin();
        let lookup = table.lookup(TUTORIAL_SCENARIO);
        assert!(!lookup.fallback_used);
        assert_eq!(lookup.table.points(0, TeamRole::Red, "Establish persistence"), 8);
        assert_eq!(lookup.table.points(0, TeamRole::Blue, "Isolate host"), 9);
    }

    #[test]
    fn unknown_scenario_uses_ransomware_table() {
        let table = ScoringTable::builtin();
        let lookup = table.lookup("Operation Unknown");
        assert!(lookup.fallback_used);
        assert_eq!(lookup.table.points(3, TeamRole::Red, "Exfiltrate data"), 10);
    }

    #[test]
    fn missing_phase_or_action_scores_zero() {
        let table = ScoringTable::builtin();
        let tutorial = table.lookup(TUTORIAL_SCENARIO).table;
        assert_eq!(tutorial.points(7, TeamRole::Blue, "Isolate host"), 0);
        assert_eq!(tutorial.points(0, TeamRole::Red, "Tap dance"), 0);
        assert_eq!(tutorial.max_points(7, TeamRole::Blue), None);
        assert_eq!(tutorial.max_points(1, TeamRole::Blue), Some(10));
    }

    #[test]
    fn every_entry_is_within_point_range() {
        for rows in [RANSOMWARE, TUTORIAL] {
            for (_, _, actions) in rows {
                assert!(actions.iter().all(|(_, points)| (0..=10).contains(points)));
            }
        }
    }
}
