//! Deterministic scoring of team decisions.
//!
//! [`evaluate`] is a pure function of the scenario table, the phase ordinal, the team role,
//! the primary action and the team sizes. [`PhaseScoring`] applies it to stored decisions and
//! emits one score event per scored decision inside the caller's transaction.

pub mod table;

use std::{collections::HashMap, time::SystemTime};

use tracing::{debug, warn};

pub use self::table::{FALLBACK_SCENARIO, ScenarioTable, ScoringTable, TUTORIAL_SCENARIO};
use crate::dao::{
    game_store::StoreTxn,
    models::{
        DecisionActions, DecisionEntity, DecisionStatus, GameId, PhaseEntity, ScoreEventEntity,
        TeamId, TeamRole,
    },
    storage::{EntityKind, StorageResult},
};

const EMPTY_SELECTION: &str = "No action selected";

/// Qualitative band of a base score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBucket {
    /// 9 points or more.
    Excellent,
    /// 7 or 8 points.
    Good,
    /// 4 to 6 points.
    Acceptable,
    /// 1 to 3 points.
    Poor,
    /// No points.
    Invalid,
}

impl ScoreBucket {
    /// Band of `points`.
    pub fn from_points(points: i32) -> Self {
        match points {
            p if p >= 9 => ScoreBucket::Excellent,
            p if p >= 7 => ScoreBucket::Good,
            p if p >= 4 => ScoreBucket::Acceptable,
            p if p >= 1 => ScoreBucket::Poor,
            _ => ScoreBucket::Invalid,
        }
    }

    /// Player-facing explanation for an action falling in this band.
    pub fn explain(self, action: &str) -> String {
        match self {
            ScoreBucket::Excellent => {
                format!("Excellent choice: {action} perfectly aligns with phase objectives")
            }
            ScoreBucket::Good => {
                format!("Good choice: {action} effectively supports phase objectives")
            }
            ScoreBucket::Acceptable => {
                format!("Acceptable choice: {action} somewhat supports objectives")
            }
            ScoreBucket::Poor => {
                format!("Poor choice: {action} doesn't align well with phase objectives")
            }
            ScoreBucket::Invalid => format!("Invalid or counterproductive action: {action}"),
        }
    }
}

/// Size of the scored team relative to the game.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamSize {
    /// Players on the scored team.
    pub members: usize,
    /// Mean player count over every team of the game.
    pub average: f64,
}

/// Everything the score of one decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct ScoreRequest<'a> {
    /// Scenario name, the outer table key.
    pub scenario_name: &'a str,
    /// `order_index` of the scored phase.
    pub phase_ordinal: i32,
    /// Role of the scored team.
    pub role: TeamRole,
    /// Team decision payload.
    pub actions: &'a DecisionActions,
    /// Team size weighting input.
    pub size: TeamSize,
    /// Whether team size weighting applies.
    pub normalize: bool,
}

/// Result of scoring one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// Table points before weighting.
    pub base: i32,
    /// Points awarded.
    pub score: i32,
    /// Band of the base points, `None` when no action was selected.
    pub bucket: Option<ScoreBucket>,
    /// Explanation recorded on the decision and the score event.
    pub explanation: String,
    /// Whether the scenario had no table and the fallback table was used.
    pub fallback_used: bool,
}

/// Apply the optional team size weighting to a base score.
///
/// Smaller than average teams gain up to 10%, larger ones lose up to 5%; weighted results are
/// truncated and clamped to `1..=10`.
pub fn weighted_score(base: i32, size: TeamSize, normalize: bool) -> i32 {
    if !normalize || size.average == 0.0 {
        return base;
    }

    let ratio = size.members as f64 / size.average;
    let multiplier = if ratio < 1.0 {
        1.0 + (1.0 - ratio) * 0.1
    } else {
        1.0 - (ratio - 1.0) * 0.05
    };

    ((base as f64 * multiplier) as i32).clamp(1, 10)
}

/// Score a decision payload against the table.
pub fn evaluate(table: &ScoringTable, request: ScoreRequest<'_>) -> ScoreOutcome {
    let lookup = table.lookup(request.scenario_name);

    let Some(primary) = request.actions.primary() else {
        return ScoreOutcome {
            base: 0,
            score: weighted_score(0, request.size, request.normalize),
            bucket: None,
            explanation: EMPTY_SELECTION.to_owned(),
            fallback_used: lookup.fallback_used,
        };
    };

    let base = lookup
        .table
        .points(request.phase_ordinal, request.role, primary);
    let bucket = ScoreBucket::from_points(base);

    ScoreOutcome {
        base,
        score: weighted_score(base, request.size, request.normalize),
        bucket: Some(bucket),
        explanation: bucket.explain(primary),
        fallback_used: lookup.fallback_used,
    }
}

/// Scoring context of one phase of one game, loaded once per lock.
pub struct PhaseScoring<'a> {
    table: &'a ScoringTable,
    normalize: bool,
    scenario_name: &'a str,
    phase: &'a PhaseEntity,
    roles: HashMap<TeamId, TeamRole>,
    sizes: HashMap<TeamId, usize>,
}

impl<'a> PhaseScoring<'a> {
    /// Collect team roles and player counts of `game_id`.
    pub async fn load(
        txn: &mut dyn StoreTxn,
        table: &'a ScoringTable,
        normalize: bool,
        scenario_name: &'a str,
        phase: &'a PhaseEntity,
        game_id: GameId,
    ) -> StorageResult<Self> {
        let teams = txn.list_teams(game_id).await?;
        let players = txn.list_players(game_id).await?;

        let mut sizes: HashMap<TeamId, usize> = teams.iter().map(|t| (t.id, 0)).collect();
        for player in &players {
            *sizes.entry(player.team_id).or_default() += 1;
        }
        let roles = teams.iter().map(|t| (t.id, t.role)).collect();

        Ok(Self {
            table,
            normalize,
            scenario_name,
            phase,
            roles,
            sizes,
        })
    }

    fn average_team_size(&self) -> f64 {
        if self.sizes.is_empty() {
            return 1.0;
        }
        self.sizes.values().sum::<usize>() as f64 / self.sizes.len() as f64
    }

    /// Score a submitted decision and emit its score event.
    ///
    /// Decisions that are not in `submitted` status are left untouched and yield `None`.
    pub async fn score_decision(
        &self,
        txn: &mut dyn StoreTxn,
        mut decision: DecisionEntity,
    ) -> StorageResult<Option<ScoreEventEntity>> {
        if decision.status != DecisionStatus::Submitted {
            return Ok(None);
        }
        let Some(role) = self.roles.get(&decision.team_id).copied() else {
            warn!(
                decision_id = decision.id,
                team_id = decision.team_id,
                "decision references a team outside the game; not scored"
            );
            return Ok(None);
        };

        let outcome = evaluate(
            self.table,
            ScoreRequest {
                scenario_name: self.scenario_name,
                phase_ordinal: self.phase.order_index,
                role,
                actions: &decision.actions,
                size: TeamSize {
                    members: self.sizes.get(&decision.team_id).copied().unwrap_or(0),
                    average: self.average_team_size(),
                },
                normalize: self.normalize,
            },
        );

        if outcome.fallback_used {
            warn!(
                scenario = self.scenario_name,
                fallback = FALLBACK_SCENARIO,
                "scenario has no scoring table; scored with the fallback table"
            );
        }
        debug!(
            decision_id = decision.id,
            team_id = decision.team_id,
            phase_id = self.phase.id,
            base = outcome.base,
            score = outcome.score,
            "decision auto-scored"
        );

        decision.score_awarded = Some(outcome.score);
        decision.gm_notes = Some(format!("Auto-scored: {}", outcome.explanation));
        decision.status = DecisionStatus::Scored;
        let (game_id, team_id) = (decision.game_id, decision.team_id);
        txn.update_decision(decision).await?;

        let event = ScoreEventEntity {
            id: txn.allocate_id(EntityKind::ScoreEvent).await?,
            game_id,
            team_id,
            phase_id: self.phase.id,
            delta: outcome.score,
            reason: format!(
                "Phase {} auto-scored: {}",
                self.phase.order_index + 1,
                outcome.explanation
            ),
            created_at: SystemTime::now(),
        };
        txn.insert_score_event(event.clone()).await?;
        Ok(Some(event))
    }

    /// Score every submitted decision of the phase.
    pub async fn score_submitted(
        &self,
        txn: &mut dyn StoreTxn,
        game_id: GameId,
    ) -> StorageResult<Vec<ScoreEventEntity>> {
        let decisions = txn.list_decisions(game_id, self.phase.id).await?;
        let mut events = Vec::new();
        for decision in decisions {
            if let Some(event) = self.score_decision(txn, decision).await? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn selected(action: &str) -> DecisionActions {
        DecisionActions::Tally {
            selected: vec![action.to_owned()],
            vote_counts: IndexMap::from([(action.to_owned(), 1)]),
        }
    }

    fn request<'a>(actions: &'a DecisionActions, role: TeamRole) -> ScoreRequest<'a> {
        ScoreRequest {
            scenario_name: TUTORIAL_SCENARIO,
            phase_ordinal: 0,
            role,
            actions,
            size: TeamSize {
                members: 1,
                average: 1.0,
            },
            normalize: false,
        }
    }

    #[test]
    fn tutorial_choices_score_from_table() {
        let table = ScoringTable::builtin();

        let red = selected("Establish persistence");
        let outcome = evaluate(&table, request(&red, TeamRole::Red));
        assert_eq!(outcome.score, 8);
        assert_eq!(outcome.bucket, Some(ScoreBucket::Good));

        let blue = selected("Isolate host");
        let outcome = evaluate(&table, request(&blue, TeamRole::Blue));
        assert_eq!(outcome.score, 9);
        assert_eq!(
            outcome.explanation,
            "Excellent choice: Isolate host perfectly aligns with phase objectives"
        );
    }

    #[test]
    fn unknown_action_is_invalid_and_scores_zero() {
        let table = ScoringTable::builtin();
        let actions = selected("Tap dance");
        let outcome = evaluate(&table, request(&actions, TeamRole::Red));
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.bucket, Some(ScoreBucket::Invalid));
        assert_eq!(
            outcome.explanation,
            "Invalid or counterproductive action: Tap dance"
        );
    }

    #[test]
    fn empty_selection_scores_zero() {
        let table = ScoringTable::builtin();
        let actions = DecisionActions::Plain(vec![]);
        let outcome = evaluate(&table, request(&actions, TeamRole::Blue));
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.bucket, None);
        assert_eq!(outcome.explanation, "No action selected");
    }

    #[test]
    fn plain_action_list_uses_first_entry() {
        let table = ScoringTable::builtin();
        let actions = DecisionActions::Plain(vec!["Isolate host".into(), "Block IP address".into()]);
        assert_eq!(evaluate(&table, request(&actions, TeamRole::Blue)).base, 9);
    }

    #[test]
    fn unknown_scenario_is_flagged_as_fallback() {
        let table = ScoringTable::builtin();
        let actions = selected("Isolate host");
        let outcome = evaluate(
            &table,
            ScoreRequest {
                scenario_name: "Brand New Scenario",
                ..request(&actions, TeamRole::Blue)
            },
        );
        assert!(outcome.fallback_used);
        assert_eq!(outcome.score, 10);
    }

    #[test]
    fn weighting_is_identity_when_disabled() {
        let size = TeamSize {
            members: 1,
            average: 4.0,
        };
        assert_eq!(weighted_score(7, size, false), 7);
        assert_eq!(weighted_score(0, size, false), 0);
    }

    #[test]
    fn weighting_favours_small_teams_and_clamps() {
        let small = TeamSize {
            members: 1,
            average: 2.0,
        };
        // ratio 0.5 → ×1.05
        assert_eq!(weighted_score(10, small, true), 10);
        assert_eq!(weighted_score(8, small, true), 8);

        let large = TeamSize {
            members: 6,
            average: 2.0,
        };
        // ratio 3 → ×0.9
        assert_eq!(weighted_score(10, large, true), 9);
        assert_eq!(weighted_score(0, large, true), 1);

        let empty_game = TeamSize {
            members: 0,
            average: 0.0,
        };
        assert_eq!(weighted_score(6, empty_game, true), 6);
    }
}
