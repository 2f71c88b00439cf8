//! Read-only projections for the audience screen.

use std::collections::HashMap;

use crate::{
    dao::{
        game_store::StoreTxn,
        models::{GameEntity, PhaseState, ScoreEventEntity, TeamId},
    },
    dto::{
        admin::ScoreEventView,
        public::{PhaseScore, ScoreboardResponse, TeamStanding, TeamVotingSummary},
    },
    error::ServiceError,
    services::{admin_service::load_game_scenario, player_service::team_voting_status},
    state::SharedState,
};

const RECENT_EVENTS_PER_TEAM: usize = 5;
const RECENT_EVENTS_TOTAL: usize = 10;

/// Resolve a scoreboard identifier: all digits is a game id, anything else an audience code.
async fn resolve_game(
    txn: &mut dyn StoreTxn,
    identifier: &str,
) -> Result<GameEntity, ServiceError> {
    let identifier = identifier.trim();
    let game = if !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit()) {
        match identifier.parse() {
            Ok(id) => txn.find_game(id).await?,
            Err(_) => None,
        }
    } else {
        txn.find_game_by_audience_code(identifier.to_owned())
            .await?
    };
    game.ok_or_else(|| ServiceError::NotFound(format!("game {identifier} not found")))
}

fn newest_first(events: &[&ScoreEventEntity], limit: usize) -> Vec<ScoreEventView> {
    let mut events = events.to_vec();
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    events
        .into_iter()
        .take(limit)
        .cloned()
        .map(ScoreEventView::from)
        .collect()
}

/// Totals, per-phase breakdown and recent activity of every team.
pub async fn scoreboard(
    state: &SharedState,
    identifier: &str,
) -> Result<ScoreboardResponse, ServiceError> {
    let mut txn = state.begin().await?;
    let game = resolve_game(txn.as_mut(), identifier).await?;
    let scenario = load_game_scenario(txn.as_mut(), &game).await?;
    let phases = txn.list_phases(scenario.id).await?;
    let teams = txn.list_teams(game.id).await?;
    let events = txn.list_score_events(game.id).await?;

    let mut by_team: HashMap<TeamId, Vec<&ScoreEventEntity>> = HashMap::new();
    for event in &events {
        by_team.entry(event.team_id).or_default().push(event);
    }

    let standings = teams
        .iter()
        .map(|team| {
            let team_events = by_team.get(&team.id).map(Vec::as_slice).unwrap_or_default();
            let phase_scores = phases
                .iter()
                .map(|phase| PhaseScore {
                    phase_id: phase.id,
                    order_index: phase.order_index,
                    name: phase.name.clone(),
                    score: team_events
                        .iter()
                        .filter(|event| event.phase_id == phase.id)
                        .map(|event| i64::from(event.delta))
                        .sum(),
                })
                .collect();
            TeamStanding {
                team_id: team.id,
                name: team.name.clone(),
                role: team.role,
                total_score: team_events.iter().map(|event| i64::from(event.delta)).sum(),
                phase_scores,
                recent_events: newest_first(team_events, RECENT_EVENTS_PER_TEAM),
            }
        })
        .collect();

    let all_events: Vec<&ScoreEventEntity> = events.iter().collect();
    let current_phase = game
        .current_phase_id
        .and_then(|id| phases.iter().find(|phase| phase.id == id));

    let voting_status = match (game.phase_state, current_phase) {
        (PhaseState::OpenForDecisions, Some(phase)) => {
            let players = txn.list_players(game.id).await?;
            let votes = txn.list_votes(game.id, phase.id).await?;
            Some(
                teams
                    .iter()
                    .map(|team| {
                        let status = team_voting_status(team, &players, &votes);
                        TeamVotingSummary {
                            team_id: status.team_id,
                            team_name: status.team_name,
                            player_count: status.player_count,
                            votes_submitted: status.votes_submitted,
                            all_voted: status.all_voted,
                        }
                    })
                    .collect(),
            )
        }
        _ => None,
    };

    Ok(ScoreboardResponse {
        game_id: game.id,
        scenario_name: scenario.name,
        status: game.status,
        phase_state: game.phase_state,
        current_phase_id: game.current_phase_id,
        current_phase_name: current_phase.map(|phase| phase.name.clone()),
        teams: standings,
        recent_events: newest_first(&all_events, RECENT_EVENTS_TOTAL),
        voting_status,
    })
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn event(id: i64, team_id: TeamId, secs: u64, delta: i32) -> ScoreEventEntity {
        ScoreEventEntity {
            id,
            game_id: 1,
            team_id,
            phase_id: 1,
            delta,
            reason: format!("event {id}"),
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn recent_events_are_newest_first_and_capped() {
        let events: Vec<ScoreEventEntity> = (1..=7).map(|i| event(i, 1, 100, 2)).collect();
        let refs: Vec<&ScoreEventEntity> = events.iter().collect();
        let recent = newest_first(&refs, RECENT_EVENTS_PER_TEAM);
        let ids: Vec<i64> = recent.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![7, 6, 5, 4, 3]);
    }

    #[test]
    fn later_timestamps_win_over_ids() {
        let events = [event(1, 1, 200, 5), event(2, 2, 100, 3)];
        let refs: Vec<&ScoreEventEntity> = events.iter().collect();
        let recent = newest_first(&refs, RECENT_EVENTS_TOTAL);
        assert_eq!(recent[0].id, 1);
        assert_eq!(recent[1].id, 2);
    }
}
