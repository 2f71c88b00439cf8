//! Game master review tools: vote comments, private phase notes and the after-action report.

use std::{collections::HashMap, time::SystemTime};

use tracing::info;
use validator::Validate;

use crate::{
    dao::{
        game_store::StoreTxn,
        models::{
            GameId, GmId, GmNotesEntity, PhaseAnalysis, PhaseEntity, PhaseId, PlayerEntity,
            PlayerId, ReportComment, ReportEntity, RiskRating, TeamEntity, TeamId, VoteEntity,
        },
        storage::EntityKind,
    },
    dto::{
        format_system_time,
        review::{GmNotesRequest, GmNotesResponse, PhaseCommentView, ReportResponse},
    },
    error::ServiceError,
    services::admin_service::{load_game_phase, load_game_scenario, load_owned_game},
    state::SharedState,
};

/// Round a rating to two decimals.
pub(crate) fn round_rating(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn average(ratings: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = ratings
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), rating| (sum + rating, count + 1));
    (count > 0).then(|| round_rating(sum / count as f64))
}

fn non_empty_comment(vote: &VoteEntity) -> Option<&str> {
    vote.comments
        .as_deref()
        .map(str::trim)
        .filter(|comment| !comment.is_empty())
}

/// Players and teams of a game keyed by id.
struct Roster {
    players: HashMap<PlayerId, PlayerEntity>,
    teams: HashMap<TeamId, TeamEntity>,
}

impl Roster {
    async fn load(txn: &mut dyn StoreTxn, game_id: GameId) -> Result<Self, ServiceError> {
        let players = txn
            .list_players(game_id)
            .await?
            .into_iter()
            .map(|player| (player.id, player))
            .collect();
        let teams = txn
            .list_teams(game_id)
            .await?
            .into_iter()
            .map(|team| (team.id, team))
            .collect();
        Ok(Self { players, teams })
    }

    fn author(&self, vote: &VoteEntity) -> Option<(&PlayerEntity, &TeamEntity)> {
        Some((self.players.get(&vote.player_id)?, self.teams.get(&vote.team_id)?))
    }
}

/// Every vote of a phase that carries a comment.
pub async fn get_phase_comments(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
    phase_id: PhaseId,
) -> Result<Vec<PhaseCommentView>, ServiceError> {
    let mut txn = state.begin().await?;
    let game = load_owned_game(txn.as_mut(), game_id, gm_id).await?;
    load_game_phase(txn.as_mut(), &game, phase_id).await?;

    let roster = Roster::load(txn.as_mut(), game_id).await?;
    let votes = txn.list_votes(game_id, phase_id).await?;

    Ok(votes
        .iter()
        .filter_map(|vote| {
            let comments = non_empty_comment(vote)?;
            let (player, team) = roster.author(vote)?;
            Some(PhaseCommentView {
                vote_id: vote.id,
                player_id: player.id,
                player_name: player.display_name.clone(),
                team_name: team.name.clone(),
                team_role: team.role,
                effectiveness_rating: vote.effectiveness_rating,
                comments: comments.to_owned(),
                voted_at: format_system_time(vote.voted_at),
            })
        })
        .collect())
}

fn notes_response(game_id: GameId, phase_id: PhaseId, notes: Option<GmNotesEntity>) -> GmNotesResponse {
    match notes {
        Some(notes) => GmNotesResponse {
            game_id,
            phase_id,
            notes: notes.notes,
            updated_at: Some(format_system_time(notes.updated_at)),
        },
        None => GmNotesResponse {
            game_id,
            phase_id,
            notes: String::new(),
            updated_at: None,
        },
    }
}

/// Notes of a phase; empty when none were written.
pub async fn get_gm_notes(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
    phase_id: PhaseId,
) -> Result<GmNotesResponse, ServiceError> {
    let mut txn = state.begin().await?;
    let game = load_owned_game(txn.as_mut(), game_id, gm_id).await?;
    load_game_phase(txn.as_mut(), &game, phase_id).await?;
    let notes = txn.find_gm_notes(game_id, phase_id).await?;
    Ok(notes_response(game_id, phase_id, notes))
}

/// Create or replace the notes of a phase.
pub async fn upsert_gm_notes(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
    phase_id: PhaseId,
    request: GmNotesRequest,
) -> Result<GmNotesResponse, ServiceError> {
    request.validate()?;

    state
        .run_in_game_gate(game_id, || async move {
            let mut txn = state.begin().await?;
            let game = load_owned_game(txn.as_mut(), game_id, gm_id).await?;
            load_game_phase(txn.as_mut(), &game, phase_id).await?;

            let now = SystemTime::now();
            let notes = match txn.find_gm_notes(game_id, phase_id).await? {
                Some(mut notes) => {
                    notes.notes = request.notes;
                    notes.gm_id = gm_id;
                    notes.updated_at = now;
                    txn.update_gm_notes(notes.clone()).await?;
                    notes
                }
                None => {
                    let notes = GmNotesEntity {
                        id: txn.allocate_id(EntityKind::GmNotes).await?,
                        game_id,
                        phase_id,
                        gm_id,
                        notes: request.notes,
                        created_at: now,
                        updated_at: now,
                    };
                    txn.insert_gm_notes(notes.clone()).await?;
                    notes
                }
            };
            txn.commit().await?;
            Ok(notes_response(game_id, phase_id, Some(notes)))
        })
        .await
}

fn analyse_phase(
    phase: &PhaseEntity,
    votes: &[VoteEntity],
    roster: &Roster,
    gm_notes: Option<GmNotesEntity>,
) -> PhaseAnalysis {
    let phase_votes: Vec<&VoteEntity> = votes.iter().filter(|v| v.phase_id == phase.id).collect();
    let average_rating = average(
        phase_votes
            .iter()
            .map(|vote| f64::from(vote.effectiveness_rating)),
    );
    let comments = phase_votes
        .iter()
        .filter_map(|vote| {
            let comments = non_empty_comment(vote)?;
            let (player, team) = roster.author(vote)?;
            Some(ReportComment {
                player_name: player.display_name.clone(),
                team_role: team.role,
                rating: vote.effectiveness_rating,
                comments: comments.to_owned(),
            })
        })
        .collect();

    PhaseAnalysis {
        phase_id: phase.id,
        phase_name: phase.name.clone(),
        phase_order: phase.order_index,
        average_rating,
        risk_rating: RiskRating::from_average(average_rating),
        total_responses: phase_votes.len() as i64,
        comments,
        gm_notes: gm_notes.map(|notes| notes.notes),
    }
}

/// Build the after-action report of a game and store it as the game's single report.
pub async fn generate_report(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
) -> Result<ReportResponse, ServiceError> {
    state
        .run_in_game_gate(game_id, || async move {
            let mut txn = state.begin().await?;
            let game = load_owned_game(txn.as_mut(), game_id, gm_id).await?;
            let scenario = load_game_scenario(txn.as_mut(), &game).await?;
            let phases = txn.list_phases(scenario.id).await?;
            let roster = Roster::load(txn.as_mut(), game_id).await?;
            let votes = txn.list_game_votes(game_id).await?;

            let mut phase_analyses = Vec::with_capacity(phases.len());
            for phase in &phases {
                let notes = txn.find_gm_notes(game_id, phase.id).await?;
                phase_analyses.push(analyse_phase(phase, &votes, &roster, notes));
            }

            let overall = average(phase_analyses.iter().filter_map(|p| p.average_rating));
            let generated_at = SystemTime::now();
            let report = match txn.find_report(game_id).await? {
                Some(mut report) => {
                    report.gm_id = gm_id;
                    report.overall_risk_rating = RiskRating::from_average(overall);
                    report.overall_risk_score = overall.unwrap_or(0.0);
                    report.phase_analyses = phase_analyses;
                    report.generated_at = generated_at;
                    txn.update_report(report.clone()).await?;
                    report
                }
                None => {
                    let report = ReportEntity {
                        id: txn.allocate_id(EntityKind::Report).await?,
                        game_id,
                        gm_id,
                        overall_risk_rating: RiskRating::from_average(overall),
                        overall_risk_score: overall.unwrap_or(0.0),
                        phase_analyses,
                        generated_at,
                    };
                    txn.insert_report(report.clone()).await?;
                    report
                }
            };
            txn.commit().await?;

            info!(
                game_id,
                risk = ?report.overall_risk_rating,
                score = report.overall_risk_score,
                "after-action report generated"
            );
            Ok(report.into())
        })
        .await
}

/// The stored after-action report.
pub async fn get_report(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
) -> Result<ReportResponse, ServiceError> {
    let mut txn = state.begin().await?;
    load_owned_game(txn.as_mut(), game_id, gm_id).await?;
    txn.find_report(game_id)
        .await?
        .map(ReportResponse::from)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("no after-action report for game {game_id}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratings_round_to_two_decimals() {
        assert_eq!(round_rating(6.666_666), 6.67);
        assert_eq!(round_rating(5.0), 5.0);
        assert_eq!(average([5.0, 8.0, 8.0]), Some(7.0));
        assert_eq!(average([1.0, 2.0, 2.0]), Some(1.67));
        assert_eq!(average(std::iter::empty()), None);
    }

    #[test]
    fn blank_comments_are_skipped() {
        let mut vote = VoteEntity {
            id: 1,
            game_id: 1,
            team_id: 1,
            phase_id: 1,
            player_id: 1,
            selected_action: "Isolate host".into(),
            effectiveness_rating: 4,
            comments: Some("   ".into()),
            justification: None,
            voted_at: SystemTime::now(),
        };
        assert_eq!(non_empty_comment(&vote), None);
        vote.comments = Some(" slow escalation ".into());
        assert_eq!(non_empty_comment(&vote), Some("slow escalation"));
    }
}
