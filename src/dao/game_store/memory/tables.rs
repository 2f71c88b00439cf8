use std::collections::{BTreeMap, HashMap};

use crate::dao::{
    models::{
        ArtifactEntity, ArtifactId, DecisionEntity, GameEntity, GameId, GmId, GmNotesEntity,
        PhaseArtifactLink, PhaseEntity, PhaseId, PlayerEntity, PlayerId, ReportEntity,
        ScenarioEntity, ScenarioId, ScoreEventEntity, TeamEntity, TeamId, VoteEntity,
    },
    storage::{EntityKind, StorageError, StorageResult},
};

/// Whole in-memory database. Cloned into each transaction as its working copy.
#[derive(Debug, Clone, Default)]
pub(super) struct Tables {
    sequences: HashMap<EntityKind, i64>,
    scenarios: BTreeMap<ScenarioId, ScenarioEntity>,
    phases: BTreeMap<PhaseId, PhaseEntity>,
    artifacts: BTreeMap<ArtifactId, ArtifactEntity>,
    links: Vec<PhaseArtifactLink>,
    games: BTreeMap<GameId, GameEntity>,
    teams: BTreeMap<TeamId, TeamEntity>,
    players: BTreeMap<PlayerId, PlayerEntity>,
    votes: BTreeMap<i64, VoteEntity>,
    decisions: BTreeMap<i64, DecisionEntity>,
    score_events: BTreeMap<i64, ScoreEventEntity>,
    gm_notes: BTreeMap<i64, GmNotesEntity>,
    reports: BTreeMap<i64, ReportEntity>,
}

fn require(found: bool, message: impl FnOnce() -> String) -> StorageResult<()> {
    if found {
        Ok(())
    } else {
        Err(StorageError::Integrity { message: message() })
    }
}

fn replace<T>(table: &mut BTreeMap<i64, T>, id: i64, row: T, entity: EntityKind) -> StorageResult<()> {
    match table.get_mut(&id) {
        Some(slot) => {
            *slot = row;
            Ok(())
        }
        None => Err(StorageError::Integrity {
            message: format!("cannot update missing row {id} in {entity}"),
        }),
    }
}

impl Tables {
    pub fn allocate_id(&mut self, kind: EntityKind) -> i64 {
        let next = self.sequences.entry(kind).or_insert(0);
        *next += 1;
        *next
    }

    pub fn insert_scenario(&mut self, scenario: ScenarioEntity) -> StorageResult<()> {
        if self.scenarios.values().any(|s| s.name == scenario.name) {
            return Err(StorageError::conflict(EntityKind::Scenario, scenario.name));
        }
        self.scenarios.insert(scenario.id, scenario);
        Ok(())
    }

    pub fn find_scenario(&self, id: ScenarioId) -> Option<ScenarioEntity> {
        self.scenarios.get(&id).cloned()
    }

    pub fn find_scenario_by_name(&self, name: &str) -> Option<ScenarioEntity> {
        self.scenarios.values().find(|s| s.name == name).cloned()
    }

    pub fn list_scenarios(&self) -> Vec<ScenarioEntity> {
        self.scenarios.values().cloned().collect()
    }

    pub fn insert_phase(&mut self, phase: PhaseEntity) -> StorageResult<()> {
        require(self.scenarios.contains_key(&phase.scenario_id), || {
            format!("phase references unknown scenario {}", phase.scenario_id)
        })?;
        if self
            .phases
            .values()
            .any(|p| p.scenario_id == phase.scenario_id && p.order_index == phase.order_index)
        {
            return Err(StorageError::conflict(
                EntityKind::Phase,
                format!("scenario {} order {}", phase.scenario_id, phase.order_index),
            ));
        }
        self.phases.insert(phase.id, phase);
        Ok(())
    }

    pub fn find_phase(&self, id: PhaseId) -> Option<PhaseEntity> {
        self.phases.get(&id).cloned()
    }

    pub fn list_phases(&self, scenario_id: ScenarioId) -> Vec<PhaseEntity> {
        let mut phases: Vec<_> = self
            .phases
            .values()
            .filter(|p| p.scenario_id == scenario_id)
            .cloned()
            .collect();
        phases.sort_by_key(|p| p.order_index);
        phases
    }

    pub fn insert_artifact(&mut self, artifact: ArtifactEntity) {
        self.artifacts.insert(artifact.id, artifact);
    }

    pub fn insert_artifact_link(&mut self, link: PhaseArtifactLink) -> StorageResult<()> {
        require(self.phases.contains_key(&link.phase_id), || {
            format!("link references unknown phase {}", link.phase_id)
        })?;
        require(self.artifacts.contains_key(&link.artifact_id), || {
            format!("link references unknown artifact {}", link.artifact_id)
        })?;
        if self.links.contains(&link) {
            return Err(StorageError::conflict(
                EntityKind::ArtifactLink,
                format!("phase {} artifact {}", link.phase_id, link.artifact_id),
            ));
        }
        self.links.push(link);
        Ok(())
    }

    pub fn list_phase_artifacts(&self, phase_id: PhaseId) -> Vec<(PhaseArtifactLink, ArtifactEntity)> {
        let mut rows: Vec<_> = self
            .links
            .iter()
            .filter(|link| link.phase_id == phase_id)
            .filter_map(|link| {
                self.artifacts
                    .get(&link.artifact_id)
                    .map(|artifact| (*link, artifact.clone()))
            })
            .collect();
        rows.sort_by_key(|(link, _)| link.artifact_id);
        rows
    }

    fn code_taken(&self, code: &str) -> bool {
        self.teams.values().any(|t| t.code == code)
            || self.games.values().any(|g| {
                g.audience_code == code || g.red_team_code == code || g.blue_team_code == code
            })
    }

    pub fn insert_game(&mut self, game: GameEntity) -> StorageResult<()> {
        for code in [&game.red_team_code, &game.blue_team_code, &game.audience_code] {
            if self.code_taken(code) {
                return Err(StorageError::conflict(EntityKind::Game, code.clone()));
            }
        }
        self.games.insert(game.id, game);
        Ok(())
    }

    pub fn update_game(&mut self, game: GameEntity) -> StorageResult<()> {
        replace(&mut self.games, game.id, game, EntityKind::Game)
    }

    pub fn find_game(&self, id: GameId) -> Option<GameEntity> {
        self.games.get(&id).cloned()
    }

    pub fn find_game_by_audience_code(&self, code: &str) -> Option<GameEntity> {
        self.games.values().find(|g| g.audience_code == code).cloned()
    }

    pub fn list_games_for_gm(&self, gm_id: GmId) -> Vec<GameEntity> {
        let mut games: Vec<_> = self
            .games
            .values()
            .filter(|g| g.gm_id == gm_id)
            .cloned()
            .collect();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        games
    }

    pub fn is_code_taken(&self, code: &str) -> bool {
        self.code_taken(code)
    }

    pub fn delete_game(&mut self, id: GameId) -> StorageResult<bool> {
        let dependents = [
            (EntityKind::Vote, self.votes.values().any(|v| v.game_id == id)),
            (EntityKind::Decision, self.decisions.values().any(|d| d.game_id == id)),
            (EntityKind::ScoreEvent, self.score_events.values().any(|e| e.game_id == id)),
            (EntityKind::GmNotes, self.gm_notes.values().any(|n| n.game_id == id)),
            (EntityKind::Report, self.reports.values().any(|r| r.game_id == id)),
        ];
        if let Some((kind, _)) = dependents.iter().find(|(_, present)| *present) {
            return Err(StorageError::Integrity {
                message: format!("game {id} is still referenced by {kind}"),
            });
        }

        if self.games.remove(&id).is_none() {
            return Ok(false);
        }
        self.players.retain(|_, p| p.game_id != id);
        self.teams.retain(|_, t| t.game_id != id);
        Ok(true)
    }

    pub fn purge_game_rows(&mut self, kind: EntityKind, game_id: GameId) -> StorageResult<u64> {
        fn purge<T>(table: &mut BTreeMap<i64, T>, belongs: impl Fn(&T) -> bool) -> u64 {
            let before = table.len();
            table.retain(|_, row| !belongs(row));
            (before - table.len()) as u64
        }

        let removed = match kind {
            EntityKind::Vote => purge(&mut self.votes, |v| v.game_id == game_id),
            EntityKind::Decision => purge(&mut self.decisions, |d| d.game_id == game_id),
            EntityKind::ScoreEvent => purge(&mut self.score_events, |e| e.game_id == game_id),
            EntityKind::GmNotes => purge(&mut self.gm_notes, |n| n.game_id == game_id),
            EntityKind::Report => purge(&mut self.reports, |r| r.game_id == game_id),
            other => {
                return Err(StorageError::Integrity {
                    message: format!("{other} rows are not owned by a game"),
                });
            }
        };
        Ok(removed)
    }

    pub fn insert_team(&mut self, team: TeamEntity) -> StorageResult<()> {
        require(self.games.contains_key(&team.game_id), || {
            format!("team references unknown game {}", team.game_id)
        })?;
        if self.teams.values().any(|t| t.code == team.code) {
            return Err(StorageError::conflict(EntityKind::Team, team.code));
        }
        self.teams.insert(team.id, team);
        Ok(())
    }

    pub fn find_team(&self, id: TeamId) -> Option<TeamEntity> {
        self.teams.get(&id).cloned()
    }

    pub fn find_team_by_code(&self, code: &str) -> Option<TeamEntity> {
        self.teams.values().find(|t| t.code == code).cloned()
    }

    pub fn list_teams(&self, game_id: GameId) -> Vec<TeamEntity> {
        self.teams
            .values()
            .filter(|t| t.game_id == game_id)
            .cloned()
            .collect()
    }

    pub fn insert_player(&mut self, player: PlayerEntity) -> StorageResult<()> {
        require(self.teams.contains_key(&player.team_id), || {
            format!("player references unknown team {}", player.team_id)
        })?;
        self.players.insert(player.id, player);
        Ok(())
    }

    pub fn find_player(&self, id: PlayerId) -> Option<PlayerEntity> {
        self.players.get(&id).cloned()
    }

    pub fn find_player_by_name(
        &self,
        game_id: GameId,
        team_id: TeamId,
        display_name: &str,
    ) -> Option<PlayerEntity> {
        self.players
            .values()
            .find(|p| p.game_id == game_id && p.team_id == team_id && p.display_name == display_name)
            .cloned()
    }

    pub fn list_players(&self, game_id: GameId) -> Vec<PlayerEntity> {
        self.players
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect()
    }

    pub fn insert_vote(&mut self, vote: VoteEntity) -> StorageResult<()> {
        require(self.players.contains_key(&vote.player_id), || {
            format!("vote references unknown player {}", vote.player_id)
        })?;
        if self
            .votes
            .values()
            .any(|v| v.player_id == vote.player_id && v.phase_id == vote.phase_id)
        {
            return Err(StorageError::conflict(
                EntityKind::Vote,
                format!("player {} phase {}", vote.player_id, vote.phase_id),
            ));
        }
        self.votes.insert(vote.id, vote);
        Ok(())
    }

    pub fn update_vote(&mut self, vote: VoteEntity) -> StorageResult<()> {
        replace(&mut self.votes, vote.id, vote, EntityKind::Vote)
    }

    pub fn find_vote(&self, player_id: PlayerId, phase_id: PhaseId) -> Option<VoteEntity> {
        self.votes
            .values()
            .find(|v| v.player_id == player_id && v.phase_id == phase_id)
            .cloned()
    }

    pub fn list_votes(&self, game_id: GameId, phase_id: PhaseId) -> Vec<VoteEntity> {
        self.votes
            .values()
            .filter(|v| v.game_id == game_id && v.phase_id == phase_id)
            .cloned()
            .collect()
    }

    pub fn list_game_votes(&self, game_id: GameId) -> Vec<VoteEntity> {
        self.votes
            .values()
            .filter(|v| v.game_id == game_id)
            .cloned()
            .collect()
    }

    pub fn insert_decision(&mut self, decision: DecisionEntity) -> StorageResult<()> {
        require(self.teams.contains_key(&decision.team_id), || {
            format!("decision references unknown team {}", decision.team_id)
        })?;
        if self.find_team_decision(decision.game_id, decision.team_id, decision.phase_id).is_some() {
            return Err(StorageError::conflict(
                EntityKind::Decision,
                format!(
                    "game {} team {} phase {}",
                    decision.game_id, decision.team_id, decision.phase_id
                ),
            ));
        }
        self.decisions.insert(decision.id, decision);
        Ok(())
    }

    pub fn update_decision(&mut self, decision: DecisionEntity) -> StorageResult<()> {
        replace(&mut self.decisions, decision.id, decision, EntityKind::Decision)
    }

    pub fn find_decision(&self, id: i64) -> Option<DecisionEntity> {
        self.decisions.get(&id).cloned()
    }

    pub fn find_team_decision(
        &self,
        game_id: GameId,
        team_id: TeamId,
        phase_id: PhaseId,
    ) -> Option<DecisionEntity> {
        self.decisions
            .values()
            .find(|d| d.game_id == game_id && d.team_id == team_id && d.phase_id == phase_id)
            .cloned()
    }

    pub fn list_decisions(&self, game_id: GameId, phase_id: PhaseId) -> Vec<DecisionEntity> {
        self.decisions
            .values()
            .filter(|d| d.game_id == game_id && d.phase_id == phase_id)
            .cloned()
            .collect()
    }

    pub fn list_game_decisions(&self, game_id: GameId) -> Vec<DecisionEntity> {
        self.decisions
            .values()
            .filter(|d| d.game_id == game_id)
            .cloned()
            .collect()
    }

    pub fn insert_score_event(&mut self, event: ScoreEventEntity) -> StorageResult<()> {
        require(self.teams.contains_key(&event.team_id), || {
            format!("score event references unknown team {}", event.team_id)
        })?;
        self.score_events.insert(event.id, event);
        Ok(())
    }

    pub fn list_score_events(&self, game_id: GameId) -> Vec<ScoreEventEntity> {
        self.score_events
            .values()
            .filter(|e| e.game_id == game_id)
            .cloned()
            .collect()
    }

    pub fn insert_gm_notes(&mut self, notes: GmNotesEntity) -> StorageResult<()> {
        if self.find_gm_notes(notes.game_id, notes.phase_id).is_some() {
            return Err(StorageError::conflict(
                EntityKind::GmNotes,
                format!("game {} phase {}", notes.game_id, notes.phase_id),
            ));
        }
        self.gm_notes.insert(notes.id, notes);
        Ok(())
    }

    pub fn update_gm_notes(&mut self, notes: GmNotesEntity) -> StorageResult<()> {
        replace(&mut self.gm_notes, notes.id, notes, EntityKind::GmNotes)
    }

    pub fn find_gm_notes(&self, game_id: GameId, phase_id: PhaseId) -> Option<GmNotesEntity> {
        self.gm_notes
            .values()
            .find(|n| n.game_id == game_id && n.phase_id == phase_id)
            .cloned()
    }

    pub fn insert_report(&mut self, report: ReportEntity) -> StorageResult<()> {
        if self.find_report(report.game_id).is_some() {
            return Err(StorageError::conflict(
                EntityKind::Report,
                format!("game {}", report.game_id),
            ));
        }
        self.reports.insert(report.id, report);
        Ok(())
    }

    pub fn update_report(&mut self, report: ReportEntity) -> StorageResult<()> {
        replace(&mut self.reports, report.id, report, EntityKind::Report)
    }

    pub fn find_report(&self, game_id: GameId) -> Option<ReportEntity> {
        self.reports.values().find(|r| r.game_id == game_id).cloned()
    }
}
