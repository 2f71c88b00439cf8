//! Collapse per-player votes into one team decision per phase.

use std::{collections::BTreeSet, future::Future, time::SystemTime};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    dao::{
        game_store::StoreTxn,
        models::{
            DecisionActions, DecisionEntity, DecisionStatus, GameId, PhaseId, TeamId, VoteEntity,
        },
        storage::{EntityKind, StorageResult},
    },
    error::ServiceError,
};

const DEFAULT_JUSTIFICATION: &str = "Team vote";

/// Counted votes of a team with the winning action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    /// Action with the most votes; on ties the one that reached that count first.
    pub winner: String,
    /// Votes per action in first-seen order.
    pub counts: IndexMap<String, i64>,
}

/// Count votes in the order given. Returns `None` when there are no votes.
pub fn tally<'a>(votes: impl IntoIterator<Item = &'a VoteEntity>) -> Option<Tally> {
    let mut counts: IndexMap<String, i64> = IndexMap::new();
    let mut leader: Option<(String, i64)> = None;

    for vote in votes {
        let count = counts.entry(vote.selected_action.clone()).or_insert(0);
        *count += 1;
        let count = *count;
        if leader.as_ref().is_none_or(|(_, best)| count > *best) {
            leader = Some((vote.selected_action.clone(), count));
        }
    }

    leader.map(|(winner, _)| Tally { winner, counts })
}

/// Join the non-empty justifications with a blank line.
pub fn merge_justifications<'a>(votes: impl IntoIterator<Item = &'a VoteEntity>) -> String {
    let parts: Vec<&str> = votes
        .into_iter()
        .filter_map(|vote| vote.justification.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect();
    if parts.is_empty() {
        DEFAULT_JUSTIFICATION.to_owned()
    } else {
        parts.join("\n\n")
    }
}

/// Team members and their votes for one phase.
struct TeamBallot {
    player_ids: BTreeSet<i64>,
    votes: Vec<VoteEntity>,
}

impl TeamBallot {
    async fn load(
        txn: &mut dyn StoreTxn,
        game_id: GameId,
        phase_id: PhaseId,
        team_id: TeamId,
    ) -> StorageResult<Self> {
        let player_ids = txn
            .list_players(game_id)
            .await?
            .into_iter()
            .filter(|player| player.team_id == team_id)
            .map(|player| player.id)
            .collect();
        let mut votes: Vec<VoteEntity> = txn
            .list_votes(game_id, phase_id)
            .await?
            .into_iter()
            .filter(|vote| vote.team_id == team_id)
            .collect();
        votes.sort_by_key(|vote| vote.id);
        Ok(Self { player_ids, votes })
    }

    fn everyone_voted(&self) -> bool {
        let voted: BTreeSet<i64> = self.votes.iter().map(|vote| vote.player_id).collect();
        !self.player_ids.is_empty() && voted == self.player_ids
    }
}

/// Create the team decision for a phase from the votes cast so far.
///
/// Returns the created decision, or `None` when the team has no players, nobody voted or a
/// decision already exists. A decision inserted concurrently by another transaction surfaces as a
/// conflict on [`EntityKind::Decision`]; see [`retry_after_decision_race`].
pub async fn aggregate_team(
    txn: &mut dyn StoreTxn,
    game_id: GameId,
    phase_id: PhaseId,
    team_id: TeamId,
) -> StorageResult<Option<DecisionEntity>> {
    let ballot = TeamBallot::load(txn, game_id, phase_id, team_id).await?;
    create_decision(txn, game_id, phase_id, team_id, ballot).await
}

/// Aggregate only when every member of the team has voted.
pub async fn aggregate_if_complete(
    txn: &mut dyn StoreTxn,
    game_id: GameId,
    phase_id: PhaseId,
    team_id: TeamId,
) -> StorageResult<Option<DecisionEntity>> {
    let ballot = TeamBallot::load(txn, game_id, phase_id, team_id).await?;
    if !ballot.everyone_voted() {
        return Ok(None);
    }
    create_decision(txn, game_id, phase_id, team_id, ballot).await
}

async fn create_decision(
    txn: &mut dyn StoreTxn,
    game_id: GameId,
    phase_id: PhaseId,
    team_id: TeamId,
    ballot: TeamBallot,
) -> StorageResult<Option<DecisionEntity>> {
    if ballot.player_ids.is_empty() {
        return Ok(None);
    }
    if txn
        .find_team_decision(game_id, team_id, phase_id)
        .await?
        .is_some()
    {
        return Ok(None);
    }
    let Some(tally) = tally(&ballot.votes) else {
        return Ok(None);
    };

    let decision = DecisionEntity {
        id: txn.allocate_id(EntityKind::Decision).await?,
        game_id,
        team_id,
        phase_id,
        actions: DecisionActions::Tally {
            selected: vec![tally.winner.clone()],
            vote_counts: tally.counts,
        },
        free_text_justification: Some(merge_justifications(&ballot.votes)),
        status: DecisionStatus::Submitted,
        score_awarded: None,
        gm_notes: None,
        submitted_at: SystemTime::now(),
    };

    txn.insert_decision(decision.clone()).await?;
    debug!(
        game_id,
        phase_id,
        team_id,
        winner = %tally.winner,
        votes = ballot.votes.len(),
        "team decision aggregated"
    );
    Ok(Some(decision))
}

/// Run a unit of work that aggregates decisions, and run it once more if it lost the race to
/// insert one.
///
/// A unique-key failure aborts the whole backend transaction, so the unit restarts from scratch
/// with a new transaction. The second attempt finds the decision already recorded and leaves it
/// alone.
pub async fn retry_after_decision_race<F, Fut, T>(mut unit: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    match unit().await {
        Err(err) if err.is_conflict_on(EntityKind::Decision) => {
            debug!(error = %err, "team decision recorded concurrently; retrying");
            unit().await
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::dao::{
        game_store::{
            GameStore,
            memory::{
                MemoryStore,
                fixtures::{player, seed_game},
            },
        },
        storage::StorageError,
    };

    fn vote(id: i64, player_id: i64, action: &str, justification: Option<&str>) -> VoteEntity {
        VoteEntity {
            id,
            game_id: 1,
            team_id: 1,
            phase_id: 1,
            player_id,
            selected_action: action.to_owned(),
            effectiveness_rating: 5,
            comments: None,
            justification: justification.map(str::to_owned),
            voted_at: SystemTime::now(),
        }
    }

    #[test]
    fn plurality_wins() {
        let votes = [vote(1, 1, "A", None), vote(2, 2, "B", None), vote(3, 3, "A", None)];
        let tally = tally(&votes).unwrap();
        assert_eq!(tally.winner, "A");
        assert_eq!(tally.counts, IndexMap::from([("A".into(), 2), ("B".into(), 1)]));
    }

    #[test]
    fn tie_goes_to_first_action_reaching_the_top_count() {
        let votes = [vote(1, 1, "A", None), vote(2, 2, "B", None)];
        assert_eq!(tally(&votes).unwrap().winner, "A");

        let votes = [
            vote(1, 1, "A", None),
            vote(2, 2, "B", None),
            vote(3, 3, "B", None),
            vote(4, 4, "A", None),
        ];
        assert_eq!(tally(&votes).unwrap().winner, "B");
    }

    #[test]
    fn no_votes_no_tally() {
        assert!(tally(&[]).is_none());
    }

    #[test]
    fn justifications_are_joined_or_defaulted() {
        let votes = [
            vote(1, 1, "A", Some("contain first")),
            vote(2, 2, "A", Some("  ")),
            vote(3, 3, "A", Some("then eradicate")),
        ];
        assert_eq!(merge_justifications(&votes), "contain first\n\nthen eradicate");
        assert_eq!(merge_justifications(&[vote(1, 1, "A", None)]), "Team vote");
    }

    async fn seed_players(txn: &mut dyn StoreTxn, count: i64) {
        seed_game(txn).await;
        for id in 1..=count {
            txn.insert_player(player(id, 1, 1)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn fast_path_waits_for_every_member_and_runs_once() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        seed_players(txn.as_mut(), 2).await;

        txn.insert_vote(vote(1, 1, "Isolate host", None)).await.unwrap();
        let early = aggregate_if_complete(txn.as_mut(), 1, 1, 1).await.unwrap();
        assert!(early.is_none());

        txn.insert_vote(vote(2, 2, "Block IP address", None))
            .await
            .unwrap();
        let decision = aggregate_if_complete(txn.as_mut(), 1, 1, 1)
            .await
            .unwrap()
            .expect("decision once everyone voted");
        assert_eq!(decision.actions.primary(), Some("Isolate host"));
        assert_eq!(decision.status, DecisionStatus::Submitted);

        for _ in 0..3 {
            assert!(aggregate_team(txn.as_mut(), 1, 1, 1).await.unwrap().is_none());
        }
        assert_eq!(txn.list_decisions(1, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_decision_insert_is_a_conflict() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        seed_players(txn.as_mut(), 1).await;
        txn.insert_vote(vote(1, 1, "Isolate host", None)).await.unwrap();

        let decision = aggregate_team(txn.as_mut(), 1, 1, 1).await.unwrap().unwrap();
        let rival = DecisionEntity {
            id: decision.id + 100,
            ..decision
        };
        let err = txn.insert_decision(rival).await.unwrap_err();
        assert!(err.is_conflict_on(EntityKind::Decision));
        assert!(aggregate_team(txn.as_mut(), 1, 1, 1).await.unwrap().is_none());
        assert_eq!(txn.list_decisions(1, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lost_decision_race_reruns_the_unit_once() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        seed_players(txn.as_mut(), 1).await;
        txn.insert_vote(vote(1, 1, "Isolate host", None)).await.unwrap();
        txn.commit().await.unwrap();

        let attempts = AtomicUsize::new(0);
        let (store, attempts_ref) = (&store, &attempts);
        let created = retry_after_decision_race(|| async move {
            let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst);
            let mut txn = store.begin().await?;
            let created = aggregate_team(txn.as_mut(), 1, 1, 1).await?;
            if attempt == 0 {
                // another writer lands the same team decision first
                let rival = DecisionEntity {
                    id: 500,
                    ..created.clone().unwrap()
                };
                txn.insert_decision(rival).await?;
            }
            txn.commit().await?;
            Ok::<_, ServiceError>(created)
        })
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(created.is_some());
        let mut txn = store.begin().await.unwrap();
        assert_eq!(txn.list_decisions(1, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn only_decision_conflicts_are_retried_and_only_once() {
        let attempts = AtomicUsize::new(0);
        let attempts_ref = &attempts;
        let err = retry_after_decision_race(|| async move {
            attempts_ref.fetch_add(1, Ordering::SeqCst);
            Err::<(), ServiceError>(
                StorageError::conflict(EntityKind::Decision, "game 1 team 1 phase 1").into(),
            )
        })
        .await
        .unwrap_err();
        assert!(err.is_conflict_on(EntityKind::Decision));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        let attempts = AtomicUsize::new(0);
        let attempts_ref = &attempts;
        let err = retry_after_decision_race(|| async move {
            attempts_ref.fetch_add(1, Ordering::SeqCst);
            Err::<(), ServiceError>(
                StorageError::conflict(EntityKind::Vote, "player 1 phase 1").into(),
            )
        })
        .await
        .unwrap_err();
        assert!(err.is_conflict_on(EntityKind::Vote));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_team_gets_no_decision() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        seed_game(txn.as_mut()).await;
        assert!(aggregate_team(txn.as_mut(), 1, 1, 1).await.unwrap().is_none());
        assert!(txn.list_decisions(1, 1).await.unwrap().is_empty());
    }
}
