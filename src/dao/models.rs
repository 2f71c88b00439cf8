use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier of a scenario.
pub type ScenarioId = i64;
/// Identifier of a scenario phase.
pub type PhaseId = i64;
/// Identifier of an artifact.
pub type ArtifactId = i64;
/// Identifier of a game.
pub type GameId = i64;
/// Identifier of a team.
pub type TeamId = i64;
/// Identifier of a player.
pub type PlayerId = i64;
/// Identifier of a player vote.
pub type VoteId = i64;
/// Identifier of a team decision.
pub type DecisionId = i64;
/// Identifier of a score event.
pub type ScoreEventId = i64;
/// Identity of a Game Master account.
pub type GmId = Uuid;

/// Side a team plays on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    /// Offense.
    Red,
    /// Defense.
    Blue,
}

impl TeamRole {
    /// Lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Red => "red",
            TeamRole::Blue => "blue",
        }
    }
}

/// Outer status of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Created, waiting for the GM to start.
    Lobby,
    /// Running through the scenario phases.
    InProgress,
    /// Suspended by the GM.
    Paused,
    /// Ended, either after the last phase or by the GM.
    Finished,
}

/// State of the current phase of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    /// No phase has been started yet.
    NotStarted,
    /// Players read the briefing and artifacts.
    Briefing,
    /// Players may cast votes.
    OpenForDecisions,
    /// Votes are closed and decisions scored.
    DecisionLock,
    /// GM walks through the outcome of the phase.
    Resolution,
    /// The last phase is over.
    Complete,
}

/// Status of a team decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Not yet submitted.
    Draft,
    /// Aggregated from votes, awaiting scoring.
    Submitted,
    /// Frozen by the GM.
    Locked,
    /// Score awarded and score event emitted.
    Scored,
}

/// Kind of material an artifact carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Excerpt of a log file.
    LogSnippet,
    /// Screen capture.
    Screenshot,
    /// Email message.
    Email,
    /// Output of a security tool.
    ToolOutput,
    /// Threat intelligence report.
    IntelReport,
}

/// Scripted scenario a game is played from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioEntity {
    /// Primary key.
    pub id: ScenarioId,
    /// Human readable name, also the scoring table key.
    pub name: String,
    /// Optional description shown to the GM.
    pub description: Option<String>,
    /// Optional collaborative board URL.
    pub board_url: Option<String>,
    /// Import timestamp.
    pub created_at: SystemTime,
}

/// Ordered unit of a scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseEntity {
    /// Primary key.
    pub id: PhaseId,
    /// Owning scenario.
    pub scenario_id: ScenarioId,
    /// Zero-based dense position inside the scenario.
    pub order_index: i32,
    /// Display name.
    pub name: String,
    /// Briefing shown to both teams.
    pub briefing_text: String,
    /// Objective shown to the red team.
    pub red_objective: Option<String>,
    /// Objective shown to the blue team.
    pub blue_objective: Option<String>,
    /// Suggested duration of the phase.
    pub default_duration_seconds: Option<i32>,
    /// Raw `{role: [{name, description}]}` mapping, decoded on read.
    pub available_actions: Option<serde_json::Value>,
    /// Discussion prompts for the GM.
    pub gm_prompt_questions: Vec<String>,
}

impl PhaseEntity {
    /// Objective shown to a team playing `role`.
    pub fn objective_for(&self, role: TeamRole) -> Option<&str> {
        match role {
            TeamRole::Red => self.red_objective.as_deref(),
            TeamRole::Blue => self.blue_objective.as_deref(),
        }
    }
}

/// Briefing material attached to phases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactEntity {
    /// Primary key.
    pub id: ArtifactId,
    /// Display name.
    pub name: String,
    /// Material kind.
    pub kind: ArtifactKind,
    /// Short description.
    pub description: Option<String>,
    /// Link to an uploaded file.
    pub file_url: Option<String>,
    /// Link to embeddable content.
    pub embed_url: Option<String>,
    /// Inline text content.
    pub content: Option<String>,
    /// Facilitation notes, never shown to players.
    pub notes_for_gm: Option<String>,
}

/// `(phase, artifact, role)` visibility triple. A `None` role is visible to both teams.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PhaseArtifactLink {
    /// Phase the artifact belongs to.
    pub phase_id: PhaseId,
    /// Linked artifact.
    pub artifact_id: ArtifactId,
    /// Role allowed to see the artifact.
    pub team_role: Option<TeamRole>,
}

impl PhaseArtifactLink {
    /// Whether a player of `role` may see the linked artifact.
    pub fn visible_to(&self, role: TeamRole) -> bool {
        self.team_role.is_none_or(|linked| linked == role)
    }
}

/// One running (or finished) play-through of a scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameEntity {
    /// Primary key.
    pub id: GameId,
    /// Scenario being played.
    pub scenario_id: ScenarioId,
    /// Owning Game Master.
    pub gm_id: GmId,
    /// Outer status.
    pub status: GameStatus,
    /// State of the current phase.
    pub phase_state: PhaseState,
    /// Phase currently played, if started.
    pub current_phase_id: Option<PhaseId>,
    /// Join code of the red team.
    pub red_team_code: String,
    /// Join code of the first blue team.
    pub blue_team_code: String,
    /// Read-only scoreboard token.
    pub audience_code: String,
    /// Free-form settings supplied at creation.
    pub settings: serde_json::Map<String, serde_json::Value>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last mutation timestamp.
    pub updated_at: SystemTime,
}

/// Team of a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Primary key.
    pub id: TeamId,
    /// Owning game.
    pub game_id: GameId,
    /// Display name ("Red", "Blue 1").
    pub name: String,
    /// Side played.
    pub role: TeamRole,
    /// Join code granting membership.
    pub code: String,
}

/// Participant attached to a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Primary key.
    pub id: PlayerId,
    /// Owning game.
    pub game_id: GameId,
    /// Team joined.
    pub team_id: TeamId,
    /// Name chosen at join time.
    pub display_name: String,
    /// First join timestamp.
    pub joined_at: SystemTime,
}

/// A single player's vote for a phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    /// Primary key.
    pub id: VoteId,
    /// Game voted in.
    pub game_id: GameId,
    /// Team of the voter.
    pub team_id: TeamId,
    /// Phase voted for.
    pub phase_id: PhaseId,
    /// Voter.
    pub player_id: PlayerId,
    /// Chosen action.
    pub selected_action: String,
    /// Self-assessed organisational effectiveness, 1..=10.
    pub effectiveness_rating: i32,
    /// Free comments, at most 500 characters.
    pub comments: Option<String>,
    /// Reasoning folded into the team justification.
    pub justification: Option<String>,
    /// Last submission timestamp.
    pub voted_at: SystemTime,
}

/// Structured payload of a team decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(untagged)]
pub enum DecisionActions {
    /// Aggregated from votes.
    Tally {
        /// Chosen actions, primary first.
        selected: Vec<String>,
        /// Number of votes per action, in first-vote order.
        #[serde(default)]
        vote_counts: IndexMap<String, i64>,
    },
    /// Bare list of actions, primary first.
    Plain(Vec<String>),
}

impl DecisionActions {
    /// Actions retained by the team, primary first.
    pub fn selected(&self) -> &[String] {
        match self {
            DecisionActions::Tally { selected, .. } => selected,
            DecisionActions::Plain(selected) => selected,
        }
    }

    /// Action the score is computed from.
    pub fn primary(&self) -> Option<&str> {
        self.selected().first().map(String::as_str)
    }
}

/// Consolidated team decision for a phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionEntity {
    /// Primary key.
    pub id: DecisionId,
    /// Game decided in.
    pub game_id: GameId,
    /// Deciding team.
    pub team_id: TeamId,
    /// Phase decided for.
    pub phase_id: PhaseId,
    /// Chosen actions and vote tally.
    pub actions: DecisionActions,
    /// Concatenated player justifications.
    pub free_text_justification: Option<String>,
    /// Lifecycle status.
    pub status: DecisionStatus,
    /// Points awarded once scored.
    pub score_awarded: Option<i32>,
    /// Scoring explanation or GM remarks.
    pub gm_notes: Option<String>,
    /// Creation timestamp.
    pub submitted_at: SystemTime,
}

/// Append-only score delta for a team in a phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEventEntity {
    /// Primary key.
    pub id: ScoreEventId,
    /// Game scored in.
    pub game_id: GameId,
    /// Team credited.
    pub team_id: TeamId,
    /// Phase credited.
    pub phase_id: PhaseId,
    /// Signed number of points.
    pub delta: i32,
    /// Human readable reason.
    pub reason: String,
    /// Emission timestamp.
    pub created_at: SystemTime,
}

/// Private GM notes for a phase of a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GmNotesEntity {
    /// Primary key.
    pub id: i64,
    /// Game the notes belong to.
    pub game_id: GameId,
    /// Phase the notes belong to.
    pub phase_id: PhaseId,
    /// Author.
    pub gm_id: GmId,
    /// Note body.
    pub notes: String,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last edit timestamp.
    pub updated_at: SystemTime,
}

/// Risk bucket derived from effectiveness ratings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RiskRating {
    /// Average rating ≤ 2.
    Critical,
    /// Average rating ≤ 4.
    High,
    /// Average rating ≤ 6.
    Medium,
    /// Average rating ≤ 8.
    Low,
    /// Average rating above 8.
    #[serde(rename = "Very Low")]
    VeryLow,
    /// No rating available.
    #[serde(rename = "Not Rated")]
    NotRated,
}

impl RiskRating {
    /// Bucket an average effectiveness rating.
    pub fn from_average(average: Option<f64>) -> Self {
        match average {
            None => RiskRating::NotRated,
            Some(avg) if avg <= 2.0 => RiskRating::Critical,
            Some(avg) if avg <= 4.0 => RiskRating::High,
            Some(avg) if avg <= 6.0 => RiskRating::Medium,
            Some(avg) if avg <= 8.0 => RiskRating::Low,
            Some(_) => RiskRating::VeryLow,
        }
    }
}

/// Comment captured in the after-action report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ReportComment {
    /// Author name.
    pub player_name: String,
    /// Author's side.
    pub team_role: TeamRole,
    /// Rating given with the comment.
    pub rating: i32,
    /// Comment body.
    pub comments: String,
}

/// Per-phase section of the after-action report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PhaseAnalysis {
    /// Analysed phase.
    pub phase_id: PhaseId,
    /// Phase name.
    pub phase_name: String,
    /// Phase position.
    pub phase_order: i32,
    /// Mean effectiveness rating, two decimals.
    pub average_rating: Option<f64>,
    /// Risk bucket of the average.
    pub risk_rating: RiskRating,
    /// Number of votes cast.
    pub total_responses: i64,
    /// Non-empty vote comments.
    pub comments: Vec<ReportComment>,
    /// GM notes recorded for the phase.
    pub gm_notes: Option<String>,
}

/// Persisted after-action report of a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportEntity {
    /// Primary key.
    pub id: i64,
    /// Reported game.
    pub game_id: GameId,
    /// Generating GM.
    pub gm_id: GmId,
    /// Overall risk bucket.
    pub overall_risk_rating: RiskRating,
    /// Mean of the phase averages, two decimals.
    pub overall_risk_score: f64,
    /// Phase sections in scenario order.
    pub phase_analyses: Vec<PhaseAnalysis>,
    /// Generation timestamp.
    pub generated_at: SystemTime,
}
