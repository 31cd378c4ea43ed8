use serde::{Deserialize, Serialize};

/// ID aliases for readability
pub type RoomId = u32;
pub type ConnectionId = String;
pub type QuizId = String;

/// Reserved username for the host seat of every room.
/// Compared case-insensitively; players may not join under it.
pub const HOST_NAME: &str = "Organizer";

/// Fixed countdown for open-response questions, in seconds.
pub const QRL_DURATION_SECS: u32 = 60;

/// Countdown between two questions, in seconds.
pub const TRANSITION_SECS: u32 = 3;

/// Tick cadence once panic mode is engaged.
pub const PANIC_INTERVAL_MS: u64 = 250;

/// Panic mode is only allowed while more than this many seconds remain.
pub const PANIC_MIN_REMAINING_QCM: u32 = 10;
pub const PANIC_MIN_REMAINING_QRL: u32 = 20;

/// Score multiplier for the first player to submit a fully correct QCM answer.
pub const FIRST_ANSWER_BONUS: f64 = 1.2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    /// Multiple choice; answered with a set of choice indices.
    Qcm,
    /// Open response; answered with free text, scored by the host.
    Qrl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub kind: QuestionKind,
    pub text: String,
    pub points: u32,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl QuizQuestion {
    /// Indices of the correct choices (empty for QRL).
    pub fn correct_choices(&self) -> Vec<usize> {
        self.choices
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_correct)
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// QCM countdown in seconds (QRL questions use a fixed duration).
    pub duration: u32,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub author: String,
    pub text: String,
    /// Server-side RFC3339 timestamp
    pub time: String,
}

/// One finished game, as appended to the persisted history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub quiz_title: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub player_count: usize,
    pub best_score: f64,
}

/// Aggregated per-question statistics, kept on the game for the results view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionStats {
    /// Per-choice selection counts at lock time.
    Qcm { counts: Vec<u32> },
    /// Counts per canonical score bucket: [zero, half, full].
    Qrl { histogram: [u32; 3] },
}

/// Returns true when the username is the reserved host seat.
pub fn is_host_name(username: &str) -> bool {
    username.eq_ignore_ascii_case(HOST_NAME)
}
