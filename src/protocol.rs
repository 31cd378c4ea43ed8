use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom {
        quiz_id: QuizId,
    },
    JoinGame {
        room_id: RoomId,
        username: String,
    },
    ValidateRoomId {
        room_id: RoomId,
    },
    LeaveGame {
        room_id: RoomId,
    },
    UpdateSelection {
        room_id: RoomId,
        choice_index: usize,
        is_selected: bool,
    },
    SubmitAnswer {
        room_id: RoomId,
        /// Free-text answer; only meaningful for QRL questions
        qrl_text: Option<String>,
    },
    NewMessage {
        room_id: RoomId,
        text: String,
    },
    GetMessages {
        room_id: RoomId,
    },
    // Host-only messages
    Start {
        room_id: RoomId,
    },
    NextQuestion {
        room_id: RoomId,
    },
    PauseTimer {
        room_id: RoomId,
    },
    PanicMode {
        room_id: RoomId,
    },
    ToggleRoomLock {
        room_id: RoomId,
    },
    BanPlayer {
        room_id: RoomId,
        username: String,
    },
    /// Score the QRL answer currently under review: 0.0, 0.5 or 1.0
    ScoreAnswer {
        room_id: RoomId,
        multiplier: f32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomCreated {
        room_id: RoomId,
    },
    /// Synchronous outcome of a join attempt
    UsernameValidation {
        is_valid: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    RoomValidation {
        is_room: bool,
        is_locked: bool,
    },
    PlayerJoined {
        username: String,
    },
    Question {
        question: QuestionView,
        index: usize,
        is_last: bool,
    },
    Time {
        remaining: u32,
    },
    TransitionTime {
        remaining: u32,
    },
    TimerPaused {
        paused: bool,
    },
    PanicModeStarted,
    /// Per-choice selection counts once a QCM question locks
    QcmStats {
        counts: Vec<u32>,
    },
    Scores {
        scores: Vec<PlayerScore>,
    },
    /// Sent to the host only: the next QRL answer to score
    QrlAnswerToRate {
        username: String,
        answer: String,
        index: usize,
        total: usize,
    },
    PlayerQrlCorrection {
        corrections: HashMap<String, f64>,
    },
    /// Counts per canonical score bucket: [zero, half, full]
    EvaluationOver {
        histogram: [u32; 3],
    },
    ReceivedMessage {
        message: ChatMessage,
    },
    Messages {
        list: Vec<ChatMessage>,
    },
    PlayerLeft {
        username: String,
    },
    RemovedPlayer {
        username: String,
    },
    HostLeft,
    GameOver,
    Error {
        code: String,
        msg: String,
    },
}

/// Question payload pushed to clients: the answer key is stripped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub kind: QuestionKind,
    pub text: String,
    pub points: u32,
    pub choices: Vec<String>,
}

impl From<&QuizQuestion> for QuestionView {
    fn from(q: &QuizQuestion) -> Self {
        Self {
            kind: q.kind,
            text: q.text.clone(),
            points: q.points,
            choices: q.choices.iter().map(|c| c.text.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerScore {
    pub username: String,
    pub score: f64,
}
