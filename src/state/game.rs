use crate::protocol::{PlayerScore, QuestionView, ServerMessage};
use crate::state::evaluation::Evaluation;
use crate::state::AppState;
use crate::timer::TickKind;
use crate::types::*;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Session state machine for one question cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    QuestionInit,
    QuestionActive,
    /// `auto` is true when the countdown expired, false when every player
    /// submitted early.
    Locked { auto: bool },
    Transition,
    Evaluation,
    Ended,
}

/// Per-room question/answer state, created when the host starts the game and
/// retained after the last question for the results view.
#[derive(Debug)]
pub struct Game {
    pub quiz: Quiz,
    pub current_index: usize,
    pub phase: GamePhase,
    pub remaining_time: u32,
    pub paused: bool,
    pub panic_used: bool,
    pub qcm_selections: HashMap<String, BTreeSet<usize>>,
    pub qrl_answers: HashMap<String, String>,
    pub locked: HashMap<String, bool>,
    /// Remaining seconds at the moment of a manual submit (first-answer bonus)
    pub submit_times: HashMap<String, u32>,
    pub scores: HashMap<String, f64>,
    pub stats: Vec<QuestionStats>,
    pub evaluation: Option<Evaluation>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl Game {
    fn new(quiz: Quiz) -> Self {
        Self {
            quiz,
            current_index: 0,
            phase: GamePhase::QuestionInit,
            remaining_time: 0,
            paused: false,
            panic_used: false,
            qcm_selections: HashMap::new(),
            qrl_answers: HashMap::new(),
            locked: HashMap::new(),
            submit_times: HashMap::new(),
            scores: HashMap::new(),
            stats: Vec::new(),
            evaluation: None,
            started_at: chrono::Utc::now(),
        }
    }

    pub fn current_question(&self) -> &QuizQuestion {
        &self.quiz.questions[self.current_index]
    }

    pub fn is_last_question(&self) -> bool {
        self.current_index + 1 >= self.quiz.questions.len()
    }

    pub fn question_duration(&self) -> u32 {
        match self.current_question().kind {
            QuestionKind::Qcm => self.quiz.duration,
            QuestionKind::Qrl => QRL_DURATION_SECS,
        }
    }

    fn reset_question_state(&mut self) {
        self.qcm_selections.clear();
        self.qrl_answers.clear();
        self.locked.clear();
        self.submit_times.clear();
        self.evaluation = None;
        self.panic_used = false;
        self.paused = false;
    }
}

/// Guard helper: every session operation on an absent room or a not-yet
/// started game degrades to this error, never a panic.
pub const NO_ACTIVE_GAME: &str = "No active game";

impl AppState {
    /// Host starts the session: build the game from the catalog quiz and push
    /// the first question.
    pub async fn start_game(self: &Arc<Self>, room_id: RoomId) -> Result<(), String> {
        let quiz_id = {
            let rooms = self.rooms.read().await;
            let room = rooms.get(&room_id).ok_or(NO_ACTIVE_GAME)?;
            if room.game.is_some() {
                return Err("Game already started".to_string());
            }
            room.quiz_id.clone()
        };
        let quiz = self
            .catalog
            .get_quiz_by_id(&quiz_id)
            .await
            .ok_or_else(|| format!("Quiz {} not found", quiz_id))?;
        if quiz.questions.is_empty() {
            return Err("Quiz has no questions".to_string());
        }

        {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(&room_id).ok_or(NO_ACTIVE_GAME)?;
            room.game = Some(Game::new(quiz));
        }
        tracing::info!("Game started in room {}", room_id);
        self.push_question(room_id).await
    }

    /// Broadcast the current question, reset per-player answer state and
    /// start the countdown. Boxed: the countdown task it spawns calls back in
    /// here on transition expiry, so an `async fn` future type would be
    /// recursive.
    fn push_question(
        self: &Arc<Self>,
        room_id: RoomId,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> {
        let state = Arc::clone(self);
        Box::pin(async move {
            let (msg, duration) = {
                let mut rooms = state.rooms.write().await;
                let room = rooms.get_mut(&room_id).ok_or(NO_ACTIVE_GAME)?;
                let game = room.game.as_mut().ok_or(NO_ACTIVE_GAME)?;
                game.reset_question_state();
                let duration = game.question_duration();
                game.remaining_time = duration;
                game.phase = GamePhase::QuestionActive;
                let msg = ServerMessage::Question {
                    question: QuestionView::from(game.current_question()),
                    index: game.current_index,
                    is_last: game.is_last_question(),
                };
                (msg, duration)
            };
            state.send_to_room(room_id, msg).await;
            state
                .start_timer(room_id, duration, TickKind::Question, 1000)
                .await;
            Ok(())
        })
    }

    /// QCM choice toggle. Its own inverse; returns whether the index is now
    /// selected.
    pub async fn toggle_selection(
        &self,
        room_id: RoomId,
        username: &str,
        choice_index: usize,
    ) -> Result<bool, String> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(&room_id).ok_or(NO_ACTIVE_GAME)?;
        let game = room.game.as_mut().ok_or(NO_ACTIVE_GAME)?;

        if game.phase != GamePhase::QuestionActive {
            return Err("Question is not open".to_string());
        }
        if game.locked.get(username).copied().unwrap_or(false) {
            return Err("Answer already submitted".to_string());
        }
        if game.current_question().kind != QuestionKind::Qcm {
            return Err("Not a multiple-choice question".to_string());
        }
        if choice_index >= game.current_question().choices.len() {
            return Err("Choice index out of range".to_string());
        }

        let selections = game.qcm_selections.entry(username.to_string()).or_default();
        let now_selected = if selections.contains(&choice_index) {
            selections.remove(&choice_index);
            false
        } else {
            selections.insert(choice_index);
            true
        };
        Ok(now_selected)
    }

    /// Current selection set for a player (empty when none).
    pub async fn current_selection(
        &self,
        room_id: RoomId,
        username: &str,
    ) -> Result<BTreeSet<usize>, String> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(&room_id).ok_or(NO_ACTIVE_GAME)?;
        let game = room.game.as_ref().ok_or(NO_ACTIVE_GAME)?;
        Ok(game.qcm_selections.get(username).cloned().unwrap_or_default())
    }

    /// Manual lock for one player. Idempotent under duplicate submits; when
    /// every non-host player is locked the question finishes early.
    pub async fn submit_answer(
        self: &Arc<Self>,
        room_id: RoomId,
        username: &str,
        qrl_text: Option<String>,
    ) -> Result<(), String> {
        let all_locked = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(&room_id).ok_or(NO_ACTIVE_GAME)?;
            let player_names = room.player_names();
            let game = room.game.as_mut().ok_or(NO_ACTIVE_GAME)?;

            if game.phase != GamePhase::QuestionActive {
                return Err("Question is not open".to_string());
            }
            if game.locked.get(username).copied().unwrap_or(false) {
                // Duplicate submit, nothing to do
                return Ok(());
            }

            if let Some(text) = qrl_text {
                game.qrl_answers.insert(username.to_string(), text);
            }
            game.locked.insert(username.to_string(), true);
            game.submit_times.insert(username.to_string(), game.remaining_time);

            !player_names.is_empty()
                && player_names
                    .iter()
                    .all(|name| game.locked.get(name).copied().unwrap_or(false))
        };

        tracing::debug!("{} submitted in room {}", username, room_id);
        if all_locked {
            self.cancel_timer(room_id).await;
            self.finish_question(room_id, false).await;
        }
        Ok(())
    }

    /// Countdown expiry: force-submit everyone still open (host excepted)
    /// with their current partial answer, then lock the question.
    pub async fn handle_question_timeout(self: &Arc<Self>, room_id: RoomId) {
        self.finish_question(room_id, true).await;
    }

    /// Lock the question and either broadcast QCM results or hand off to the
    /// QRL evaluation workflow.
    async fn finish_question(self: &Arc<Self>, room_id: RoomId, auto: bool) {
        let mut outgoing: Vec<ServerMessage> = Vec::new();
        let mut host_msg: Option<ServerMessage> = None;

        {
            let mut rooms = self.rooms.write().await;
            let Some(room) = rooms.get_mut(&room_id) else { return };
            let player_names = room.player_names();
            let Some(game) = room.game.as_mut() else { return };
            if game.phase != GamePhase::QuestionActive {
                // Already locked by the other path
                return;
            }
            game.phase = GamePhase::Locked { auto };

            if auto {
                for name in &player_names {
                    game.locked.entry(name.clone()).or_insert(true);
                }
            }

            match game.current_question().kind {
                QuestionKind::Qcm => {
                    let counts = aggregate_qcm(game, &player_names);
                    award_qcm_scores(game, &player_names);
                    game.stats.push(QuestionStats::Qcm { counts: counts.clone() });
                    game.phase = GamePhase::Transition;
                    outgoing.push(ServerMessage::QcmStats { counts });
                    outgoing.push(ServerMessage::Scores { scores: snapshot_scores(game) });
                }
                QuestionKind::Qrl => {
                    let mut answers: HashMap<String, String> = HashMap::new();
                    for name in &player_names {
                        let text = game.qrl_answers.get(name).cloned().unwrap_or_default();
                        answers.insert(name.clone(), text);
                    }
                    let eval = Evaluation::begin(&answers);
                    if eval.is_complete() {
                        // Nobody to evaluate; skip straight to transition
                        game.stats.push(QuestionStats::Qrl { histogram: [0; 3] });
                        game.phase = GamePhase::Transition;
                        outgoing.push(ServerMessage::EvaluationOver { histogram: [0; 3] });
                    } else {
                        host_msg = Some(ServerMessage::QrlAnswerToRate {
                            username: eval.current_username().unwrap_or_default().to_string(),
                            answer: eval.current_answer().unwrap_or_default().to_string(),
                            index: eval.cursor() as usize,
                            total: eval.len(),
                        });
                        game.phase = GamePhase::Evaluation;
                        game.evaluation = Some(eval);
                    }
                }
            }
        }

        tracing::info!("Question locked in room {} (auto: {})", room_id, auto);
        for msg in outgoing {
            self.send_to_room(room_id, msg).await;
        }
        if let Some(msg) = host_msg {
            self.send_to_host(room_id, msg).await;
        }
    }

    /// Host scores the QRL answer under review and the workflow advances.
    /// An out-of-range score is rejected without moving the cursor.
    pub async fn score_answer(
        self: &Arc<Self>,
        room_id: RoomId,
        multiplier: f32,
    ) -> Result<(), String> {
        let mut outgoing: Vec<ServerMessage> = Vec::new();
        let mut host_msg: Option<ServerMessage> = None;

        {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(&room_id).ok_or(NO_ACTIVE_GAME)?;
            let game = room.game.as_mut().ok_or(NO_ACTIVE_GAME)?;
            if game.phase != GamePhase::Evaluation {
                return Err("No evaluation in progress".to_string());
            }
            let points = game.current_question().points;
            let eval = game.evaluation.as_mut().ok_or("No evaluation in progress")?;

            eval.record_score(multiplier)?;
            eval.advance();

            if eval.is_complete() {
                let (corrections, histogram, _) = eval.finish(points);
                for (name, earned) in &corrections {
                    *game.scores.entry(name.clone()).or_insert(0.0) += earned;
                }
                game.stats.push(QuestionStats::Qrl { histogram });
                game.evaluation = None;
                game.phase = GamePhase::Transition;
                outgoing.push(ServerMessage::PlayerQrlCorrection { corrections });
                outgoing.push(ServerMessage::EvaluationOver { histogram });
                outgoing.push(ServerMessage::Scores { scores: snapshot_scores(game) });
            } else {
                host_msg = Some(ServerMessage::QrlAnswerToRate {
                    username: eval.current_username().unwrap_or_default().to_string(),
                    answer: eval.current_answer().unwrap_or_default().to_string(),
                    index: eval.cursor() as usize,
                    total: eval.len(),
                });
            }
        }

        for msg in outgoing {
            self.send_to_room(room_id, msg).await;
        }
        if let Some(msg) = host_msg {
            self.send_to_host(room_id, msg).await;
        }
        Ok(())
    }

    /// Host advances past the transition screen: either the 3 s countdown to
    /// the next question, or the end of the game after the last one.
    pub async fn next_question(self: &Arc<Self>, room_id: RoomId) -> Result<(), String> {
        let is_last = {
            let rooms = self.rooms.read().await;
            let room = rooms.get(&room_id).ok_or(NO_ACTIVE_GAME)?;
            let game = room.game.as_ref().ok_or(NO_ACTIVE_GAME)?;
            if game.phase != GamePhase::Transition {
                return Err("Not in transition".to_string());
            }
            game.is_last_question()
        };

        if is_last {
            self.end_game(room_id).await
        } else {
            self.start_timer(room_id, TRANSITION_SECS, TickKind::Transition, 1000)
                .await;
            Ok(())
        }
    }

    /// Transition countdown expiry: move to the next question.
    pub async fn handle_transition_timeout(self: &Arc<Self>, room_id: RoomId) {
        {
            let mut rooms = self.rooms.write().await;
            let Some(room) = rooms.get_mut(&room_id) else { return };
            let Some(game) = room.game.as_mut() else { return };
            if game.phase != GamePhase::Transition || game.is_last_question() {
                return;
            }
            game.current_index += 1;
            game.phase = GamePhase::QuestionInit;
        }
        if let Err(e) = self.push_question(room_id).await {
            tracing::warn!("Failed to push next question in room {}: {}", room_id, e);
        }
    }

    /// End of game: no further timers run; the game record is retained for
    /// the results view and a history entry is appended.
    async fn end_game(self: &Arc<Self>, room_id: RoomId) -> Result<(), String> {
        self.cancel_timer(room_id).await;

        let (record, scores) = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(&room_id).ok_or(NO_ACTIVE_GAME)?;
            let player_count = room.player_names().len();
            let game = room.game.as_mut().ok_or(NO_ACTIVE_GAME)?;
            game.phase = GamePhase::Ended;
            let scores = snapshot_scores(game);
            let best_score = scores.first().map(|s| s.score).unwrap_or(0.0);
            let record = GameRecord {
                quiz_title: game.quiz.title.clone(),
                started_at: game.started_at,
                player_count,
                best_score,
            };
            (record, scores)
        };

        self.history.add(record).await;
        self.send_to_room(room_id, ServerMessage::Scores { scores }).await;
        self.send_to_room(room_id, ServerMessage::GameOver).await;
        tracing::info!("Game over in room {}", room_id);
        Ok(())
    }

    /// Cleanup after a player leaves mid-game; may finish the question early
    /// if everyone remaining has already locked in.
    pub async fn player_exited(self: &Arc<Self>, room_id: RoomId, username: &str) {
        let finish_early = {
            let mut rooms = self.rooms.write().await;
            let Some(room) = rooms.get_mut(&room_id) else { return };
            let player_names = room.player_names();
            let Some(game) = room.game.as_mut() else { return };

            game.qcm_selections.remove(username);
            game.qrl_answers.remove(username);
            game.locked.remove(username);
            game.submit_times.remove(username);

            game.phase == GamePhase::QuestionActive
                && !player_names.is_empty()
                && player_names
                    .iter()
                    .all(|name| game.locked.get(name).copied().unwrap_or(false))
        };
        if finish_early {
            self.cancel_timer(room_id).await;
            self.finish_question(room_id, false).await;
        }
    }
}

/// Per-choice selection counts at lock time.
fn aggregate_qcm(game: &Game, player_names: &[String]) -> Vec<u32> {
    let mut counts = vec![0u32; game.current_question().choices.len()];
    for name in player_names {
        if let Some(selections) = game.qcm_selections.get(name) {
            for &idx in selections {
                if let Some(slot) = counts.get_mut(idx) {
                    *slot += 1;
                }
            }
        }
    }
    counts
}

/// Full points for an exact match with the correct choice set; the unique
/// earliest correct submitter gets the first-answer bonus.
fn award_qcm_scores(game: &mut Game, player_names: &[String]) {
    let correct: BTreeSet<usize> = game.current_question().correct_choices().into_iter().collect();
    let points = f64::from(game.current_question().points);

    let winners: Vec<&String> = player_names
        .iter()
        .filter(|name| {
            game.qcm_selections
                .get(*name)
                .map(|sel| *sel == correct)
                .unwrap_or(correct.is_empty())
        })
        .collect();

    // Greatest remaining time at submit means earliest manual submit
    let bonus_winner = {
        let mut best: Option<(&String, u32)> = None;
        let mut tied = false;
        for name in &winners {
            if let Some(&t) = game.submit_times.get(*name) {
                match best {
                    Some((_, bt)) if t > bt => {
                        best = Some((name, t));
                        tied = false;
                    }
                    Some((_, bt)) if t == bt => tied = true,
                    None => best = Some((name, t)),
                    _ => {}
                }
            }
        }
        if tied { None } else { best.map(|(name, _)| (*name).clone()) }
    };

    for name in winners {
        let earned = if bonus_winner.as_deref() == Some(name.as_str()) {
            points * FIRST_ANSWER_BONUS
        } else {
            points
        };
        *game.scores.entry(name.clone()).or_insert(0.0) += earned;
    }
}

/// Scores sorted best-first, ties by name.
fn snapshot_scores(game: &Game) -> Vec<PlayerScore> {
    let mut scores: Vec<PlayerScore> = game
        .scores
        .iter()
        .map(|(username, score)| PlayerScore {
            username: username.clone(),
            score: *score,
        })
        .collect();
    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.username.cmp(&b.username))
    });
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;

    async fn setup_game(qcm_first: bool) -> (Arc<AppState>, RoomId) {
        let state = test_state();
        let room_id = state.create_room("1", "host-conn".to_string()).await.unwrap();
        state.add_player(room_id, "Alice", "alice-conn".to_string()).await.unwrap();
        state.add_player(room_id, "Bob", "bob-conn".to_string()).await.unwrap();
        state.start_game(room_id).await.unwrap();
        if !qcm_first {
            // Jump the session to the QRL question
            let mut rooms = state.rooms.write().await;
            let game = rooms.get_mut(&room_id).unwrap().game.as_mut().unwrap();
            game.current_index = 1;
            game.phase = GamePhase::QuestionActive;
            game.remaining_time = QRL_DURATION_SECS;
            drop(rooms);
        }
        (state, room_id)
    }

    #[tokio::test]
    async fn test_selection_toggle_is_its_own_inverse() {
        let (state, room_id) = setup_game(true).await;

        let before = state.current_selection(room_id, "Alice").await.unwrap();
        assert!(state.toggle_selection(room_id, "Alice", 0).await.unwrap());
        assert!(!state.toggle_selection(room_id, "Alice", 0).await.unwrap());
        let after = state.current_selection(room_id, "Alice").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_selection_guards() {
        let (state, room_id) = setup_game(true).await;

        assert!(state.toggle_selection(room_id, "Alice", 99).await.is_err());
        state.submit_answer(room_id, "Alice", None).await.unwrap();
        assert!(state.toggle_selection(room_id, "Alice", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_operations_without_game_are_guarded() {
        let state = test_state();
        let room_id = state.create_room("1", "host".to_string()).await.unwrap();

        assert_eq!(
            state.toggle_selection(room_id, "Alice", 0).await,
            Err(NO_ACTIVE_GAME.to_string())
        );
        assert!(state.submit_answer(9999, "Alice", None).await.is_err());
        assert!(state.next_question(room_id).await.is_err());
        assert!(state.score_answer(room_id, 1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_all_players_submitting_finishes_early() {
        let (state, room_id) = setup_game(true).await;

        state.toggle_selection(room_id, "Alice", 0).await.unwrap();
        state.submit_answer(room_id, "Alice", None).await.unwrap();
        state.submit_answer(room_id, "Bob", None).await.unwrap();

        let rooms = state.rooms.read().await;
        let game = rooms[&room_id].game.as_ref().unwrap();
        assert_eq!(game.phase, GamePhase::Transition);
        assert!(matches!(game.stats[0], QuestionStats::Qcm { .. }));
        // No active countdown may survive the early lock
        assert!(!state.timers.read().await.contains_key(&room_id));
    }

    #[tokio::test]
    async fn test_duplicate_submit_is_idempotent() {
        let (state, room_id) = setup_game(true).await;

        state.submit_answer(room_id, "Alice", None).await.unwrap();
        state.submit_answer(room_id, "Alice", None).await.unwrap();

        let rooms = state.rooms.read().await;
        let game = rooms[&room_id].game.as_ref().unwrap();
        // Bob has not submitted, the question must still be open
        assert_eq!(game.phase, GamePhase::QuestionActive);
    }

    #[tokio::test]
    async fn test_timeout_auto_submits_partial_answers() {
        let (state, room_id) = setup_game(true).await;

        state.toggle_selection(room_id, "Alice", 0).await.unwrap();
        state.handle_question_timeout(room_id).await;

        let rooms = state.rooms.read().await;
        let game = rooms[&room_id].game.as_ref().unwrap();
        assert_eq!(game.phase, GamePhase::Transition);
        assert!(game.locked["Alice"]);
        assert!(game.locked["Bob"]);
        // The host seat is exempt from auto-submit
        assert!(!game.locked.contains_key(HOST_NAME));
        match &game.stats[0] {
            QuestionStats::Qcm { counts } => assert_eq!(counts, &vec![1, 0]),
            other => panic!("expected QCM stats, got {:?}", other),
        }
        // Alice alone matched the correct set
        assert_eq!(game.scores["Alice"], 40.0);
        assert!(!game.scores.contains_key("Bob"));
    }

    #[tokio::test]
    async fn test_first_correct_submitter_gets_bonus() {
        let (state, room_id) = setup_game(true).await;

        // Both correct; Alice submits with more time left
        {
            let mut rooms = state.rooms.write().await;
            let game = rooms.get_mut(&room_id).unwrap().game.as_mut().unwrap();
            game.remaining_time = 20;
        }
        state.toggle_selection(room_id, "Alice", 0).await.unwrap();
        state.submit_answer(room_id, "Alice", None).await.unwrap();
        {
            let mut rooms = state.rooms.write().await;
            let game = rooms.get_mut(&room_id).unwrap().game.as_mut().unwrap();
            game.remaining_time = 10;
        }
        state.toggle_selection(room_id, "Bob", 0).await.unwrap();
        state.submit_answer(room_id, "Bob", None).await.unwrap();

        let rooms = state.rooms.read().await;
        let game = rooms[&room_id].game.as_ref().unwrap();
        assert_eq!(game.scores["Alice"], 40.0 * FIRST_ANSWER_BONUS);
        assert_eq!(game.scores["Bob"], 40.0);
    }

    #[tokio::test]
    async fn test_qrl_evaluation_flow() {
        let (state, room_id) = setup_game(false).await;

        state
            .submit_answer(room_id, "Alice", Some("borrow checker".to_string()))
            .await
            .unwrap();
        state
            .submit_answer(room_id, "Bob", Some("moves".to_string()))
            .await
            .unwrap();

        {
            let rooms = state.rooms.read().await;
            let game = rooms[&room_id].game.as_ref().unwrap();
            assert_eq!(game.phase, GamePhase::Evaluation);
            let eval = game.evaluation.as_ref().unwrap();
            assert_eq!(eval.current_username(), Some("Alice"));
        }

        // Out-of-range score is rejected and does not advance
        assert!(state.score_answer(room_id, 0.3).await.is_err());
        {
            let rooms = state.rooms.read().await;
            let eval = rooms[&room_id].game.as_ref().unwrap().evaluation.as_ref().unwrap();
            assert_eq!(eval.current_username(), Some("Alice"));
        }

        state.score_answer(room_id, 1.0).await.unwrap();
        state.score_answer(room_id, 0.5).await.unwrap();

        let rooms = state.rooms.read().await;
        let game = rooms[&room_id].game.as_ref().unwrap();
        assert_eq!(game.phase, GamePhase::Transition);
        assert!(game.evaluation.is_none());
        assert_eq!(game.scores["Alice"], 60.0);
        assert_eq!(game.scores["Bob"], 30.0);
        match &game.stats[0] {
            QuestionStats::Qrl { histogram } => {
                assert_eq!(histogram.iter().sum::<u32>(), 2);
                assert_eq!(*histogram, [0, 1, 1]);
            }
            other => panic!("expected QRL stats, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_next_question_on_last_ends_game() {
        let (state, room_id) = setup_game(false).await;

        state.submit_answer(room_id, "Alice", Some("a".to_string())).await.unwrap();
        state.submit_answer(room_id, "Bob", Some("b".to_string())).await.unwrap();
        state.score_answer(room_id, 1.0).await.unwrap();
        state.score_answer(room_id, 0.0).await.unwrap();

        state.next_question(room_id).await.unwrap();

        let rooms = state.rooms.read().await;
        let game = rooms[&room_id].game.as_ref().unwrap();
        assert_eq!(game.phase, GamePhase::Ended);
        drop(rooms);

        // Room survives for the results view, and the history got a record
        assert!(state.rooms.read().await.contains_key(&room_id));
    }

    #[tokio::test]
    async fn test_transition_timeout_advances_to_next_question() {
        let (state, room_id) = setup_game(true).await;

        state.handle_question_timeout(room_id).await;
        state.handle_transition_timeout(room_id).await;

        let rooms = state.rooms.read().await;
        let game = rooms[&room_id].game.as_ref().unwrap();
        assert_eq!(game.current_index, 1);
        assert_eq!(game.phase, GamePhase::QuestionActive);
        assert_eq!(game.remaining_time, QRL_DURATION_SECS);
        drop(rooms);
        state.cancel_timer(room_id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_countdown_pushes_next_question() {
        let (state, room_id) = setup_game(true).await;

        state.handle_question_timeout(room_id).await;
        state.next_question(room_id).await.unwrap();

        // The spawned countdown expires and pushes the next question itself
        tokio::time::timeout(std::time::Duration::from_secs(30), async {
            loop {
                {
                    let rooms = state.rooms.read().await;
                    let game = rooms[&room_id].game.as_ref().unwrap();
                    if game.phase == GamePhase::QuestionActive && game.current_index == 1 {
                        break;
                    }
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("transition expiry did not push the next question");
        state.cancel_timer(room_id).await;
    }

    #[tokio::test]
    async fn test_player_exit_mid_question_can_finish_early() {
        let (state, room_id) = setup_game(true).await;

        state.submit_answer(room_id, "Alice", None).await.unwrap();
        state.leave_room(room_id, "Bob").await;

        let rooms = state.rooms.read().await;
        let game = rooms[&room_id].game.as_ref().unwrap();
        assert_eq!(game.phase, GamePhase::Transition);
    }
}
