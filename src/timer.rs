//! Per-room countdown scheduler.
//!
//! One cancellable repeating task per active room, kept in an arena keyed by
//! room id. The task holds only the room id (plus the shared state handle)
//! back into the registry, never the Room itself.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::*;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

/// What a countdown is for; decides the tick event and the terminal callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// Question countdown: emits `Time`, expiry locks the question.
    Question,
    /// Between-questions countdown: emits `TransitionTime`, expiry pushes the
    /// next question.
    Transition,
}

/// Handle for one room's active countdown.
#[derive(Debug)]
pub struct TimerTask {
    handle: JoinHandle<()>,
    paused: Arc<AtomicBool>,
    remaining: Arc<AtomicI64>,
    pub kind: TickKind,
}

impl TimerTask {
    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

impl AppState {
    /// Begin a countdown for the room. A room has at most one active task:
    /// any previous countdown is cancelled first.
    pub async fn start_timer(
        self: &Arc<Self>,
        room_id: RoomId,
        duration_secs: u32,
        kind: TickKind,
        interval_ms: u64,
    ) {
        let paused = Arc::new(AtomicBool::new(false));
        let remaining = Arc::new(AtomicI64::new(i64::from(duration_secs)));
        self.spawn_ticker(room_id, kind, interval_ms, paused, remaining)
            .await;
    }

    async fn spawn_ticker(
        self: &Arc<Self>,
        room_id: RoomId,
        kind: TickKind,
        interval_ms: u64,
        paused: Arc<AtomicBool>,
        remaining: Arc<AtomicI64>,
    ) {
        let state = Arc::clone(self);
        let task_paused = Arc::clone(&paused);
        let task_remaining = Arc::clone(&remaining);
        let handle = tokio::spawn(async move {
            run_countdown(state, room_id, kind, interval_ms, task_paused, task_remaining).await;
        });

        let task = TimerTask {
            handle,
            paused,
            remaining,
            kind,
        };
        if let Some(previous) = self.timers.write().await.insert(room_id, task) {
            previous.handle.abort();
        }
    }

    /// Toggle the paused flag; the schedule itself is unaffected, paused
    /// ticks neither broadcast nor decrement. Returns the new state.
    pub async fn pause_timer(&self, room_id: RoomId) -> Result<bool, String> {
        let paused = {
            let timers = self.timers.read().await;
            let task = timers.get(&room_id).ok_or("No active timer")?;
            let now = !task.is_paused();
            task.paused.store(now, Ordering::Relaxed);
            now
        };
        let mut rooms = self.rooms.write().await;
        if let Some(game) = rooms.get_mut(&room_id).and_then(|r| r.game.as_mut()) {
            game.paused = paused;
        }
        Ok(paused)
    }

    /// Accelerate the current question countdown. Allowed at most once per
    /// question, only above the question-type threshold, and never during a
    /// transition countdown.
    pub async fn panic_timer(self: &Arc<Self>, room_id: RoomId) -> Result<(), String> {
        let (paused, remaining) = {
            let timers = self.timers.read().await;
            let task = timers.get(&room_id).ok_or("No active timer")?;
            if task.kind != TickKind::Question {
                return Err("Cannot start panic mode during a transition".to_string());
            }
            (Arc::clone(&task.paused), Arc::clone(&task.remaining))
        };

        {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(&room_id).ok_or("No active game")?;
            let game = room.game.as_mut().ok_or("No active game")?;
            if game.panic_used {
                return Err("Panic mode already used for this question".to_string());
            }
            let threshold = match game.current_question().kind {
                QuestionKind::Qcm => PANIC_MIN_REMAINING_QCM,
                QuestionKind::Qrl => PANIC_MIN_REMAINING_QRL,
            };
            let left = remaining.load(Ordering::Relaxed);
            if left <= i64::from(threshold) {
                return Err(format!(
                    "Panic mode needs more than {} seconds remaining",
                    threshold
                ));
            }
            game.panic_used = true;
        }

        // Restart the ticker at the panic cadence, keeping remaining/paused
        self.spawn_ticker(room_id, TickKind::Question, PANIC_INTERVAL_MS, paused, remaining)
            .await;
        self.send_to_room(room_id, ServerMessage::PanicModeStarted).await;
        tracing::info!("Panic mode engaged in room {}", room_id);
        Ok(())
    }

    /// Stop and discard the room's countdown. Idempotent.
    pub async fn cancel_timer(&self, room_id: RoomId) {
        if let Some(task) = self.timers.write().await.remove(&room_id) {
            task.handle.abort();
        }
    }

    async fn broadcast_tick(&self, room_id: RoomId, kind: TickKind, remaining: u32) {
        let msg = match kind {
            TickKind::Question => {
                let mut rooms = self.rooms.write().await;
                if let Some(game) = rooms.get_mut(&room_id).and_then(|r| r.game.as_mut()) {
                    game.remaining_time = remaining;
                }
                ServerMessage::Time { remaining }
            }
            TickKind::Transition => ServerMessage::TransitionTime { remaining },
        };
        self.send_to_room(room_id, msg).await;
    }
}

/// The repeating task itself. Broadcasts `duration + 1` ticks (the initial
/// one included) for an uninterrupted countdown, then self-cancels and hands
/// control back to the session.
async fn run_countdown(
    state: Arc<AppState>,
    room_id: RoomId,
    kind: TickKind,
    interval_ms: u64,
    paused: Arc<AtomicBool>,
    remaining: Arc<AtomicI64>,
) {
    let mut ticker = interval(Duration::from_millis(interval_ms));
    loop {
        ticker.tick().await;
        if paused.load(Ordering::Relaxed) {
            continue;
        }
        let now = remaining.load(Ordering::Relaxed);
        if now < 0 {
            break;
        }
        state.broadcast_tick(room_id, kind, now as u32).await;
        remaining.fetch_sub(1, Ordering::Relaxed);
    }

    // Self-cancel before the terminal callback so a new countdown can start
    state.timers.write().await.remove(&room_id);
    match kind {
        TickKind::Question => state.handle_question_timeout(room_id).await,
        TickKind::Transition => state.handle_transition_timeout(room_id).await,
    }
}
