use quizlive::catalog::{InMemoryCatalog, InMemoryHistory};
use quizlive::protocol::{ClientMessage, ServerMessage};
use quizlive::state::AppState;
use quizlive::types::{Choice, QuestionKind, Quiz, QuizQuestion};
use quizlive::ws::handlers::handle_message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn sample_quiz() -> Quiz {
    Quiz {
        id: "1".to_string(),
        title: "Integration quiz".to_string(),
        description: String::new(),
        duration: 30,
        questions: vec![
            QuizQuestion {
                kind: QuestionKind::Qcm,
                text: "2 + 2?".to_string(),
                points: 40,
                choices: vec![
                    Choice { text: "4".to_string(), is_correct: true },
                    Choice { text: "5".to_string(), is_correct: false },
                ],
            },
            QuizQuestion {
                kind: QuestionKind::Qrl,
                text: "Explain ownership".to_string(),
                points: 60,
                choices: vec![],
            },
        ],
    }
}

fn test_state() -> (Arc<AppState>, Arc<InMemoryHistory>) {
    let catalog = Arc::new(InMemoryCatalog::new(vec![sample_quiz()]));
    let history = Arc::new(InMemoryHistory::new());
    (Arc::new(AppState::new(catalog, history.clone())), history)
}

/// Register a fake connection and return its outbound message stream
async fn connect(state: &Arc<AppState>, id: &str) -> mpsc::UnboundedReceiver<ServerMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    state.register_connection(id.to_string(), tx).await;
    rx
}

/// Drain the stream until `pick` matches, skipping timer ticks and other
/// broadcasts along the way
async fn recv_until<T>(
    rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
    pick: impl Fn(ServerMessage) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let msg = rx.recv().await.expect("connection channel closed");
            if let Some(value) = pick(msg) {
                return value;
            }
        }
    })
    .await
    .expect("expected message never arrived")
}

/// End-to-end flow for a complete game: QCM with auto-lock on expiry, then
/// QRL with host evaluation, then game over.
#[tokio::test(start_paused = true)]
async fn test_full_game_flow() {
    let (state, history) = test_state();
    let mut host_rx = connect(&state, "host-conn").await;
    let mut alice_rx = connect(&state, "alice-conn").await;

    // 1. Host creates a room for quiz "1"
    let room_id = match handle_message(
        ClientMessage::CreateRoom { quiz_id: "1".to_string() },
        "host-conn",
        &state,
    )
    .await
    {
        Some(ServerMessage::RoomCreated { room_id }) => room_id,
        other => panic!("Expected RoomCreated, got {:?}", other),
    };
    assert!((1000..=9999).contains(&room_id));

    // 2. Alice joins
    match handle_message(
        ClientMessage::JoinGame { room_id, username: "Alice".to_string() },
        "alice-conn",
        &state,
    )
    .await
    {
        Some(ServerMessage::UsernameValidation { is_valid: true, .. }) => {}
        other => panic!("Expected valid username, got {:?}", other),
    }
    recv_until(&mut host_rx, |msg| match msg {
        ServerMessage::PlayerJoined { username } => Some(username),
        _ => None,
    })
    .await;

    // Duplicate name, case-insensitively, is rejected
    match handle_message(
        ClientMessage::JoinGame { room_id, username: "ALICE".to_string() },
        "other-conn",
        &state,
    )
    .await
    {
        Some(ServerMessage::UsernameValidation { is_valid: false, error: Some(_) }) => {}
        other => panic!("Expected rejection, got {:?}", other),
    }

    // 3. Only the host can start
    match handle_message(ClientMessage::Start { room_id }, "alice-conn", &state).await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "UNAUTHORIZED"),
        other => panic!("Expected Error, got {:?}", other),
    }
    assert!(handle_message(ClientMessage::Start { room_id }, "host-conn", &state)
        .await
        .is_none());

    let (index, is_last) = recv_until(&mut alice_rx, |msg| match msg {
        ServerMessage::Question { index, is_last, .. } => Some((index, is_last)),
        _ => None,
    })
    .await;
    assert_eq!(index, 0);
    assert!(!is_last);

    // 4. Alice selects choice 0 and lets the countdown expire
    assert!(handle_message(
        ClientMessage::UpdateSelection { room_id, choice_index: 0, is_selected: true },
        "alice-conn",
        &state,
    )
    .await
    .is_none());

    // Auto-lock broadcasts the aggregated QCM stats
    let counts = recv_until(&mut alice_rx, |msg| match msg {
        ServerMessage::QcmStats { counts } => Some(counts),
        _ => None,
    })
    .await;
    assert_eq!(counts, vec![1, 0]);

    let scores = recv_until(&mut alice_rx, |msg| match msg {
        ServerMessage::Scores { scores } => Some(scores),
        _ => None,
    })
    .await;
    assert_eq!(scores[0].username, "Alice");
    assert_eq!(scores[0].score, 40.0);

    // 5. Host advances; after the transition countdown the QRL question lands
    assert!(handle_message(ClientMessage::NextQuestion { room_id }, "host-conn", &state)
        .await
        .is_none());
    let (index, is_last) = recv_until(&mut alice_rx, |msg| match msg {
        ServerMessage::Question { index, is_last, .. } => Some((index, is_last)),
        _ => None,
    })
    .await;
    assert_eq!(index, 1);
    assert!(is_last);

    // 6. Alice submits her open answer; the host gets it for review
    assert!(handle_message(
        ClientMessage::SubmitAnswer {
            room_id,
            qrl_text: Some("the borrow checker".to_string()),
        },
        "alice-conn",
        &state,
    )
    .await
    .is_none());

    let (username, answer, total) = recv_until(&mut host_rx, |msg| match msg {
        ServerMessage::QrlAnswerToRate { username, answer, total, .. } => {
            Some((username, answer, total))
        }
        _ => None,
    })
    .await;
    assert_eq!(username, "Alice");
    assert_eq!(answer, "the borrow checker");
    assert_eq!(total, 1);

    // 7. Out-of-range score rejected, then full credit
    match handle_message(
        ClientMessage::ScoreAnswer { room_id, multiplier: 0.3 },
        "host-conn",
        &state,
    )
    .await
    {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "SCORE_FAILED"),
        other => panic!("Expected Error, got {:?}", other),
    }
    assert!(handle_message(
        ClientMessage::ScoreAnswer { room_id, multiplier: 1.0 },
        "host-conn",
        &state,
    )
    .await
    .is_none());

    let corrections = recv_until(&mut alice_rx, |msg| match msg {
        ServerMessage::PlayerQrlCorrection { corrections } => Some(corrections),
        _ => None,
    })
    .await;
    assert_eq!(corrections["Alice"], 60.0);
    let histogram = recv_until(&mut alice_rx, |msg| match msg {
        ServerMessage::EvaluationOver { histogram } => Some(histogram),
        _ => None,
    })
    .await;
    assert_eq!(histogram.iter().sum::<u32>(), 1);
    assert_eq!(histogram, [0, 0, 1]);

    // 8. Advancing past the last question ends the game
    assert!(handle_message(ClientMessage::NextQuestion { room_id }, "host-conn", &state)
        .await
        .is_none());
    recv_until(&mut alice_rx, |msg| match msg {
        ServerMessage::GameOver => Some(()),
        _ => None,
    })
    .await;

    let records = history.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].quiz_title, "Integration quiz");
    assert_eq!(records[0].player_count, 1);
    assert_eq!(records[0].best_score, 60.0 + 40.0);
}

#[tokio::test(start_paused = true)]
async fn test_room_validation_and_lock() {
    let (state, _) = test_state();
    let _host_rx = connect(&state, "host-conn").await;

    let room_id = match handle_message(
        ClientMessage::CreateRoom { quiz_id: "1".to_string() },
        "host-conn",
        &state,
    )
    .await
    {
        Some(ServerMessage::RoomCreated { room_id }) => room_id,
        other => panic!("Expected RoomCreated, got {:?}", other),
    };

    match handle_message(ClientMessage::ValidateRoomId { room_id }, "x", &state).await {
        Some(ServerMessage::RoomValidation { is_room: true, is_locked: false }) => {}
        other => panic!("Expected open room, got {:?}", other),
    }
    match handle_message(ClientMessage::ValidateRoomId { room_id: 1 }, "x", &state).await {
        Some(ServerMessage::RoomValidation { is_room: false, .. }) => {}
        other => panic!("Expected missing room, got {:?}", other),
    }

    // Host locks the room; joins are rejected until unlocked
    match handle_message(ClientMessage::ToggleRoomLock { room_id }, "host-conn", &state).await {
        Some(ServerMessage::RoomValidation { is_locked: true, .. }) => {}
        other => panic!("Expected locked ack, got {:?}", other),
    }
    match handle_message(
        ClientMessage::JoinGame { room_id, username: "Bob".to_string() },
        "bob-conn",
        &state,
    )
    .await
    {
        Some(ServerMessage::UsernameValidation { is_valid: false, .. }) => {}
        other => panic!("Expected rejection, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_chat_ban_and_disconnect() {
    let (state, _) = test_state();
    let mut host_rx = connect(&state, "host-conn").await;
    let mut bob_rx = connect(&state, "bob-conn").await;

    let room_id = match handle_message(
        ClientMessage::CreateRoom { quiz_id: "1".to_string() },
        "host-conn",
        &state,
    )
    .await
    {
        Some(ServerMessage::RoomCreated { room_id }) => room_id,
        other => panic!("Expected RoomCreated, got {:?}", other),
    };
    handle_message(
        ClientMessage::JoinGame { room_id, username: "Bob".to_string() },
        "bob-conn",
        &state,
    )
    .await;

    // Chat relays to everyone and is persisted per room
    assert!(handle_message(
        ClientMessage::NewMessage { room_id, text: "hello".to_string() },
        "bob-conn",
        &state,
    )
    .await
    .is_none());
    let message = recv_until(&mut host_rx, |msg| match msg {
        ServerMessage::ReceivedMessage { message } => Some(message),
        _ => None,
    })
    .await;
    assert_eq!(message.author, "Bob");
    assert_eq!(message.text, "hello");

    match handle_message(ClientMessage::GetMessages { room_id }, "bob-conn", &state).await {
        Some(ServerMessage::Messages { list }) => assert_eq!(list.len(), 1),
        other => panic!("Expected Messages, got {:?}", other),
    }

    // An outsider cannot chat
    match handle_message(
        ClientMessage::NewMessage { room_id, text: "spam".to_string() },
        "stranger-conn",
        &state,
    )
    .await
    {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "NOT_IN_ROOM"),
        other => panic!("Expected Error, got {:?}", other),
    }

    // Ban removes Bob and bars the name for good
    assert!(handle_message(
        ClientMessage::BanPlayer { room_id, username: "Bob".to_string() },
        "host-conn",
        &state,
    )
    .await
    .is_none());
    let removed = recv_until(&mut bob_rx, |msg| match msg {
        ServerMessage::RemovedPlayer { username } => Some(username),
        _ => None,
    })
    .await;
    assert_eq!(removed, "Bob");

    match handle_message(
        ClientMessage::JoinGame { room_id, username: "bob".to_string() },
        "bob2-conn",
        &state,
    )
    .await
    {
        Some(ServerMessage::UsernameValidation { is_valid: false, error: Some(e) }) => {
            assert!(e.contains("banned"));
        }
        other => panic!("Expected ban rejection, got {:?}", other),
    }

    // Host disconnect closes the room
    let mut carol_rx = connect(&state, "carol-conn").await;
    handle_message(
        ClientMessage::JoinGame { room_id, username: "Carol".to_string() },
        "carol-conn",
        &state,
    )
    .await;
    state.handle_disconnect("host-conn").await;
    recv_until(&mut carol_rx, |msg| match msg {
        ServerMessage::HostLeft => Some(()),
        _ => None,
    })
    .await;
    assert!(state.rooms.read().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_panic_through_protocol() {
    let (state, _) = test_state();
    let mut host_rx = connect(&state, "host-conn").await;
    let _alice_rx = connect(&state, "alice-conn").await;

    let room_id = match handle_message(
        ClientMessage::CreateRoom { quiz_id: "1".to_string() },
        "host-conn",
        &state,
    )
    .await
    {
        Some(ServerMessage::RoomCreated { room_id }) => room_id,
        other => panic!("Expected RoomCreated, got {:?}", other),
    };
    handle_message(
        ClientMessage::JoinGame { room_id, username: "Alice".to_string() },
        "alice-conn",
        &state,
    )
    .await;
    handle_message(ClientMessage::Start { room_id }, "host-conn", &state).await;

    // Pause is host-only and broadcast
    match handle_message(ClientMessage::PauseTimer { room_id }, "alice-conn", &state).await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "UNAUTHORIZED"),
        other => panic!("Expected Error, got {:?}", other),
    }
    assert!(handle_message(ClientMessage::PauseTimer { room_id }, "host-conn", &state)
        .await
        .is_none());
    let paused = recv_until(&mut host_rx, |msg| match msg {
        ServerMessage::TimerPaused { paused } => Some(paused),
        _ => None,
    })
    .await;
    assert!(paused);

    // Unpause, then panic mode is accepted once with 30s on the clock
    handle_message(ClientMessage::PauseTimer { room_id }, "host-conn", &state).await;
    assert!(handle_message(ClientMessage::PanicMode { room_id }, "host-conn", &state)
        .await
        .is_none());
    recv_until(&mut host_rx, |msg| match msg {
        ServerMessage::PanicModeStarted => Some(()),
        _ => None,
    })
    .await;
    match handle_message(ClientMessage::PanicMode { room_id }, "host-conn", &state).await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "PANIC_FAILED"),
        other => panic!("Expected Error, got {:?}", other),
    }

    state.cancel_timer(room_id).await;
}
