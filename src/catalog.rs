//! External collaborators: the quiz catalog and the game-history sink.
//!
//! The session subsystem only consumes these through narrow traits; the
//! storage behind them (CRUD endpoints, database) lives elsewhere.

use crate::types::{GameRecord, Quiz};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

#[async_trait]
pub trait QuizCatalog: Send + Sync {
    async fn get_quiz_by_id(&self, quiz_id: &str) -> Option<Quiz>;
}

#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn add(&self, record: GameRecord);
}

/// Catalog backed by a quiz list loaded once at startup.
pub struct InMemoryCatalog {
    quizzes: HashMap<String, Quiz>,
}

impl InMemoryCatalog {
    pub fn new(quizzes: Vec<Quiz>) -> Self {
        Self {
            quizzes: quizzes.into_iter().map(|q| (q.id.clone(), q)).collect(),
        }
    }

    /// Load the quiz list from a JSON file. Callers treat failure as fatal:
    /// the session subsystem cannot run without its data dependency.
    pub fn load(path: &Path) -> Result<Self, String> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read quiz file {}: {}", path.display(), e))?;
        let quizzes: Vec<Quiz> = serde_json::from_str(&data)
            .map_err(|e| format!("cannot parse quiz file {}: {}", path.display(), e))?;
        tracing::info!("Loaded {} quizzes from {}", quizzes.len(), path.display());
        Ok(Self::new(quizzes))
    }
}

#[async_trait]
impl QuizCatalog for InMemoryCatalog {
    async fn get_quiz_by_id(&self, quiz_id: &str) -> Option<Quiz> {
        self.quizzes.get(quiz_id).cloned()
    }
}

/// History sink that keeps finished games in memory.
#[derive(Default)]
pub struct InMemoryHistory {
    records: RwLock<Vec<GameRecord>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<GameRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl HistorySink for InMemoryHistory {
    async fn add(&self, record: GameRecord) {
        tracing::info!(
            "Recording finished game: {} ({} players, best score {})",
            record.quiz_title,
            record.player_count,
            record.best_score
        );
        self.records.write().await.push(record);
    }
}
