//! QRL manual-evaluation workflow: the host scores every open-response
//! answer in username order before the game may advance.

use std::collections::HashMap;

/// The canonical score multipliers the host may hand out.
pub const CANONICAL_MULTIPLIERS: [f32; 3] = [0.0, 0.5, 1.0];

/// Sequential scoring pass over one question's QRL submissions.
/// `cursor` only ever moves forward; the pass is complete exactly when it
/// reaches `usernames.len()`.
#[derive(Debug, Clone)]
pub struct Evaluation {
    usernames: Vec<String>,
    answers: Vec<String>,
    scores: Vec<Option<f32>>,
    cursor: i32,
    histogram: [u32; 3],
}

impl Evaluation {
    /// Sort usernames lexicographically, build the parallel answer sequence,
    /// prime the cursor at -1 and advance to the first player.
    pub fn begin(answers_by_player: &HashMap<String, String>) -> Self {
        let mut usernames: Vec<String> = answers_by_player.keys().cloned().collect();
        usernames.sort();
        let answers = usernames
            .iter()
            .map(|name| answers_by_player.get(name).cloned().unwrap_or_default())
            .collect();
        let scores = vec![None; usernames.len()];
        let mut eval = Self {
            usernames,
            answers,
            scores,
            cursor: -1,
            histogram: [0; 3],
        };
        eval.advance();
        eval
    }

    pub fn len(&self) -> usize {
        self.usernames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usernames.is_empty()
    }

    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.usernames.len() as i32
    }

    pub fn current_username(&self) -> Option<&str> {
        self.usernames
            .get(usize::try_from(self.cursor).ok()?)
            .map(String::as_str)
    }

    pub fn current_answer(&self) -> Option<&str> {
        self.answers
            .get(usize::try_from(self.cursor).ok()?)
            .map(String::as_str)
    }

    /// Store a canonical multiplier for the player under review.
    /// An out-of-range value is rejected and the cursor does not move; a call
    /// after completion is a no-op.
    pub fn record_score(&mut self, multiplier: f32) -> Result<(), String> {
        if self.is_complete() {
            return Ok(());
        }
        if !CANONICAL_MULTIPLIERS.contains(&multiplier) {
            return Err(format!(
                "Invalid score {}: must be one of 0, 0.5 or 1",
                multiplier
            ));
        }
        let idx = self.cursor as usize;
        self.scores[idx] = Some(multiplier);
        Ok(())
    }

    /// Move to the next player. Cursor strictly increases.
    pub fn advance(&mut self) {
        if self.cursor < self.usernames.len() as i32 {
            self.cursor += 1;
        }
    }

    /// Completion payload: username -> awarded points, the score histogram
    /// ([zero, half, full] buckets) and the per-answer fully-correct flags.
    /// Only the maximum multiplier counts as fully correct.
    pub fn finish(&mut self, question_points: u32) -> (HashMap<String, f64>, [u32; 3], Vec<bool>) {
        let mut corrections = HashMap::new();
        let mut is_correct = Vec::with_capacity(self.usernames.len());
        self.histogram = [0; 3];
        for (name, score) in self.usernames.iter().zip(&self.scores) {
            let multiplier = score.unwrap_or(0.0);
            let bucket = CANONICAL_MULTIPLIERS
                .iter()
                .position(|m| *m == multiplier)
                .unwrap_or(0);
            self.histogram[bucket] += 1;
            is_correct.push(multiplier == 1.0);
            corrections.insert(name.clone(), f64::from(multiplier) * f64::from(question_points));
        }
        (corrections, self.histogram, is_correct)
    }
}
