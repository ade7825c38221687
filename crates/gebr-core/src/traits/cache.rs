//! Answers to ssh yes/no questions

use std::collections::HashMap;
use std::sync::Mutex;

/// Remembers the answer given to each question, keyed by its exact text
pub trait QuestionCache: Send + Sync {
    fn answer(&self, question: &str) -> Option<bool>;
    fn remember(&self, question: &str, answer: bool);
}

/// In-memory question cache
#[derive(Debug, Default)]
pub struct MemoryQuestionCache {
    answers: Mutex<HashMap<String, bool>>,
}

impl MemoryQuestionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-seeded with answers
    pub fn with_answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(|(q, a)| (q.into(), a)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.answers.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QuestionCache for MemoryQuestionCache {
    fn answer(&self, question: &str) -> Option<bool> {
        self.answers
            .lock()
            .ok()
            .and_then(|answers| answers.get(question).copied())
    }

    fn remember(&self, question: &str, answer: bool) {
        if let Ok(mut answers) = self.answers.lock() {
            answers.insert(question.to_string(), answer);
        }
    }
}
