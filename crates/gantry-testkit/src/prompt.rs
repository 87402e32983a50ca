//! Scripted confirmation prompt

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use gantry_core::effects::PromptEffects;
use gantry_core::errors::Result;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct PromptState {
    answers: VecDeque<bool>,
    transcript: Vec<String>,
}

/// Prompt handler that replays scripted answers and records every question
#[derive(Debug, Clone)]
pub struct ScriptedPrompt {
    state: Arc<Mutex<PromptState>>,
    default_answer: bool,
}

impl ScriptedPrompt {
    /// Confirm every prompt
    pub fn yes() -> Self {
        Self {
            state: Arc::new(Mutex::new(PromptState::default())),
            default_answer: true,
        }
    }

    /// Decline every prompt
    pub fn no() -> Self {
        Self {
            state: Arc::new(Mutex::new(PromptState::default())),
            default_answer: false,
        }
    }

    /// Answer prompts from `answers` in order, then decline
    pub fn sequence(answers: &[bool]) -> Self {
        Self {
            state: Arc::new(Mutex::new(PromptState {
                answers: answers.iter().copied().collect(),
                transcript: Vec::new(),
            })),
            default_answer: false,
        }
    }

    /// Every question asked, in order
    pub fn transcript(&self) -> Vec<String> {
        self.state.lock().transcript.clone()
    }
}

#[async_trait]
impl PromptEffects for ScriptedPrompt {
    async fn confirm(&self, message: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.transcript.push(message.to_string());
        Ok(state.answers.pop_front().unwrap_or(self.default_answer))
    }
}
