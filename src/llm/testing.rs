//! Scripted backend used by tests in place of a real provider.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BackendError, GenerativeBackend, Turn};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub turns: Vec<Turn>,
    pub temperature: f32,
}

/// Replays canned replies in order; once the script runs out the last reply
/// is repeated. Every call is recorded.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: &str) -> Self {
        Self::new([reply])
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, system: &str, turns: &[Turn], temperature: f32) -> Result<String, BackendError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            turns: turns.to_vec(),
            temperature,
        });

        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone().ok_or_else(|| BackendError::EmptyResponse {
            provider: "scripted".to_string(),
        })
    }
}
