//! In-memory content source with scripted replies and call recording

use async_trait::async_trait;
use mav_viewer::{ContentSource, RequestContext, TransportError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

type Reply = Result<Value, TransportError>;

/// Replies are keyed by `path` or `path?k=v&...`. Each key holds a queue;
/// the last reply in a queue repeats. Unscripted keys answer 404.
#[derive(Default)]
pub struct ScriptedSource {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
    posted: Mutex<Vec<(String, Value)>>,
    tokens: Mutex<Vec<Option<String>>>,
}

fn key(path: &str, query: &[(&str, &str)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}?{}", path, pairs.join("&"))
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `key`
    pub fn reply(&self, key: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn ok(&self, key: &str, value: Value) -> &Self {
        self.reply(key, Ok(value))
    }

    pub fn fail(&self, key: &str, status: u16) -> &Self {
        self.reply(key, Err(TransportError::Status(status, "scripted".to_string())))
    }

    /// Hold replies for `key` back by `delay`
    pub fn delay(&self, key: &str, delay: Duration) -> &Self {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
        self
    }

    /// Every request key, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn posted(&self) -> Vec<(String, Value)> {
        self.posted.lock().unwrap().clone()
    }

    pub fn seen_tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }

    async fn answer(&self, key: String, ctx: &RequestContext) -> Reply {
        self.calls.lock().unwrap().push(key.clone());
        self.tokens.lock().unwrap().push(ctx.auth_token.clone());

        let delay = self.delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Err(TransportError::Status(404, format!("not scripted: {}", key))),
        }
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        ctx: &RequestContext,
    ) -> Result<Value, TransportError> {
        self.answer(key(path, query), ctx).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> Result<Value, TransportError> {
        self.posted
            .lock()
            .unwrap()
            .push((path.to_string(), body.clone()));
        self.answer(format!("POST {}", path), ctx).await
    }
}
