use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

use super::conversation::{ContentBlock, QueryEnvelope, Role};
use super::transport::{ChatTransport, TransportError};

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Echo,
    AlwaysFail,
    /// Fails the first `n` calls, then echoes.
    FailFirst(usize),
    Slow(Duration),
}

#[derive(Debug)]
pub struct FakeTransport {
    behavior: Behavior,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    envelopes: Mutex<Vec<QueryEnvelope>>,
}

impl FakeTransport {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            envelopes: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn envelopes(&self) -> Vec<QueryEnvelope> {
        self.envelopes.lock().unwrap().clone()
    }
}

impl ChatTransport for FakeTransport {
    fn post_chat(&self, envelope: &QueryEnvelope) -> Result<Value, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        self.envelopes.lock().unwrap().push(envelope.clone());

        let fail = match self.behavior {
            Behavior::Echo => false,
            Behavior::AlwaysFail => true,
            Behavior::FailFirst(n) => call < n,
            Behavior::Slow(hold) => {
                thread::sleep(hold);
                false
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if fail {
            return Err(TransportError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            });
        }

        Ok(echo_response(envelope))
    }
}

pub fn echo_response(envelope: &QueryEnvelope) -> Value {
    let question = envelope
        .messages
        .iter()
        .filter(|turn| turn.role == Role::User)
        .flat_map(|turn| turn.content.iter())
        .find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.clone()),
            ContentBlock::ImageUrl { .. } => None,
        })
        .unwrap_or_default();
    let verdict = question.len() % 2 == 0;

    json!({
        "id": "chatcmpl-fake",
        "object": "chat.completion",
        "model": envelope.model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": format!("(1,2) a cat. [[{verdict}]]")
            },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": question.len(),
            "completion_tokens": 8,
            "total_tokens": question.len() + 8
        }
    })
}
