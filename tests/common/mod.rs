#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use reviewbot::store::MemoryStore;
use reviewbot::{ChatMessage, LlmClient, NewReview, Ratings, Refresher, Settings, SummaryTarget};

pub const COURSE: SummaryTarget = SummaryTarget::CourseInstructor {
    course_id: 10,
    instructor_id: 20,
};
pub const CLUB: SummaryTarget = SummaryTarget::Club { club_id: 30 };

/// Fake provider that answers with a fixed reply (or fails) and records every
/// request it sees.
pub struct ScriptedClient {
    reply: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedClient {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(ScriptedClient {
            reply: Some(reply.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(ScriptedClient {
            reply: Some(reply.to_string()),
            delay,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(ScriptedClient {
            reply: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The user message of the most recent request, parsed as JSON.
    pub fn last_payload(&self) -> serde_json::Value {
        let requests = self.requests.lock().unwrap();
        let last = requests.last().expect("no request recorded");
        serde_json::from_str(&last[1].content).unwrap()
    }
}

impl LlmClient for ScriptedClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.reply
            .clone()
            .ok_or_else(|| anyhow!("HTTP 503 - upstream unavailable"))
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }
}

pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_course(10, "CS 3110", "Data Structures and Functional Programming").unwrap();
    store.add_instructor(20, "Barbara Liskov").unwrap();
    store.add_club(30, "Robotics Club", Some("Engineering")).unwrap();
    store
}

pub fn add_reviews(store: &MemoryStore, target: SummaryTarget, n: usize) -> Vec<i64> {
    (0..n)
        .map(|i| {
            let review = NewReview::new(target, format!("Review number {i}: solid material."))
                .ratings(Ratings {
                    instructor_rating: Some(4.0 + (i % 2) as f64),
                    difficulty: Some(3.0),
                    ..Ratings::default()
                })
                .semester("Spring 2025");
            store.insert_review(&review).unwrap()
        })
        .collect()
}

pub fn refresher(store: &Arc<MemoryStore>, llm: Arc<ScriptedClient>, settings: Settings) -> Refresher {
    Refresher::new(store.clone(), store.clone(), llm, settings)
}

pub fn settings(initial: usize, delta: usize, max_reviews: usize) -> Settings {
    Settings {
        initial_threshold: initial,
        trigger_delta: delta,
        max_reviews_in_prompt: max_reviews,
        ..Settings::default()
    }
}
