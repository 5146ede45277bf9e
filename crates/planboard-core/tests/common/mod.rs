//! Shared fixtures for planboard-core integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use planboard_core::BoardService;
use planboard_core::config::PlannerConfig;
use planboard_core::model::{GenerateOptions, ModelClient, ModelError};
use planboard_core::plan::PlanIngestor;
use planboard_core::store::MemoryStore;

/// What the scripted model does on one call.
pub enum Reply {
    Text(String),
    ApiError(u16),
    /// Never answers.
    Hang,
    /// Answers after a delay.
    Delayed(Duration, String),
}

/// A model that plays back a fixed list of replies and records the prompts
/// it was given.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<(String, String)>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        })
    }

    pub fn text(reply: impl Into<String>) -> Arc<Self> {
        Self::new(vec![Reply::Text(reply.into())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User prompts in call order.
    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, user)| user.clone())
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        _options: &GenerateOptions,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_owned(), user.to_owned()));
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::ApiError(status)) => Err(ModelError::Api {
                status,
                message: "scripted failure".into(),
            }),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(ModelError::EmptyResponse),
        }
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub board: BoardService,
    pub model: Arc<ScriptedModel>,
    pub ingestor: PlanIngestor,
}

impl Harness {
    pub fn new(model: Arc<ScriptedModel>) -> Self {
        Self::with_config(model, PlannerConfig::default())
    }

    pub fn with_config(model: Arc<ScriptedModel>, config: PlannerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let board = BoardService::new(store.clone());
        let ingestor = PlanIngestor::new(model.clone(), config);
        Self {
            store,
            board,
            model,
            ingestor,
        }
    }
}

/// Three milestones, nine tasks; "Define scope" and "Set up repository" have
/// no dependencies.
pub fn launch_mvp_plan() -> serde_json::Value {
    json!({
        "milestones": [
            {
                "name": "Foundations",
                "summary": "Agree on scope and get the project skeleton in place",
                "tasks": [
                    { "id": "scope", "title": "Define scope", "effort_hours": 3 },
                    { "id": "wire", "title": "Design wireframes", "effort_hours": 5, "depends_on": ["scope"] },
                    { "id": "repo", "title": "Set up repository", "effort_hours": 2 }
                ]
            },
            {
                "name": "Build",
                "summary": "Implement the pages",
                "tasks": [
                    { "id": "landing", "title": "Implement landing page", "effort_hours": 6, "depends_on": ["wire", "repo"] },
                    { "id": "signup", "title": "Implement signup form", "effort_hours": 5, "depends_on": ["wire", "repo"] },
                    { "id": "analytics", "title": "Set up analytics", "effort_hours": 2, "depends_on": ["repo"] }
                ]
            },
            {
                "name": "Launch",
                "summary": "Ship it",
                "tasks": [
                    { "id": "qa", "title": "QA pass", "effort_hours": 4, "depends_on": ["landing", "signup"] },
                    { "id": "deploy", "title": "Deploy to production", "effort_hours": 3, "depends_on": ["analytics", "qa"] },
                    { "id": "announce", "title": "Announce launch", "effort_hours": 2, "depends_on": ["deploy"] }
                ]
            }
        ]
    })
}
