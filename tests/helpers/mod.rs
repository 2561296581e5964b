//! Shared fixtures for integration tests: a scripted mock model client, a
//! canned retrieval store, and a fully-wired gateway harness over in-memory
//! collaborators.

#![allow(dead_code)] // each test binary uses a subset of the helpers

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use wardgate::config::GatewayConfig;
use wardgate::error::{GatewayError, GatewayResult};
use wardgate::events::InMemoryEventLog;
use wardgate::metrics::GatewayMetrics;
use wardgate::model::{Completion, ModelClient, PrincipalContext};
use wardgate::pipeline::Gateway;
use wardgate::policy::PolicyStore;
use wardgate::registry::{InMemoryRegistry, Principal};
use wardgate::retrieval::{Chunk, RetrievalStore};

/// What the mock model should do with each call.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this text
    Reply(String),
    /// Echo the received prompt back
    EchoPrompt,
    /// Fail with an upstream error
    Fail,
    /// Never answer (exercises timeouts and cancellation)
    Hang,
}

/// Scripted model client that records every prompt it receives.
pub struct MockModelClient {
    behavior: MockBehavior,
    prompts: Mutex<Vec<String>>,
}

impl MockModelClient {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(&self, prompt: &str, _ctx: &PrincipalContext) -> GatewayResult<Completion> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.behavior {
            MockBehavior::Reply(text) => Ok(Completion {
                text: text.clone(),
                tokens_used: 7,
            }),
            MockBehavior::EchoPrompt => Ok(Completion {
                text: format!("echo: {prompt}"),
                tokens_used: prompt.split_whitespace().count() as u64,
            }),
            MockBehavior::Fail => Err(GatewayError::Upstream {
                message: "mock model failure".to_string(),
            }),
            MockBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("hung mock completed")
            }
        }
    }
}

/// Retrieval store returning a fixed chunk list, counting calls so tests can
/// assert that blocked queries never reach the store.
pub struct StaticRetrievalStore {
    chunks: Vec<Chunk>,
    calls: AtomicUsize,
}

impl StaticRetrievalStore {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetrievalStore for StaticRetrievalStore {
    async fn search(&self, _query: &str, k: usize) -> GatewayResult<Vec<Chunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.chunks.iter().take(k).cloned().collect())
    }
}

/// A chunk from a trusted source.
pub fn chunk(text: &str) -> Chunk {
    Chunk {
        doc_id: "doc-1".to_string(),
        text: text.to_string(),
        source: "internal_docs".to_string(),
    }
}

/// An active principal with the given allowlist and full registry attributes.
pub fn principal(id: &str, tools: &[&str]) -> Principal {
    let mut p = Principal::new(id, format!("{id}-agent"));
    p.external_id = Some(format!("spiffe://test/{id}"));
    p.owner = Some("test-team".to_string());
    p.description = Some("integration test principal".to_string());
    p.environment = "staging".to_string();
    for t in tools {
        p.allowed_tools.insert((*t).to_string());
    }
    p
}

/// Fully-wired gateway over in-memory collaborators.
pub struct Harness {
    pub gateway: Arc<Gateway>,
    pub registry: Arc<InMemoryRegistry>,
    pub policies: Arc<PolicyStore>,
    pub events: Arc<InMemoryEventLog>,
    pub model: Arc<MockModelClient>,
    pub retrieval: Arc<StaticRetrievalStore>,
    pub metrics: Arc<GatewayMetrics>,
}

impl Harness {
    pub fn new(behavior: MockBehavior, chunks: Vec<Chunk>, config: GatewayConfig) -> Self {
        let registry = Arc::new(InMemoryRegistry::new());
        let policies = Arc::new(PolicyStore::with_defaults(config.ingestion_threshold));
        let events = Arc::new(InMemoryEventLog::new());
        let model = Arc::new(MockModelClient::new(behavior));
        let retrieval = Arc::new(StaticRetrievalStore::new(chunks));
        let metrics = Arc::new(GatewayMetrics::new());

        let gateway = Arc::new(Gateway::new(
            registry.clone(),
            policies.clone(),
            model.clone(),
            retrieval.clone(),
            events.clone(),
            events.clone(),
            metrics.clone(),
            config,
        ));

        Self {
            gateway,
            registry,
            policies,
            events,
            model,
            retrieval,
            metrics,
        }
    }

    /// Harness with an echoing model, no retrieval corpus, default config.
    pub fn default_echo() -> Self {
        Self::new(
            MockBehavior::EchoPrompt,
            Vec::new(),
            GatewayConfig::default(),
        )
    }
}
