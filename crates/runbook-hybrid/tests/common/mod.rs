#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use runbook_core::config::Settings;
use runbook_core::traits::Embedder;
use runbook_core::types::{Document, SourceType};
use runbook_embed::HashEmbedder;
use runbook_hybrid::Engine;

/// Concept axes for the scripted embedder: memory, oom, disk, network.
const CONCEPTS: &[(&str, usize)] = &[
    ("memory", 0),
    ("exhaustion", 0),
    ("terminated", 0),
    ("oomkilled", 1),
    ("137", 1),
    ("disk", 2),
    ("diskpressure", 2),
    ("dns", 3),
    ("network", 3),
];

fn scripted(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; 5];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let word = word.to_lowercase();
        if let Some((_, axis)) = CONCEPTS.iter().find(|(w, _)| *w == word) {
            v[*axis] += 1.0;
        }
    }
    if v.iter().all(|x| *x == 0.0) {
        v[4] = 1.0;
    }
    v
}

enum Model {
    Scripted,
    Hash(HashEmbedder),
}

/// Test embedder that counts what it embeds and can be told to fail or stall.
pub struct TestEmbedder {
    id: String,
    model: Model,
    pub calls: AtomicUsize,
    pub texts: AtomicUsize,
    fail: AtomicBool,
    delay_ms: AtomicU64,
}

impl TestEmbedder {
    /// Keyword concepts in a 5-dimensional space.
    pub fn scripted() -> Arc<Self> {
        Arc::new(Self::with_model("scripted:v1", Model::Scripted))
    }

    pub fn hashing() -> Arc<Self> {
        Arc::new(Self::with_model("hash:test:d64", Model::Hash(HashEmbedder::new(64))))
    }

    fn with_model(id: &str, model: Model) -> Self {
        Self {
            id: id.to_string(),
            model,
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

impl Embedder for TestEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        match &self.model {
            Model::Scripted => 5,
            Model::Hash(h) => h.dim(),
        }
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding provider unavailable");
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        match &self.model {
            Model::Scripted => Ok(texts.iter().map(|t| scripted(t)).collect()),
            Model::Hash(h) => h.embed_batch(texts),
        }
    }
}

/// Fast-failing settings: no embedding retries.
pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.embedding.retry_attempts = 0;
    settings.embedding.retry_backoff_ms = 1;
    settings
}

pub fn engine_with(embedder: &Arc<TestEmbedder>, settings: Settings) -> Engine {
    let embedder: Arc<dyn Embedder> = embedder.clone();
    Engine::with_embedder(settings, embedder).expect("engine")
}

pub fn doc(id: &str, source_type: SourceType, project: &str, content: &str) -> Document {
    Document::new(id, source_type, project, format!("https://runbooks.example.com/{id}"), id, content)
}

/// Four small runbooks across two source types and two projects.
pub fn corpus() -> Vec<Document> {
    vec![
        doc(
            "disk-pressure",
            SourceType::Docs,
            "k8s",
            "# Disk Pressure\n\nThe node reports DiskPressure when the disk fills up. Prune unused images.",
        ),
        doc(
            "oom",
            SourceType::Docs,
            "k8s",
            "# OOMKilled\n\nOOMKilled exit code 137: the pod was killed by the kernel.",
        ),
        doc(
            "dns-issue",
            SourceType::Issues,
            "k8s",
            "# DNS lookups time out\n\nCoreDNS pods restart and network lookups fail under load.",
        ),
        doc(
            "ingest-disk",
            SourceType::Issues,
            "pipeline",
            "# Ingest stalls\n\nThe ingest worker stops when its scratch disk is full.",
        ),
    ]
}
