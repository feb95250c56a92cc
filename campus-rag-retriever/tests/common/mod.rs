#![allow(dead_code)]

use async_trait::async_trait;
use campus_rag_embed::{EmbedError, EmbeddingProvider};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const DIMENSIONS: usize = 64;

/// Deterministic bag-of-characters embedder.
///
/// Every non-whitespace character adds 1.0 to one of 64 buckets, so vectors are
/// non-negative and texts sharing characters score higher.
pub struct HashEmbedder {
    model: String,
    calls: AtomicUsize,
    fail_after: Option<usize>,
    jitter: bool,
}

impl HashEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            fail_after: None,
            jitter: false,
        }
    }

    /// Succeed for the first `n` calls, then fail every call.
    pub fn failing_after(model: &str, n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::new(model)
        }
    }

    /// Delay each call by a few milliseconds depending on the text, so
    /// concurrent calls complete out of order.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; DIMENSIONS];
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            v[(c as usize).wrapping_mul(2_654_435_761) % DIMENSIONS] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_text(&self, text: &str) -> campus_rag_embed::Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.jitter {
            let delay = 7 - (text.chars().count() % 7) as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_after.is_some_and(|n| call >= n) {
            return Err(EmbedError::Status {
                endpoint: "/api/embeddings".to_string(),
                status: 500,
                body: "model unavailable".to_string(),
            });
        }
        Ok(Self::vector(text))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}

pub fn write_doc(dir: &Path, name: &str, text: &str) {
    std::fs::write(dir.join(name), text).expect("write document");
}

/// A small two-document campus corpus.
pub fn campus_corpus(dir: &Path) {
    write_doc(
        dir,
        "A.md",
        "# 教务处\n\n教务处办公时间为周一至周五 8:30-17:00，地点在行政楼一楼。\n\n---\n\n成绩复核请在学期开始两周内向教务处提交申请。",
    );
    write_doc(
        dir,
        "B.md",
        "# 图书馆\n\n图书馆开放时间为每天 8:00-22:00。\n\n借书需要携带校园卡，每次最多借十本。",
    );
}

/// A corpus large enough to produce several chunks per document.
pub fn long_corpus(dir: &Path) {
    for doc in ["guide.md", "rules.md", "services.md"] {
        let text = (0..30)
            .map(|i| format!("{doc} 第{i}条：关于选课、请假与宿舍管理的说明，编号 {i:03}。"))
            .collect::<Vec<_>>()
            .join("\n\n");
        write_doc(dir, doc, &text);
    }
}
