//! Deterministic embedding providers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ragcheck_rag::{EmbeddingProvider, ProviderErrorKind, RagError, Result};

pub const DIM: usize = 16;

/// Hashes lowercase words into a fixed number of buckets.
///
/// Texts sharing words get a positive cosine similarity, unrelated texts
/// score near zero.
#[derive(Debug, Default)]
pub struct BagOfWordsEmbedder {
    calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIM];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.to_lowercase().bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        vector[(hash % DIM as u64) as usize] += 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(bag_of_words(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }
}

/// Wraps [`BagOfWordsEmbedder`] and fails selected calls.
pub struct ScriptedEmbedder {
    inner: BagOfWordsEmbedder,
    /// Zero-based call numbers that fail, with the failure kind.
    failing_calls: Mutex<Vec<(usize, ProviderErrorKind)>>,
    /// Texts that always fail to embed.
    failing_texts: HashSet<String>,
}

impl ScriptedEmbedder {
    pub fn new() -> Self {
        Self {
            inner: BagOfWordsEmbedder::new(),
            failing_calls: Mutex::new(Vec::new()),
            failing_texts: HashSet::new(),
        }
    }

    pub fn fail_call(self, call: usize, kind: ProviderErrorKind) -> Self {
        self.failing_calls.lock().unwrap().push((call, kind));
        self
    }

    pub fn fail_text(mut self, text: &str) -> Self {
        self.failing_texts.insert(text.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.inner.calls()
    }

    fn check(&self, call: usize, texts: &[&str]) -> Result<()> {
        if let Some((_, kind)) =
            self.failing_calls.lock().unwrap().iter().find(|(n, _)| *n == call)
        {
            return Err(RagError::embedding("scripted", *kind, format!("call {call} failed")));
        }
        if texts.iter().any(|t| self.failing_texts.contains(*t)) {
            return Err(RagError::embedding(
                "scripted",
                ProviderErrorKind::InvalidInput,
                "text rejected",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.check(self.inner.calls(), &[text])?;
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let call = self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.check(call, texts)?;
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// `len` characters of space-separated words tagged with `topic`.
pub fn text_of_len(topic: &str, len: usize) -> String {
    let mut text = String::with_capacity(len + 16);
    let mut i = 0;
    while text.chars().count() < len {
        text.push_str(&format!("{topic}{i} "));
        i += 1;
    }
    text.chars().take(len).collect()
}
