use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use teller_core::{IntentLabel, IntentPrediction};
use teller_retrieval::{cosine, EmbeddingModel};

use crate::IntentClassifier;

#[derive(Debug, Deserialize)]
struct LabeledExample {
    text: String,
    intent: String,
}

/// Nearest-centroid classifier over hashed embeddings of labelled examples.
#[derive(Clone)]
pub struct CentroidIntentClassifier {
    model_name: &'static str,
    centroids: Vec<(IntentLabel, Vec<f32>)>,
    embedder: Arc<dyn EmbeddingModel>,
}

impl CentroidIntentClassifier {
    pub fn from_jsonl(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingModel>,
        model_name: &'static str,
    ) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "failed reading intent training dataset at {}",
                path.as_ref().display()
            )
        })?;
        Self::from_jsonl_str(&raw, embedder, model_name)
    }

    pub fn from_jsonl_str(
        raw: &str,
        embedder: Arc<dyn EmbeddingModel>,
        model_name: &'static str,
    ) -> Result<Self> {
        let mut by_intent: HashMap<IntentLabel, Vec<Vec<f32>>> = HashMap::new();

        for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let example: LabeledExample =
                serde_json::from_str(line).context("invalid jsonl training line")?;
            let label = IntentLabel::parse(&example.intent);
            if !label.is_known() {
                continue;
            }
            by_intent
                .entry(label)
                .or_default()
                .push(embedder.embed(&example.text));
        }

        let mut centroids = by_intent
            .into_iter()
            .filter(|(_, vectors)| !vectors.is_empty())
            .map(|(label, vectors)| (label, centroid(&vectors)))
            .collect::<Vec<_>>();
        centroids.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));

        if centroids.is_empty() {
            anyhow::bail!("training dataset produced zero intent centroids");
        }

        Ok(Self {
            model_name,
            centroids,
            embedder,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &IntentLabel> {
        self.centroids.iter().map(|(label, _)| label)
    }
}

impl IntentClassifier for CentroidIntentClassifier {
    fn model_name(&self) -> &'static str {
        self.model_name
    }

    /// Picks the nearest centroid; cosine in [-1, 1] is mapped onto [0, 1].
    fn classify(&self, text: &str) -> Result<IntentPrediction> {
        let query = self.embedder.embed(text);
        let (label, similarity) = self
            .centroids
            .iter()
            .map(|(label, center)| (label, cosine(&query, center)))
            .max_by(|(_, lhs), (_, rhs)| lhs.total_cmp(rhs))
            .context("classifier has no centroids")?;

        Ok(IntentPrediction::new(label.clone(), (similarity + 1.0) / 2.0))
    }
}

/// Component-wise mean of equally sized vectors, unit-normalized.
fn centroid(vectors: &[Vec<f32>]) -> Vec<f32> {
    let dims = vectors.first().map_or(0, Vec::len);
    let count = vectors.len().max(1) as f32;
    let mut mean = (0..dims)
        .map(|dim| vectors.iter().filter_map(|vector| vector.get(dim)).sum::<f32>() / count)
        .collect::<Vec<_>>();
    crate::fallback::normalize(&mut mean);
    mean
}
