mod chunking;
mod scoring;
mod tokenize;

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use teller_core::{KnowledgeDoc, RetrievedChunk};
use walkdir::WalkDir;

pub use chunking::{chunk_document, chunk_lines};
pub use scoring::{cosine, keyword_overlap, ScoreWeights};
pub use tokenize::tokenize;

const MAX_CHUNK_CHARS: usize = 420;
const MAX_ANSWER_CHARS: usize = 600;
const CORPUS_EXTENSIONS: &[&str] = &["md", "txt"];

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("valid heading regex"));

pub trait EmbeddingModel: Send + Sync {
    fn model_name(&self) -> &'static str;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Ranked search over the policy corpus, best match first.
pub trait RetrievalGateway: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<RetrievedChunk>>;

    fn search_limited(&self, query: &str, limit: usize) -> Result<Vec<RetrievedChunk>> {
        let mut hits = self.search(query)?;
        hits.truncate(limit);
        Ok(hits)
    }
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    doc: usize,
    text: String,
    terms: HashSet<String>,
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalStats {
    pub docs_loaded: usize,
    pub chunks_loaded: usize,
    pub vector_enabled: bool,
}

/// In-memory index mixing term overlap with embedding similarity. Plain text
/// files contribute one chunk per line; markdown is grouped by paragraph.
#[derive(Clone)]
pub struct HybridRetriever {
    docs: Vec<KnowledgeDoc>,
    chunks: Vec<IndexedChunk>,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    weights: ScoreWeights,
    top_k: usize,
}

impl HybridRetriever {
    pub fn from_kb_dir(
        root: impl AsRef<Path>,
        embedder: Option<Arc<dyn EmbeddingModel>>,
    ) -> Result<Self> {
        let docs = load_corpus(root.as_ref())?;
        Ok(Self::from_docs(docs, embedder))
    }

    pub fn from_docs(docs: Vec<KnowledgeDoc>, embedder: Option<Arc<dyn EmbeddingModel>>) -> Self {
        let chunks = docs
            .iter()
            .enumerate()
            .flat_map(|(doc_idx, doc)| {
                let pieces = if doc.source_path.ends_with(".txt") {
                    chunk_lines(&doc.body)
                } else {
                    chunk_document(&doc.body, MAX_CHUNK_CHARS)
                };
                pieces.into_iter().map(move |text| (doc_idx, text))
            })
            .map(|(doc, text)| IndexedChunk {
                doc,
                terms: tokenize(&text).into_iter().collect(),
                embedding: embedder.as_ref().map(|model| model.embed(&text)),
                text,
            })
            .collect();

        Self {
            docs,
            chunks,
            embedder,
            weights: ScoreWeights::default(),
            top_k: 3,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn stats(&self) -> RetrievalStats {
        RetrievalStats {
            docs_loaded: self.docs.len(),
            chunks_loaded: self.chunks.len(),
            vector_enabled: self.embedder.is_some(),
        }
    }

    /// Up to `limit` chunks with a positive score, in descending score order.
    pub fn rank(&self, query: &str, limit: usize) -> Vec<RetrievedChunk> {
        let query_terms = tokenize(query).into_iter().collect::<HashSet<_>>();
        let query_vector = self.embedder.as_ref().map(|model| model.embed(query));

        let mut scored = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(position, chunk)| {
                let lexical = keyword_overlap(&query_terms, &chunk.terms);
                let semantic = query_vector
                    .as_deref()
                    .zip(chunk.embedding.as_deref())
                    .map(|(lhs, rhs)| cosine(lhs, rhs));
                let score = self.weights.blend(lexical, semantic);
                (score > 0.0).then_some((score, position))
            })
            .collect::<Vec<_>>();

        // Ties keep corpus order.
        scored.sort_by(|(a, lhs), (b, rhs)| b.total_cmp(a).then(lhs.cmp(rhs)));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, position)| self.hit(&self.chunks[position], score))
            .collect()
    }

    fn hit(&self, chunk: &IndexedChunk, score: f32) -> RetrievedChunk {
        let doc = &self.docs[chunk.doc];
        RetrievedChunk {
            doc_id: doc.id.clone(),
            title: doc.title.clone(),
            chunk: clip(&chunk.text, MAX_ANSWER_CHARS),
            score,
            source_path: doc.source_path.clone(),
        }
    }
}

impl RetrievalGateway for HybridRetriever {
    fn search(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        Ok(self.rank(query, self.top_k))
    }

    fn search_limited(&self, query: &str, limit: usize) -> Result<Vec<RetrievedChunk>> {
        Ok(self.rank(query, limit))
    }
}

/// Reads every markdown and text file below `root`. A missing root yields an
/// empty corpus; an unreadable file is an error.
fn load_corpus(root: &Path) -> Result<Vec<KnowledgeDoc>> {
    let mut docs = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        let is_corpus_file = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| CORPUS_EXTENSIONS.contains(&ext));
        if !is_corpus_file {
            continue;
        }

        let body = fs::read_to_string(path)
            .with_context(|| format!("failed reading knowledge document {}", path.display()))?;
        let source_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        docs.push(KnowledgeDoc {
            id: source_path.replace('/', "::"),
            title: doc_title(path, &body),
            tags: source_path
                .split('/')
                .rev()
                .skip(1)
                .map(str::to_string)
                .collect(),
            source_path,
            body,
        });
    }

    Ok(docs)
}

fn doc_title(path: &Path, body: &str) -> String {
    HEADING
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|heading| heading.as_str().trim().to_string())
        .filter(|heading| !heading.is_empty())
        .unwrap_or_else(|| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("untitled")
                .replace(['-', '_'], " ")
        })
}

fn clip(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &collapsed[..cut]),
        None => collapsed,
    }
}
