use teller_retrieval::{tokenize, EmbeddingModel};

/// Signed feature hashing over content tokens; stopwords and punctuation are
/// dropped by the shared tokenizer.
#[derive(Debug, Clone)]
pub struct HashEmbeddingModel {
    dims: usize,
}

impl HashEmbeddingModel {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(32) }
    }
}

impl EmbeddingModel for HashEmbeddingModel {
    fn model_name(&self) -> &'static str {
        "hash-fallback"
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0_f32; self.dims];

        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let index = (hash as usize) % self.dims;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vec[index] += sign;
        }

        normalize(&mut vec);
        vec
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub(crate) fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_unit_length_and_case_insensitive() {
        let model = HashEmbeddingModel::new(64);
        let a = model.embed("Stolen card!");
        let b = model.embed("stolen CARD");
        assert_eq!(a, b);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn stopwords_do_not_contribute() {
        let model = HashEmbeddingModel::new(64);
        assert_eq!(model.embed("my card"), model.embed("card"));
        assert!(model.embed("can I do it").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let model = HashEmbeddingModel::new(16);
        let vec = model.embed("  ");
        assert_eq!(vec.len(), 32);
        assert!(vec.iter().all(|v| *v == 0.0));
    }
}
