use std::collections::HashSet;

/// Blend applied when both a lexical and an embedding score are available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub keyword: f32,
    pub vector: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            keyword: 0.65,
            vector: 0.35,
        }
    }
}

impl ScoreWeights {
    pub fn blend(self, keyword: f32, vector: Option<f32>) -> f32 {
        match vector {
            Some(vector) => self.keyword * keyword + self.vector * vector.max(0.0),
            None => keyword,
        }
    }
}

/// Share of query terms present in the chunk.
pub fn keyword_overlap(query: &HashSet<String>, chunk: &HashSet<String>) -> f32 {
    if query.is_empty() || chunk.is_empty() {
        return 0.0;
    }
    let hits = query.intersection(chunk).count();
    hits as f32 / query.len() as f32
}

pub fn cosine(lhs: &[f32], rhs: &[f32]) -> f32 {
    if lhs.len() != rhs.len() || lhs.is_empty() {
        return 0.0;
    }

    let (dot, lhs_sq, rhs_sq) = lhs
        .iter()
        .zip(rhs)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, l, r), (a, b)| {
            (dot + a * b, l + a * a, r + b * b)
        });

    let norm = lhs_sq.sqrt() * rhs_sq.sqrt();
    if norm == 0.0 {
        0.0
    } else {
        dot / norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> HashSet<String> {
        words.iter().map(|word| word.to_string()).collect()
    }

    #[test]
    fn identical_vectors_are_maximally_similar() {
        assert!(cosine(&[1.0, 0.0, 1.0], &[1.0, 0.0, 1.0]) > 0.99);
        assert_eq!(cosine(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn overlap_is_relative_to_the_query() {
        let query = terms(&["card", "delivery", "arrive"]);
        let chunk = terms(&["card", "delivery", "working", "days"]);
        assert!((keyword_overlap(&query, &chunk) - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn negative_similarity_does_not_lower_the_blend() {
        let weights = ScoreWeights::default();
        assert_eq!(weights.blend(0.5, Some(-0.4)), weights.blend(0.5, Some(0.0)));
        assert_eq!(weights.blend(0.5, None), 0.5);
    }
}
