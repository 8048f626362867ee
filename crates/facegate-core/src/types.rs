use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>, model_version: Option<String>) -> Self {
        Self { values, model_version }
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. A zero vector
    /// is similar to nothing (0.0).
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Euclidean (L2) distance between two embeddings. For L2-normalised
    /// vectors this is `sqrt(2 - 2 * similarity)`.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Whether `other` came from the same model and has the same shape,
    /// i.e. whether a similarity between the two means anything.
    pub fn is_comparable(&self, other: &Embedding) -> bool {
        self.dim() == other.dim() && self.model_version == other.model_version
    }
}

/// Result of matching a probe embedding against the registered members.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Similarity of the accepted member, or the best similarity seen when
    /// nothing was accepted.
    pub similarity: f32,
    /// Name of the accepted member (if any).
    pub name: Option<String>,
}

impl MatchResult {
    pub fn no_match(similarity: f32) -> Self {
        Self { matched: false, similarity, name: None }
    }
}

/// Strategy for comparing a probe embedding against a gallery of members.
pub trait Matcher {
    fn compare<'a, I>(&self, probe: &Embedding, gallery: I, threshold: f32) -> MatchResult
    where
        I: IntoIterator<Item = (&'a str, &'a Embedding)>;
}

/// Accepts the first gallery entry whose cosine similarity is strictly
/// above the threshold, in gallery order.
pub struct FirstMatch;

impl Matcher for FirstMatch {
    fn compare<'a, I>(&self, probe: &Embedding, gallery: I, threshold: f32) -> MatchResult
    where
        I: IntoIterator<Item = (&'a str, &'a Embedding)>,
    {
        let mut best_sim = f32::NEG_INFINITY;

        for (name, embedding) in gallery {
            let sim = probe.similarity(embedding);
            if sim > threshold {
                return MatchResult {
                    matched: true,
                    similarity: sim,
                    name: Some(name.to_string()),
                };
            }
            best_sim = best_sim.max(sim);
        }

        MatchResult::no_match(if best_sim == f32::NEG_INFINITY { 0.0 } else { best_sim })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec(), None)
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(&[1.0, 0.0, 0.0]);
        let b = emb(&[1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_cosine_similarity_symmetric() {
        let a = emb(&[0.3, -1.2, 4.0, 0.5]);
        let b = emb(&[2.0, 0.1, -0.7, 1.5]);
        assert!((a.similarity(&b) - b.similarity(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        let a = emb(&[0.3, -1.2, 4.0, 0.5]);
        let b = emb(&[2.0, 0.1, -0.7, 1.5]);
        let a_scaled = emb(&a.values.iter().map(|v| v * 15.0).collect::<Vec<_>>());
        let b_scaled = emb(&b.values.iter().map(|v| v * 0.25).collect::<Vec<_>>());
        assert!((a.similarity(&b) - a_scaled.similarity(&b)).abs() < 1e-5);
        assert!((a.similarity(&b) - a.similarity(&b_scaled)).abs() < 1e-5);
        assert!((a.similarity(&a_scaled) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(b.euclidean_distance(&b), 0.0);

        // Unit vectors: distance and cosine similarity agree.
        let u = emb(&[0.6, 0.8]);
        let v = emb(&[1.0, 0.0]);
        let expected = (2.0 - 2.0 * u.similarity(&v)).sqrt();
        assert!((u.euclidean_distance(&v) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_is_comparable() {
        let a = Embedding::new(vec![1.0, 0.0], Some("w600k_r50".into()));
        let b = Embedding::new(vec![0.0, 1.0], Some("w600k_r50".into()));
        let c = Embedding::new(vec![0.0, 1.0, 0.0], Some("w600k_r50".into()));
        let d = Embedding::new(vec![0.0, 1.0], Some("other".into()));
        assert!(a.is_comparable(&b));
        assert!(!a.is_comparable(&c));
        assert!(!a.is_comparable(&d));
    }

    #[test]
    fn test_first_match_takes_first_above_threshold() {
        let probe = emb(&[1.0, 0.0, 0.0]);
        let near = emb(&[0.8, 0.6, 0.0]); // 0.8
        let exact = emb(&[1.0, 0.0, 0.0]); // 1.0
        let gallery = [("near", &near), ("exact", &exact)];

        let result = FirstMatch.compare(&probe, gallery, 0.7);
        assert!(result.matched);
        assert_eq!(result.name.as_deref(), Some("near"));
        assert!((result.similarity - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_first_match_threshold_is_strict() {
        let probe = emb(&[1.0, 0.0]);
        let same = emb(&[1.0, 0.0]);
        let result = FirstMatch.compare(&probe, [("same", &same)], 1.0);
        assert!(!result.matched);
        assert!((result.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_first_match_no_match_reports_best() {
        let probe = emb(&[1.0, 0.0, 0.0]);
        let a = emb(&[0.0, 1.0, 0.0]);
        let b = emb(&[0.6, 0.8, 0.0]);
        let result = FirstMatch.compare(&probe, [("a", &a), ("b", &b)], 0.7);
        assert!(!result.matched);
        assert!(result.name.is_none());
        assert!((result.similarity - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_first_match_empty_gallery() {
        let probe = emb(&[1.0, 0.0]);
        let result = FirstMatch.compare(&probe, std::iter::empty(), 0.5);
        assert_eq!(result, MatchResult::no_match(0.0));
    }
}
