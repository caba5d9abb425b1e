//! Best-match selection across detected faces and the reference population.

use crate::types::{DetectedFace, MatchResult, ReferenceIdentity};

/// Minimum cosine similarity for a positive identification.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Match each detected face against the full candidate set.
///
/// For each face independently, every candidate is scanned and the maximum
/// similarity tracked; ties keep the first-seen maximum (strict `>` while
/// scanning in candidate order). A face produces a [`MatchResult`] only when
/// its maximum similarity reaches `threshold`; faces with no qualifying
/// candidate are silently dropped — the caller distinguishes "zero faces
/// detected" from "faces detected but unmatched" with a separate face count.
///
/// O(faces × candidates). Fine while the candidate set is one cached
/// reference population and faces-per-image stays small; an approximate
/// index would be needed well before either grows past a few thousand.
pub fn find_matches(
    faces: &[DetectedFace],
    candidates: &[ReferenceIdentity],
    threshold: f32,
) -> Vec<MatchResult> {
    let mut matches = Vec::new();

    for face in faces {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best: Option<&ReferenceIdentity> = None;

        for candidate in candidates {
            let sim = face.embedding.similarity(&candidate.embedding);
            if sim > best_sim {
                best_sim = sim;
                best = Some(candidate);
            }
        }

        match best {
            Some(identity) if best_sim >= threshold => {
                tracing::debug!(
                    identity = %identity.id,
                    similarity = best_sim,
                    threshold,
                    "face matched"
                );
                matches.push(MatchResult {
                    identity: identity.clone(),
                    similarity: best_sim,
                    bbox: face.bbox.clone(),
                });
            }
            _ => {
                tracing::debug!(best_similarity = best_sim, threshold, "face unmatched");
            }
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding};

    fn bbox() -> BoundingBox {
        BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            confidence: 0.99,
        }
    }

    fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            embedding: Embedding::new(values),
            bbox: bbox(),
        }
    }

    fn identity(id: &str, values: Vec<f32>) -> ReferenceIdentity {
        ReferenceIdentity {
            id: id.into(),
            display_name: id.to_uppercase(),
            embedding: Embedding::new(values),
        }
    }

    #[test]
    fn matches_identical_excludes_orthogonal() {
        // E1 identical to candidate A, E2 orthogonal to every candidate.
        let faces = vec![face(vec![1.0, 0.0, 0.0]), face(vec![0.0, 0.0, 1.0])];
        let candidates = vec![
            identity("a", vec![1.0, 0.0, 0.0]),
            identity("b", vec![0.0, 1.0, 0.0]),
        ];

        let results = find_matches(&faces, &candidates, 0.5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity.id, "a");
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn first_seen_maximum_wins_on_tie() {
        // Two distinct identities carrying the same embedding: the one
        // encountered first must be reported.
        let faces = vec![face(vec![0.0, 1.0])];
        let candidates = vec![
            identity("first", vec![0.0, 1.0]),
            identity("second", vec![0.0, 1.0]),
        ];

        let results = find_matches(&faces, &candidates, 0.5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity.id, "first");
    }

    #[test]
    fn all_candidates_scanned() {
        // Best match is the last candidate; earlier near-misses must not win.
        let faces = vec![face(vec![1.0, 0.0])];
        let candidates = vec![
            identity("near", vec![0.8, 0.6]),
            identity("exact", vec![1.0, 0.0]),
        ];

        let results = find_matches(&faces, &candidates, 0.5);
        assert_eq!(results[0].identity.id, "exact");
    }

    #[test]
    fn below_threshold_dropped() {
        let faces = vec![face(vec![1.0, 0.0])];
        let candidates = vec![identity("far", vec![0.0, 1.0])];
        assert!(find_matches(&faces, &candidates, 0.5).is_empty());
    }

    #[test]
    fn empty_inputs() {
        assert!(find_matches(&[], &[identity("a", vec![1.0])], 0.5).is_empty());
        assert!(find_matches(&[face(vec![1.0])], &[], 0.5).is_empty());
    }

    #[test]
    fn each_face_matched_independently() {
        let faces = vec![face(vec![1.0, 0.0]), face(vec![0.0, 1.0])];
        let candidates = vec![
            identity("x", vec![1.0, 0.0]),
            identity("y", vec![0.0, 1.0]),
        ];

        let results = find_matches(&faces, &candidates, 0.5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].identity.id, "x");
        assert_eq!(results[1].identity.id, "y");
    }
}
