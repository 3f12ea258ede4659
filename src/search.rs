//! # Query retriever
//!
//! Loads the consolidated embedding index and ranks photos against a text
//! query by cosine similarity. Both the photo vectors and the query vector
//! are unit-normalized, so similarity is a plain dot product.
//!
//! Ranking is exact brute force over every row, O(N·D) per query. The
//! corpus tops out in the tens of thousands of photos, where a scan is
//! cheaper than maintaining an approximate-nearest-neighbor structure.

use ndarray::{Array1, Array2};
use ndarray_npy::read_npy;
use std::cmp::Ordering;
use std::error::Error;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::encoder::TextImageEncoder;
use crate::{FEATURES_FILE, PHOTO_IDS_FILE};

/// One ranked retrieval result.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// The matched photo.
    pub photo_id: String,
    /// Cosine similarity to the query, in `-1..1`.
    pub score: f32,
}

/// The consolidated photo index held in memory.
///
/// Row `i` of the feature matrix corresponds to `photo_ids[i]`; the
/// constructor rejects any pair that violates this alignment. The data is
/// read-only after construction, so one instance can serve queries for the
/// life of the process.
pub struct PhotoIndex {
    features: Array2<f32>,
    photo_ids: Vec<String>,
}

impl PhotoIndex {
    /// Load `features.npy` and `photo_ids.csv` from `features_dir`.
    ///
    /// # Errors
    /// Fails if either artifact is missing or unreadable, or if the matrix
    /// row count does not match the ID count.
    pub fn load(features_dir: &Path) -> Result<Self, Box<dyn Error>> {
        let features: Array2<f32> = read_npy(features_dir.join(FEATURES_FILE))?;

        let content = fs::read_to_string(features_dir.join(PHOTO_IDS_FILE))?;
        let photo_ids: Vec<String> = content
            .lines()
            .skip(1)
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect();

        let index = Self::from_parts(features, photo_ids)?;
        info!("Photos loaded: {}", index.len());
        Ok(index)
    }

    /// Build an index from in-memory parts, enforcing row/ID alignment.
    pub fn from_parts(
        features: Array2<f32>,
        photo_ids: Vec<String>,
    ) -> Result<Self, Box<dyn Error>> {
        if features.nrows() != photo_ids.len() {
            return Err(format!(
                "index is inconsistent: {} vectors vs {} photo ids",
                features.nrows(),
                photo_ids.len()
            )
            .into());
        }
        Ok(Self {
            features,
            photo_ids,
        })
    }

    /// Number of photos in the index.
    pub fn len(&self) -> usize {
        self.photo_ids.len()
    }

    /// True when the index holds no photos.
    pub fn is_empty(&self) -> bool {
        self.photo_ids.is_empty()
    }

    /// Dimensionality of the indexed vectors.
    pub fn dimension(&self) -> usize {
        self.features.ncols()
    }

    /// Rank every photo against `query` and return the best `k` hits.
    ///
    /// Returns `min(k, N)` hits in descending similarity order; equal scores
    /// keep their original row order (stable sort).
    ///
    /// # Errors
    /// Returns `"dimension mismatch"` if `query.len()` differs from the
    /// indexed vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, &'static str> {
        if query.len() != self.dimension() {
            return Err("dimension mismatch");
        }

        let query = Array1::from_vec(query.to_vec());
        let similarities = self.features.dot(&query);

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            similarities[b]
                .partial_cmp(&similarities[a])
                .unwrap_or(Ordering::Equal)
        });

        Ok(order
            .into_iter()
            .take(k)
            .map(|i| Hit {
                photo_id: self.photo_ids[i].clone(),
                score: similarities[i],
            })
            .collect())
    }

    /// Encode a text query and rank photos against it.
    ///
    /// # Errors
    /// An empty (or whitespace-only) query is rejected before any model call;
    /// encoding errors propagate.
    pub fn search_text(
        &self,
        encoder: &dyn TextImageEncoder,
        query: &str,
        k: usize,
    ) -> Result<Vec<Hit>, Box<dyn Error>> {
        if query.trim().is_empty() {
            return Err("Please enter your search query".into());
        }
        let query_vector = encoder.encode_text(query)?;
        Ok(self.search(&query_vector, k)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn three_photo_index() -> PhotoIndex {
        PhotoIndex::from_parts(
            arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]),
            vec!["p1".into(), "p2".into(), "p3".into()],
        )
        .unwrap()
    }

    #[test]
    fn exact_match_ranks_first_with_unit_score() {
        let index = three_photo_index();
        let hits = index.search(&[0.0, 1.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].photo_id, "p2");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn result_length_is_min_of_k_and_corpus() {
        let index = three_photo_index();
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 2).unwrap().len(), 2);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn ties_keep_row_order() {
        let index = PhotoIndex::from_parts(
            arr2(&[[1.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            vec!["first".into(), "second".into(), "other".into()],
        )
        .unwrap();
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].photo_id, "first");
        assert_eq!(hits[1].photo_id, "second");
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let index = three_photo_index();
        assert_eq!(index.search(&[1.0, 0.0], 1), Err("dimension mismatch"));
    }

    #[test]
    fn misaligned_parts_are_rejected() {
        let result = PhotoIndex::from_parts(
            arr2(&[[1.0, 0.0], [0.0, 1.0]]),
            vec!["only_one".into()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_query_is_a_hard_error() {
        struct NeverEncoder;
        impl TextImageEncoder for NeverEncoder {
            fn dimension(&self) -> usize {
                3
            }
            fn encode_text(&self, _: &str) -> Result<Vec<f32>, Box<dyn Error>> {
                panic!("the encoder must not run for an empty query");
            }
            fn encode_image(&self, _: &Path) -> Result<Vec<f32>, Box<dyn Error>> {
                unimplemented!()
            }
        }

        let index = three_photo_index();
        assert!(index.search_text(&NeverEncoder, "   ", 3).is_err());
    }
}
