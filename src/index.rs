//! # Embedding index builder
//!
//! Builds the consolidated photo embedding index from a directory of
//! downloaded photos. Photos are processed in fixed-size batches; each batch
//! produces a shard pair on disk (`NNNN.npy` with the batch's feature matrix,
//! `NNNN.csv` with the photo IDs in the same order). A final merge pass
//! concatenates all shards in filename-sorted order into `features.npy` and
//! `photo_ids.csv`.
//!
//! The builder is resumable: a batch whose shard already exists is not
//! re-embedded. A batch that fails to encode (e.g. a corrupt photo) is
//! recorded in the returned [`IndexOutcome`] and skipped; it never aborts the
//! remaining batches. The shard pair is written only after the whole batch
//! encodes, so a shard on disk is always complete.

use indicatif::ProgressBar;
use ndarray::{Array2, Axis};
use ndarray_npy::{read_npy, write_npy};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::encoder::TextImageEncoder;
use crate::{FEATURES_FILE, PHOTO_IDS_FILE};

/// A batch that could not be embedded; its photos are absent from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedBatch {
    /// Zero-based batch number.
    pub batch: usize,
    /// Photo IDs the batch would have covered.
    pub photo_ids: Vec<String>,
    /// Why the batch failed.
    pub reason: String,
}

/// Accounting for one build run.
///
/// `failed` is never silently dropped: callers decide whether missing photos
/// are acceptable.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IndexOutcome {
    /// Photos embedded during this run.
    pub embedded: usize,
    /// Batches skipped because their shard already existed.
    pub reused: usize,
    /// Batches that failed to encode.
    pub failed: Vec<FailedBatch>,
    /// Total photos represented in the consolidated index.
    pub indexed: usize,
}

/// Embed every photo under `photos_dir` and write the consolidated index
/// into `features_dir`.
///
/// Returns the run's [`IndexOutcome`]. The consolidated pair is regenerated
/// wholesale from the shards on every run, so its row order is deterministic
/// (shard filename order, i.e. batch order over the sorted photo listing).
///
/// # Errors
/// Fails if no photos exist, if the filesystem misbehaves, or if every batch
/// failed and there is nothing to merge. Individual batch failures are
/// reported through the outcome instead.
pub fn build_index(
    encoder: &dyn TextImageEncoder,
    photos_dir: &Path,
    features_dir: &Path,
    batch_size: usize,
) -> Result<IndexOutcome, Box<dyn Error>> {
    if batch_size == 0 {
        return Err("batch_size must be at least 1".into());
    }

    let photos = list_photos(photos_dir)?;
    if photos.is_empty() {
        return Err(format!("no photos found under {}", photos_dir.display()).into());
    }
    fs::create_dir_all(features_dir)?;

    let batches_num = photos.len().div_ceil(batch_size);
    info!(
        "Indexing {} photos in {} batches of {}",
        photos.len(),
        batches_num,
        batch_size
    );

    let mut outcome = IndexOutcome::default();
    let progress = ProgressBar::new(batches_num as u64);

    for (batch, files) in photos.chunks(batch_size).enumerate() {
        let shard_features = features_dir.join(format!("{batch:010}.npy"));
        let shard_ids = features_dir.join(format!("{batch:010}.csv"));

        // Only do the processing if the batch wasn't processed yet.
        if shard_features.is_file() && shard_ids.is_file() {
            outcome.reused += 1;
            progress.inc(1);
            continue;
        }

        let ids: Vec<String> = files.iter().map(|f| photo_stem(f)).collect();
        match embed_batch(encoder, files) {
            Ok(matrix) => {
                write_npy(&shard_features, &matrix)?;
                write_id_shard(&shard_ids, &ids)?;
                outcome.embedded += ids.len();
            }
            Err(err) => {
                warn!("Problem with batch {batch}: {err}");
                outcome.failed.push(FailedBatch {
                    batch,
                    photo_ids: ids,
                    reason: err.to_string(),
                });
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    outcome.indexed = merge_shards(features_dir)?;
    Ok(outcome)
}

/// All `.jpg` files under `dir`, filename-sorted.
///
/// The sort fixes batch numbering, which in turn fixes the row order of the
/// merged index.
fn list_photos(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let mut photos: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "jpg"))
        .collect();
    photos.sort();
    Ok(photos)
}

fn photo_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Encode one batch into a `batch_size × D` matrix.
fn embed_batch(
    encoder: &dyn TextImageEncoder,
    files: &[PathBuf],
) -> Result<Array2<f32>, Box<dyn Error>> {
    let rows = encoder.encode_image_batch(files)?;
    let dim = encoder.dimension();
    let mut flat = Vec::with_capacity(rows.len() * dim);
    for row in &rows {
        if row.len() != dim {
            return Err(format!("encoder returned a {}-d vector, expected {dim}", row.len()).into());
        }
        flat.extend_from_slice(row);
    }
    Ok(Array2::from_shape_vec((rows.len(), dim), flat)?)
}

fn write_id_shard(path: &Path, ids: &[String]) -> Result<(), Box<dyn Error>> {
    let mut content = String::from("photo_id\n");
    for id in ids {
        content.push_str(id);
        content.push('\n');
    }
    fs::write(path, content)?;
    Ok(())
}

fn read_id_shard(path: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .skip(1)
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect())
}

/// Concatenate every shard pair into the consolidated index.
///
/// Shards are visited in filename-sorted order; the feature and ID artifacts
/// are rewritten wholesale so their rows stay aligned. Returns the number of
/// indexed photos.
fn merge_shards(features_dir: &Path) -> Result<usize, Box<dyn Error>> {
    let mut shard_stems: Vec<String> = fs::read_dir(features_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "npy"))
        .map(|p| photo_stem(&p))
        .filter(|stem| stem != "features")
        .collect();
    shard_stems.sort();

    if shard_stems.is_empty() {
        return Err("no embedding shards to merge".into());
    }

    let mut matrices: Vec<Array2<f32>> = Vec::with_capacity(shard_stems.len());
    let mut photo_ids: Vec<String> = Vec::new();
    for stem in &shard_stems {
        let matrix: Array2<f32> = read_npy(features_dir.join(format!("{stem}.npy")))?;
        let ids = read_id_shard(&features_dir.join(format!("{stem}.csv")))?;
        if matrix.nrows() != ids.len() {
            return Err(format!(
                "shard {stem} is inconsistent: {} vectors vs {} ids",
                matrix.nrows(),
                ids.len()
            )
            .into());
        }
        matrices.push(matrix);
        photo_ids.extend(ids);
    }

    let views: Vec<_> = matrices.iter().map(|m| m.view()).collect();
    let features = ndarray::concatenate(Axis(0), &views)?;

    write_npy(features_dir.join(FEATURES_FILE), &features)?;
    write_id_shard(&features_dir.join(PHOTO_IDS_FILE), &photo_ids)?;

    info!("Merged {} photos into the consolidated index", photo_ids.len());
    Ok(photo_ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::l2_normalize;
    use tempfile::tempdir;

    /// Deterministic stand-in for the CLIP encoder: a photo's vector is a
    /// function of its filename stem, and stems starting with `bad` fail.
    struct StubEncoder;

    fn stub_vector(stem: &str) -> Vec<f32> {
        let sum: u32 = stem.bytes().map(u32::from).sum();
        l2_normalize(vec![(sum % 13 + 1) as f32, (sum % 7 + 1) as f32, 1.0])
    }

    impl TextImageEncoder for StubEncoder {
        fn dimension(&self) -> usize {
            3
        }
        fn encode_text(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>> {
            Ok(stub_vector(text))
        }
        fn encode_image(&self, path: &Path) -> Result<Vec<f32>, Box<dyn Error>> {
            let stem = photo_stem(path);
            if stem.starts_with("bad") {
                return Err(format!("cannot decode {stem}").into());
            }
            Ok(stub_vector(&stem))
        }
    }

    fn touch_photos(dir: &Path, stems: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        for stem in stems {
            fs::write(dir.join(format!("{stem}.jpg")), b"jpg").unwrap();
        }
    }

    #[test]
    fn index_rows_stay_aligned_with_ids() {
        let dir = tempdir().unwrap();
        let photos = dir.path().join("photos");
        let features = dir.path().join("features");
        touch_photos(&photos, &["cc", "aa", "bb", "dd", "ee"]);

        let outcome = build_index(&StubEncoder, &photos, &features, 2).unwrap();
        assert_eq!(outcome.embedded, 5);
        assert_eq!(outcome.indexed, 5);
        assert!(outcome.failed.is_empty());

        let ids = read_id_shard(&features.join(PHOTO_IDS_FILE)).unwrap();
        assert_eq!(ids, vec!["aa", "bb", "cc", "dd", "ee"]);

        let matrix: Array2<f32> = read_npy(features.join(FEATURES_FILE)).unwrap();
        assert_eq!(matrix.nrows(), 5);
        for (row, id) in matrix.outer_iter().zip(&ids) {
            assert_eq!(row.to_vec(), stub_vector(id));
        }
    }

    #[test]
    fn rebuilding_reembeds_nothing() {
        let dir = tempdir().unwrap();
        let photos = dir.path().join("photos");
        let features = dir.path().join("features");
        touch_photos(&photos, &["aa", "bb", "cc"]);

        let first = build_index(&StubEncoder, &photos, &features, 2).unwrap();
        assert_eq!(first.embedded, 3);
        assert_eq!(first.reused, 0);

        let second = build_index(&StubEncoder, &photos, &features, 2).unwrap();
        assert_eq!(second.embedded, 0);
        assert_eq!(second.reused, 2);
        assert_eq!(second.indexed, 3);
    }

    #[test]
    fn failed_batches_are_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let photos = dir.path().join("photos");
        let features = dir.path().join("features");
        touch_photos(&photos, &["aa", "bad1", "zz"]);

        let outcome = build_index(&StubEncoder, &photos, &features, 1).unwrap();
        assert_eq!(outcome.embedded, 2);
        assert_eq!(outcome.indexed, 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].photo_ids, vec!["bad1"]);

        // The failed batch is absent from the merged index.
        let ids = read_id_shard(&features.join(PHOTO_IDS_FILE)).unwrap();
        assert_eq!(ids, vec!["aa", "zz"]);
    }

    #[test]
    fn empty_photo_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let photos = dir.path().join("photos");
        fs::create_dir_all(&photos).unwrap();
        let result = build_index(&StubEncoder, &photos, &dir.path().join("features"), 4);
        assert!(result.is_err());
    }
}
