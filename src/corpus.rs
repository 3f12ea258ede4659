//! # Corpus acquisition
//!
//! Downloads the raw photo corpus for a dataset version. The dataset ships a
//! tab-separated manifest (`photos.tsv000`) mapping photo IDs to source URLs;
//! every photo is fetched into `<version>/photos/<photo_id>.jpg` at a reduced
//! width (the encoder downscales further anyway).
//!
//! Downloads run across a bounded pool of concurrent requests. The operation
//! is idempotent: photos already on disk are skipped, and a failed download
//! leaves a missing file behind rather than aborting the run. The returned
//! [`FetchSummary`] reports exactly how many items were downloaded, skipped,
//! and failed.

use futures::StreamExt;
use indicatif::ProgressBar;
use std::error::Error;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Width hint appended to every photo URL.
const DOWNLOAD_WIDTH: u32 = 640;

/// One row of the photo manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    /// Unique photo ID; also the local filename stem.
    pub photo_id: String,
    /// Source URL of the full-resolution photo.
    pub image_url: String,
}

/// Outcome counts of one acquisition run.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FetchSummary {
    /// Photos fetched over the network this run.
    pub downloaded: usize,
    /// Photos already present on disk.
    pub skipped: usize,
    /// Photos whose download failed; their files are absent.
    pub failed: usize,
}

/// Parse the tab-separated photo manifest.
///
/// The first line is a header; the `photo_id` and `photo_image_url` columns
/// are located by name so the manifest may carry any number of other columns.
/// Rows too short to hold both columns are skipped with a warning.
///
/// # Errors
/// Fails if the file cannot be read or the header lacks either column.
pub fn read_manifest(path: &Path) -> Result<Vec<PhotoRecord>, Box<dyn Error>> {
    let content = fs::read_to_string(path)?;
    let mut lines = content.lines();

    let header = lines.next().ok_or("manifest is empty")?;
    let columns: Vec<&str> = header.split('\t').collect();
    let id_col = columns
        .iter()
        .position(|c| *c == "photo_id")
        .ok_or("manifest has no photo_id column")?;
    let url_col = columns
        .iter()
        .position(|c| *c == "photo_image_url")
        .ok_or("manifest has no photo_image_url column")?;

    let mut records = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        match (fields.get(id_col), fields.get(url_col)) {
            (Some(id), Some(url)) if !id.is_empty() && !url.is_empty() => {
                records.push(PhotoRecord {
                    photo_id: id.to_string(),
                    image_url: url.to_string(),
                });
            }
            _ => warn!("Skipping malformed manifest row: {line:?}"),
        }
    }

    info!("Photos in the dataset: {}", records.len());
    Ok(records)
}

/// Download every photo in `records` into `photos_dir`.
///
/// At most `concurrency` requests are in flight at once. Photos whose file
/// already exists are not re-requested; per-item failures are logged and
/// counted but never abort the remaining downloads.
///
/// # Errors
/// Fails only on setup problems (creating `photos_dir`, building the HTTP
/// client), never because individual downloads failed.
pub async fn fetch_photos(
    records: &[PhotoRecord],
    photos_dir: &Path,
    concurrency: usize,
) -> Result<FetchSummary, Box<dyn Error>> {
    fs::create_dir_all(photos_dir)?;

    let client = reqwest::Client::builder().build()?;
    let progress = ProgressBar::new(records.len() as u64);

    let results: Vec<DownloadStatus> = futures::stream::iter(records.iter().map(|record| {
        let client = client.clone();
        let progress = progress.clone();
        let target = photos_dir.join(format!("{}.jpg", record.photo_id));
        let record = record.clone();
        async move {
            let status = download_photo(&client, &record, &target).await;
            progress.inc(1);
            status
        }
    }))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await;

    progress.finish_and_clear();

    let mut summary = FetchSummary::default();
    for status in results {
        match status {
            DownloadStatus::Downloaded => summary.downloaded += 1,
            DownloadStatus::Skipped => summary.skipped += 1,
            DownloadStatus::Failed => summary.failed += 1,
        }
    }

    info!(
        "Photos downloaded: {} (skipped {}, failed {})",
        summary.downloaded, summary.skipped, summary.failed
    );
    Ok(summary)
}

enum DownloadStatus {
    Downloaded,
    Skipped,
    Failed,
}

async fn download_photo(
    client: &reqwest::Client,
    record: &PhotoRecord,
    target: &Path,
) -> DownloadStatus {
    // Only download a photo if it doesn't exist yet.
    if target.exists() {
        return DownloadStatus::Skipped;
    }

    let url = format!("{}?w={DOWNLOAD_WIDTH}", record.image_url);
    match fetch_bytes(client, &url).await {
        Ok(bytes) => match fs::write(target, &bytes) {
            Ok(()) => DownloadStatus::Downloaded,
            Err(err) => {
                warn!("Cannot store {}: {err}", target.display());
                DownloadStatus::Failed
            }
        },
        Err(err) => {
            warn!("Cannot download {url}: {err}");
            DownloadStatus::Failed
        }
    }
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_manifest(dir: &Path, rows: &[(&str, &str)]) -> std::path::PathBuf {
        let path = dir.join("photos.tsv000");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "photo_id\tphoto_width\tphoto_image_url").unwrap();
        for (id, url) in rows {
            writeln!(file, "{id}\t640\t{url}").unwrap();
        }
        path
    }

    #[test]
    fn manifest_columns_located_by_name() {
        let dir = tempdir().unwrap();
        let path = write_manifest(dir.path(), &[("abc", "http://x/abc"), ("def", "http://x/def")]);

        let records = read_manifest(&path).unwrap();
        assert_eq!(
            records,
            vec![
                PhotoRecord {
                    photo_id: "abc".into(),
                    image_url: "http://x/abc".into()
                },
                PhotoRecord {
                    photo_id: "def".into(),
                    image_url: "http://x/def".into()
                },
            ]
        );
    }

    #[test]
    fn manifest_without_required_columns_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photos.tsv000");
        fs::write(&path, "photo_id\tdescription\nabc\thello\n").unwrap();
        assert!(read_manifest(&path).is_err());
    }

    #[tokio::test]
    async fn fetch_is_idempotent_and_best_effort() {
        let server = MockServer::start_async().await;
        let ok_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/photos/abc");
                then.status(200).body(b"jpegbytes");
            })
            .await;
        let bad_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/photos/bad");
                then.status(404);
            })
            .await;

        let dir = tempdir().unwrap();
        let photos_dir = dir.path().join("photos");
        let records = vec![
            PhotoRecord {
                photo_id: "abc".into(),
                image_url: server.url("/photos/abc"),
            },
            PhotoRecord {
                photo_id: "bad".into(),
                image_url: server.url("/photos/bad"),
            },
        ];

        let summary = fetch_photos(&records, &photos_dir, 4).await.unwrap();
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.failed, 1);
        assert!(photos_dir.join("abc.jpg").is_file());
        assert!(!photos_dir.join("bad.jpg").exists());

        // Second run: the stored photo is skipped, nothing is re-requested
        // for it, and the file set stays identical.
        let summary = fetch_photos(&records, &photos_dir, 4).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.downloaded, 0);
        ok_mock.assert_hits_async(1).await;
        bad_mock.assert_hits_async(2).await;
    }
}
