//! # Query orchestration
//!
//! Ties the pipeline together for one query: retrieve the top candidates by
//! cosine ranking, hand them to the relevance judge, and map the judge's
//! 1-based picks back onto photo IDs.
//!
//! Judge failures are absorbed here: a declined, unusable, or errored
//! re-ranking pass produces an outcome whose `selected` list is empty and
//! whose status says the ranking is unavailable, while the retrieval hits
//! are still returned for display. Only retrieval itself (a missing index,
//! an invalid query) surfaces as an error.

use std::error::Error;
use std::fs;
use tracing::warn;

use crate::DatasetPaths;
use crate::encoder::TextImageEncoder;
use crate::judge::RelevanceJudge;
use crate::search::{Hit, PhotoIndex};

/// The displayable result of one end-to-end query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Candidates in retrieval order (only those whose photo file was
    /// readable; these are exactly the images the judge saw).
    pub hits: Vec<Hit>,
    /// The judge's picks, best first. Empty when ranking was unavailable.
    pub selected: Vec<Hit>,
    /// Human-readable status for the user.
    pub status: String,
}

/// Retrieve, judge, and resolve one query.
///
/// `retrieve` candidates are ranked by the index; the judge keeps at most
/// `keep` of them.
///
/// # Errors
/// Propagates retrieval errors (empty query, encoder failure). Judge
/// problems never error; they degrade into an outcome with no selection.
pub async fn run_query<J: RelevanceJudge>(
    index: &PhotoIndex,
    encoder: &dyn TextImageEncoder,
    judge: &J,
    paths: &DatasetPaths,
    query: &str,
    retrieve: usize,
    keep: usize,
) -> Result<SearchOutcome, Box<dyn Error>> {
    let ranked = index.search_text(encoder, query, retrieve)?;
    if ranked.is_empty() {
        return Ok(SearchOutcome {
            hits: Vec::new(),
            selected: Vec::new(),
            status: "No images found!".to_string(),
        });
    }

    // Load the candidate photos; one that failed to download earlier is
    // dropped here so judge positions keep matching what the judge saw.
    let mut hits = Vec::with_capacity(ranked.len());
    let mut images = Vec::with_capacity(ranked.len());
    for hit in ranked {
        match fs::read(paths.photo(&hit.photo_id)) {
            Ok(bytes) => {
                hits.push(hit);
                images.push(bytes);
            }
            Err(err) => warn!("Skipping unreadable photo {}: {err}", hit.photo_id),
        }
    }

    let (selected, status) = match judge.rerank(query, &images, keep).await {
        Ok(positions) if positions.is_empty() => (
            Vec::new(),
            "Can't find images aligned with search query. Try again".to_string(),
        ),
        Ok(positions) => {
            let selected = resolve_selection(&hits, &positions);
            (selected, format!("Selected {} of {} candidates", positions.len(), hits.len()))
        }
        Err(err) => {
            warn!("Re-ranking unavailable: {err}");
            (Vec::new(), "Re-ranking unavailable; showing search order".to_string())
        }
    };

    Ok(SearchOutcome {
        hits,
        selected,
        status,
    })
}

/// Map the judge's 1-based positions back onto candidate hits.
///
/// This is the only place the 1-based judge convention meets the 0-based
/// candidate list. Positions outside the list are ignored.
fn resolve_selection(candidates: &[Hit], positions: &[usize]) -> Vec<Hit> {
    positions
        .iter()
        .filter_map(|&position| position.checked_sub(1).and_then(|i| candidates.get(i)))
        .cloned()
        .collect()
}
