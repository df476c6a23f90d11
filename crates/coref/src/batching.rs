//! Section batching for large documents.
//!
//! Neural resolvers blow up on very long inputs, so documents above the
//! batch threshold are split along item boundaries into overlapping
//! batches. Each batch resolves independently; mention offsets are
//! shifted back into document coordinates and clusters duplicated by the
//! overlap are removed by span signature.

use std::collections::HashSet;

use tracing::{debug, info};

use model::DocItem;

use crate::engine::{CoreferenceCluster, CorefEngine};

/// One batch: text plus its offset into the concatenated document text.
#[derive(Debug, Clone)]
pub struct SectionBatch {
    pub text: String,
    pub offset: isize,
    pub docitem_ids: Vec<String>,
}

/// Group items into batches of at most `batch_size` chars, carrying
/// `overlap` chars of the previous batch for cross-boundary context.
pub fn create_section_batches(
    items: &[DocItem],
    batch_size: usize,
    overlap: usize,
) -> Vec<SectionBatch> {
    let mut batches = Vec::new();
    let mut current: Vec<&DocItem> = Vec::new();
    let mut current_chars = 0usize;
    let mut current_offset = 0usize;
    let mut previous_overlap = String::new();

    let mut close = |current: &mut Vec<&DocItem>,
                     previous_overlap: &mut String,
                     current_offset: usize,
                     batches: &mut Vec<SectionBatch>| {
        if current.is_empty() {
            return;
        }
        let body: String = current
            .iter()
            .map(|i| i.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let text = format!("{previous_overlap}{body}");
        batches.push(SectionBatch {
            offset: current_offset as isize - previous_overlap.len() as isize,
            text,
            docitem_ids: current.iter().map(|i| i.docitem_id.clone()).collect(),
        });
        *previous_overlap = if body.len() > overlap {
            body[body.len() - overlap..].to_string()
        } else {
            body
        };
        current.clear();
    };

    for item in items {
        if item.text.is_empty() {
            continue;
        }
        let item_chars = item.text.len() + 1;
        if current_chars + item_chars > batch_size && !current.is_empty() {
            close(&mut current, &mut previous_overlap, current_offset, &mut batches);
            current_offset += current_chars;
            current_chars = 0;
        }
        current.push(item);
        current_chars += item_chars;
    }
    close(&mut current, &mut previous_overlap, current_offset, &mut batches);

    batches
}

/// Resolve a large document batch by batch, re-offsetting mentions and
/// deduplicating the overlap.
pub fn resolve_with_section_batching(
    items: &[DocItem],
    engine: &dyn CorefEngine,
    lang: &str,
    batch_size: usize,
    overlap: usize,
) -> Vec<CoreferenceCluster> {
    let batches = create_section_batches(items, batch_size, overlap);
    info!(batches = batches.len(), "coref_section_batching");

    let mut all_clusters = Vec::new();
    for (batch_idx, batch) in batches.iter().enumerate() {
        let mut clusters = engine.resolve(&batch.text, &[], lang);
        for cluster in &mut clusters {
            for mention in &mut cluster.mentions {
                mention.start = (mention.start as isize + batch.offset).max(0) as usize;
                mention.end = (mention.end as isize + batch.offset).max(0) as usize;
            }
        }
        debug!(
            batch = batch_idx + 1,
            chars = batch.text.len(),
            clusters = clusters.len(),
            "coref_batch_resolved"
        );
        all_clusters.extend(clusters);
    }

    deduplicate_overlap_clusters(all_clusters)
}

/// Two clusters are the same if their mention spans are identical.
pub fn deduplicate_overlap_clusters(clusters: Vec<CoreferenceCluster>) -> Vec<CoreferenceCluster> {
    let mut seen: HashSet<Vec<(usize, usize)>> = HashSet::new();
    let before = clusters.len();
    let unique: Vec<CoreferenceCluster> = clusters
        .into_iter()
        .filter(|c| seen.insert(c.signature()))
        .collect();
    if unique.len() != before {
        debug!(removed = before - unique.len(), "coref_overlap_dedup");
    }
    unique
}
