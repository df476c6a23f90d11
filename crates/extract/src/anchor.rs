//! Anchor resolution: from a chunk-level assertion to an exact span in a
//! DocItem.
//!
//! An assertion that cannot be located verbatim in one of its chunk's
//! items abstains; it never becomes persisted knowledge.

use std::collections::HashMap;

use model::{Anchor, DocItem};

use ingest::UnitIndex;

use crate::assertions::AssertionDraft;
use crate::error::AbstainReason;

/// Resolver context built once per document.
pub struct AnchorResolver<'a> {
    chunk_to_items: &'a HashMap<String, Vec<String>>,
    items: HashMap<&'a str, &'a DocItem>,
    unit_index: &'a UnitIndex,
}

impl<'a> AnchorResolver<'a> {
    pub fn new(
        chunk_to_items: &'a HashMap<String, Vec<String>>,
        items: &'a [DocItem],
        unit_index: &'a UnitIndex,
    ) -> Self {
        Self {
            chunk_to_items,
            items: items.iter().map(|i| (i.docitem_id.as_str(), i)).collect(),
            unit_index,
        }
    }

    /// Resolve one assertion to its anchor.
    pub fn resolve(&self, draft: &AssertionDraft) -> Result<Anchor, AbstainReason> {
        let candidates = self
            .chunk_to_items
            .get(&draft.chunk_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for docitem_id in candidates {
            let Some(item) = self.items.get(docitem_id.as_str()) else {
                continue;
            };
            let Some(pos) = item.text.find(&draft.text) else {
                continue;
            };
            let char_start = pos;
            let char_end = pos + draft.text.len();
            // Pick the unit containing the span's start, when indexed.
            let unit_id = self.unit_index.item(docitem_id).and_then(|units| {
                units
                    .units
                    .iter()
                    .find(|u| char_start >= u.char_start && char_start < u.char_end)
                    .map(|u| u.local_id.clone())
            });
            return Ok(Anchor {
                docitem_id: (*docitem_id).clone(),
                unit_id,
                char_start,
                char_end,
            });
        }
        Err(AbstainReason::AnchorNotFound)
    }

    /// Resolve a batch, splitting resolved from abstained.
    pub fn resolve_all(
        &self,
        drafts: &[AssertionDraft],
    ) -> (Vec<(AssertionDraft, Anchor)>, Vec<(AssertionDraft, AbstainReason)>) {
        let mut resolved = Vec::new();
        let mut failed = Vec::new();
        for draft in drafts {
            match self.resolve(draft) {
                Ok(anchor) => resolved.push((draft.clone(), anchor)),
                Err(reason) => failed.push((draft.clone(), reason)),
            }
        }
        (resolved, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::{DocumentMetadata, Pass0Config, PlainTextParser, RawDocument};
    use model::AssertionKind;

    #[test]
    fn anchors_point_at_verbatim_spans() {
        let out = ingest::run_pass0(
            RawDocument::from_text(
                DocumentMetadata {
                    tenant_id: "tenant-a".into(),
                    document_id: None,
                    title: "Anchor Sample".into(),
                    language: Some("en".into()),
                    source_url: None,
                },
                "The gateway must use TLS 1.2 for all external traffic without exception.\n",
            ),
            &PlainTextParser,
            &Pass0Config::default(),
        )
        .unwrap();

        let resolver = AnchorResolver::new(&out.chunk_to_items, &out.items, &out.unit_index);
        let draft = AssertionDraft {
            assertion_id: "asr_00001".into(),
            chunk_id: out.chunks[0].chunk_id.clone(),
            text: "The gateway must use TLS 1.2 for all external traffic without exception.".into(),
            kind: AssertionKind::Prescriptive,
            confidence: 0.9,
        };

        let anchor = resolver.resolve(&draft).expect("anchored");
        let item = out
            .items
            .iter()
            .find(|i| i.docitem_id == anchor.docitem_id)
            .unwrap();
        // The anchored substring contains the claim.
        assert_eq!(anchor.quote(&item.text), Some(draft.text.as_str()));
        assert!(anchor.unit_id.is_some());

        // An invented claim abstains.
        let phantom = AssertionDraft {
            text: "The gateway is cloud native.".into(),
            ..draft
        };
        assert_eq!(resolver.resolve(&phantom), Err(AbstainReason::AnchorNotFound));
    }
}
