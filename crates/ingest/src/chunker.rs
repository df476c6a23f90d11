//! Chunk builder: cuts reading-order items into retrieval-sized slices.

use std::collections::HashMap;

use model::{Chunk, ChunkKind, DocItem, DocItemKind};

use crate::config::Pass0Config;

/// Build chunks over consecutive DocItems, closing a chunk at the target
/// size or at a section boundary. Returns the chunks plus the
/// chunk → DocItems map the anchor resolver needs later.
pub fn build_chunks(
    doc_version_id: &str,
    tenant_id: &str,
    items: &[DocItem],
    cfg: &Pass0Config,
) -> (Vec<Chunk>, HashMap<String, Vec<String>>) {
    let mut chunks = Vec::new();
    let mut map: HashMap<String, Vec<String>> = HashMap::new();

    let mut buf_text = String::new();
    let mut buf_items: Vec<&DocItem> = Vec::new();

    let close =
        |buf_text: &mut String,
         buf_items: &mut Vec<&DocItem>,
         chunks: &mut Vec<Chunk>,
         map: &mut HashMap<String, Vec<String>>| {
            if buf_items.is_empty() {
                return;
            }
            let index = chunks.len();
            let chunk_id = format!("{}_c{index:03}", doc_version_id.replace("dv_", "ch_"));
            let kinds: Vec<DocItemKind> = buf_items.iter().map(|i| i.kind).collect();
            let kind = if kinds.iter().all(|k| *k == DocItemKind::Table) {
                ChunkKind::Table
            } else if kinds.iter().any(|k| *k == DocItemKind::Table) {
                ChunkKind::Mixed
            } else {
                ChunkKind::Narrative
            };
            chunks.push(Chunk {
                chunk_id: chunk_id.clone(),
                doc_version_id: doc_version_id.to_string(),
                tenant_id: tenant_id.to_string(),
                kind,
                order_start: buf_items[0].reading_order_index,
                section_path: buf_items[0].section_id.clone(),
                text: buf_text.trim().to_string(),
            });
            map.insert(
                chunk_id,
                buf_items.iter().map(|i| i.docitem_id.clone()).collect(),
            );
            buf_text.clear();
            buf_items.clear();
        };

    let mut current_section: Option<&str> = None;
    for item in items {
        let section = item.section_id.as_deref();
        let section_changed = !buf_items.is_empty() && section != current_section;
        let over_budget = buf_text.len() + item.text.len() > cfg.chunk_target_chars;
        if section_changed || over_budget {
            close(&mut buf_text, &mut buf_items, &mut chunks, &mut map);
        }
        current_section = section;
        if !buf_text.is_empty() {
            buf_text.push('\n');
        }
        buf_text.push_str(&item.text);
        buf_items.push(item);
    }
    close(&mut buf_text, &mut buf_items, &mut chunks, &mut map);

    (chunks, map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(idx: usize, section: Option<&str>, kind: DocItemKind, text: &str) -> DocItem {
        DocItem {
            docitem_id: format!("di_test_{idx:03}"),
            doc_version_id: "dv_test".into(),
            tenant_id: "default".into(),
            kind,
            reading_order_index: idx,
            page: None,
            section_id: section.map(String::from),
            char_start: 0,
            char_end: text.len(),
            text: text.into(),
        }
    }

    #[test]
    fn chunks_close_at_section_boundaries() {
        let items = vec![
            item(0, Some("Intro"), DocItemKind::Narrative, "first part"),
            item(1, Some("Intro"), DocItemKind::Narrative, "second part"),
            item(2, Some("Security"), DocItemKind::Narrative, "third part"),
        ];
        let (chunks, map) =
            build_chunks("dv_abc", "default", &items, &Pass0Config::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section_path.as_deref(), Some("Intro"));
        assert_eq!(chunks[1].section_path.as_deref(), Some("Security"));
        assert_eq!(map[&chunks[0].chunk_id], vec!["di_test_000", "di_test_001"]);
    }

    #[test]
    fn table_only_chunks_are_typed() {
        let items = vec![
            item(0, None, DocItemKind::Table, "| a | b |"),
            item(1, None, DocItemKind::Table, "| c | d |"),
        ];
        let (chunks, _) = build_chunks("dv_abc", "default", &items, &Pass0Config::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Table);
    }

    #[test]
    fn size_budget_splits_chunks() {
        let cfg = Pass0Config {
            chunk_target_chars: 20,
            ..Pass0Config::default()
        };
        let items = vec![
            item(0, None, DocItemKind::Narrative, "aaaaaaaaaaaaaaa"),
            item(1, None, DocItemKind::Narrative, "bbbbbbbbbbbbbbb"),
        ];
        let (chunks, _) = build_chunks("dv_abc", "default", &items, &cfg);
        assert_eq!(chunks.len(), 2);
    }
}
