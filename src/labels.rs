use std::cmp::Ordering;
use std::collections::HashMap;

use crate::chunks::Chunk;

/// chunk id -> display label such as `"2.figure"`
pub type LabelMap = HashMap<String, String>;

/// Icon classification used by the views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Figure,
    Table,
    Text,
    Other,
}

impl ChunkKind {
    pub fn classify(kind: &str) -> Self {
        match label_group(kind).as_str() {
            "figure" => ChunkKind::Figure,
            group if group.contains("table") => ChunkKind::Table,
            "text" | "paragraph" | "title" | "heading" => ChunkKind::Text,
            _ => ChunkKind::Other,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            ChunkKind::Figure => "🖼",
            ChunkKind::Table => "▦",
            ChunkKind::Text => "¶",
            ChunkKind::Other => "•",
        }
    }
}

/// Group name used in labels: anything figure- or image-like is `"figure"`,
/// otherwise the trimmed lowercase type, defaulting to `"text"`.
pub fn label_group(kind: &str) -> String {
    let lowered = kind.trim().to_lowercase();
    if lowered.contains("figure") || lowered.contains("image") {
        "figure".to_string()
    } else if lowered.is_empty() {
        "text".to_string()
    } else {
        lowered
    }
}

fn sort_key(chunk: &Chunk) -> (usize, f64, f64) {
    match &chunk.bbox {
        Some(b) => (chunk.page, b.top, b.left),
        None => (chunk.page, 1.0, 1.0),
    }
}

/// Page, then top edge, then left edge; id breaks exact ties so the order
/// does not depend on input order.
pub fn reading_order(a: &Chunk, b: &Chunk) -> Ordering {
    let (pa, ta, la) = sort_key(a);
    let (pb, tb, lb) = sort_key(b);
    pa.cmp(&pb)
        .then(ta.total_cmp(&tb))
        .then(la.total_cmp(&lb))
        .then_with(|| a.id.cmp(&b.id))
}

/// Assign `"{n}.{group}"` labels in one global pass over the document.
pub fn assign_labels(chunks: &[Chunk]) -> LabelMap {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by(|a, b| reading_order(a, b));

    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut labels = LabelMap::with_capacity(chunks.len());

    for chunk in ordered {
        let group = label_group(&chunk.kind);
        let counter = counters.entry(group.clone()).or_insert(0);
        *counter += 1;
        labels.insert(chunk.id.clone(), format!("{}.{}", counter, group));
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{NormalizedBox, RawBox};

    fn chunk(id: &str, kind: &str, page: usize, top: f64, left: f64) -> Chunk {
        Chunk {
            id: id.to_string(),
            kind: kind.to_string(),
            content: String::new(),
            page,
            bbox: NormalizedBox::normalize(RawBox::new(left, top, left + 0.1, top + 0.05)),
        }
    }

    #[test]
    fn test_reference_labels() {
        let chunks = vec![
            chunk("a", "figure", 0, 0.1, 0.1),
            chunk("b", "figure", 0, 0.5, 0.1),
            chunk("c", "table", 0, 0.2, 0.1),
        ];
        let labels = assign_labels(&chunks);
        assert_eq!(labels["a"], "1.figure");
        assert_eq!(labels["b"], "2.figure");
        assert_eq!(labels["c"], "1.table");
    }

    #[test]
    fn test_groups() {
        assert_eq!(label_group("Figure"), "figure");
        assert_eq!(label_group("scanned_image"), "figure");
        assert_eq!(label_group("  Table "), "table");
        assert_eq!(label_group(""), "text");
        assert_eq!(ChunkKind::classify("marginalia"), ChunkKind::Other);
        assert_eq!(ChunkKind::classify("IMAGE"), ChunkKind::Figure);
        assert_eq!(ChunkKind::classify("table"), ChunkKind::Table);
    }

    #[test]
    fn test_page_then_top_then_left() {
        let chunks = vec![
            chunk("p1", "text", 1, 0.0, 0.0),
            chunk("right", "text", 0, 0.3, 0.6),
            chunk("left", "text", 0, 0.3, 0.1),
            chunk("top", "text", 0, 0.1, 0.9),
        ];
        let labels = assign_labels(&chunks);
        assert_eq!(labels["top"], "1.text");
        assert_eq!(labels["left"], "2.text");
        assert_eq!(labels["right"], "3.text");
        assert_eq!(labels["p1"], "4.text");
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut chunks = vec![
            chunk("a", "figure", 0, 0.2, 0.2),
            chunk("b", "text", 0, 0.2, 0.2),
            chunk("c", "figure", 0, 0.2, 0.2),
            chunk("d", "table", 2, 0.7, 0.1),
            Chunk { bbox: None, ..chunk("e", "text", 0, 0.0, 0.0) },
        ];
        let first = assign_labels(&chunks);
        assert_eq!(first, assign_labels(&chunks));

        chunks.reverse();
        assert_eq!(first, assign_labels(&chunks));
        chunks.swap(0, 3);
        assert_eq!(first, assign_labels(&chunks));

        assert_eq!(first["a"], "1.figure");
        assert_eq!(first["c"], "2.figure");
        assert_eq!(first["e"], "2.text");
    }
}
