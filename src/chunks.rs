//! Chunk extraction from AI extraction payloads.
//!
//! The upstream response shape is not stable. Known shapes are probed first;
//! after that a bounded breadth-first search looks for the first key named
//! `chunks` that holds an array.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

use crate::geometry::NormalizedBox;
use crate::labels::{assign_labels, LabelMap};

/// Default node-visit budget for the generic search
pub const DEFAULT_SEARCH_BUDGET: usize = 5000;

/// Response shapes seen from the extraction backend, in probe order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownShape {
    /// `{ "chunks": [...] }`
    Root,
    /// `{ "data": { "chunks": [...] } }`
    Data,
    /// `{ "result": { "chunks": [...] } }`
    Result,
}

impl KnownShape {
    pub const ALL: [KnownShape; 3] = [KnownShape::Root, KnownShape::Data, KnownShape::Result];

    fn path(&self) -> &'static [&'static str] {
        match self {
            KnownShape::Root => &["chunks"],
            KnownShape::Data => &["data", "chunks"],
            KnownShape::Result => &["result", "chunks"],
        }
    }

    fn probe<'a>(&self, payload: &'a Value) -> Option<&'a Vec<Value>> {
        let mut node = payload;
        for key in self.path() {
            node = node.as_object()?.get(*key)?;
        }
        node.as_array()
    }
}

/// One extracted content unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    /// Free-form category tag from the payload ("figure", "table", ...)
    pub kind: String,
    pub content: String,
    /// Zero-based page index
    pub page: usize,
    pub bbox: Option<NormalizedBox>,
}

impl Chunk {
    /// Only chunks with a usable box are drawn or hit-tested.
    pub fn overlay_box(&self) -> Option<&NormalizedBox> {
        self.bbox.as_ref()
    }
}

/// Locate the chunk array in an arbitrary payload.
///
/// Returns `None` for non-object payloads and when nothing is found within
/// `budget` visited nodes.
pub fn find_chunk_array(payload: &Value, budget: usize) -> Option<&Vec<Value>> {
    if !payload.is_object() {
        return None;
    }

    for shape in KnownShape::ALL {
        if let Some(found) = shape.probe(payload) {
            debug!(?shape, "chunk array found at known path");
            return Some(found);
        }
    }

    let mut queue: VecDeque<&Value> = VecDeque::new();
    let mut visited: HashSet<*const Value> = HashSet::new();
    queue.push_back(payload);
    let mut visits = 0usize;

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node as *const Value) {
            continue;
        }
        visits += 1;
        if visits > budget {
            warn!(budget, "chunk search budget exhausted");
            return None;
        }

        match node {
            Value::Object(map) => {
                for (key, value) in map {
                    if key == "chunks" {
                        if let Value::Array(items) = value {
                            debug!(visits, "chunk array found by search");
                            return Some(items);
                        }
                    }
                    if value.is_object() || value.is_array() {
                        queue.push_back(value);
                    }
                }
            }
            Value::Array(items) => {
                queue.extend(items.iter().filter(|v| v.is_object() || v.is_array()));
            }
            _ => {}
        }
    }

    None
}

fn read_id(item: &serde_json::Map<String, Value>) -> Option<String> {
    let id = match item.get("id")? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn read_page(value: Option<&Value>) -> usize {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|p| p as usize)
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as usize))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<usize>().unwrap_or(0),
        _ => 0,
    }
}

/// Grounding may be one object or a list; the first entry with a usable box wins.
fn read_grounding(value: Option<&Value>) -> (usize, Option<NormalizedBox>) {
    let candidates: Vec<&Value> = match value {
        Some(Value::Array(list)) => list.iter().collect(),
        Some(v @ Value::Object(_)) => vec![v],
        _ => return (0, None),
    };

    let mut first_page = None;
    for grounding in candidates {
        let Some(obj) = grounding.as_object() else {
            continue;
        };
        let page = read_page(obj.get("page"));
        first_page.get_or_insert(page);
        if let Some(bbox) = obj.get("box").and_then(NormalizedBox::from_value) {
            return (page, Some(bbox));
        }
    }

    (first_page.unwrap_or(0), None)
}

fn read_text(item: &serde_json::Map<String, Value>) -> String {
    ["content", "markdown", "text"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Normalize raw chunk records. Items without an id are discarded; a repeated
/// id keeps its first occurrence.
pub fn parse_chunks(raw: &[Value]) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    let mut chunks = Vec::with_capacity(raw.len());

    for item in raw {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let Some(id) = read_id(obj) else {
            continue;
        };
        if !seen.insert(id.clone()) {
            debug!(%id, "duplicate chunk id ignored");
            continue;
        }

        let kind = obj
            .get("type")
            .or_else(|| obj.get("chunk_type"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("text")
            .to_string();

        let (page, bbox) = read_grounding(obj.get("grounding"));

        chunks.push(Chunk {
            id,
            kind,
            content: read_text(obj),
            page,
            bbox,
        });
    }

    chunks
}

/// Immutable view of one payload: chunks, their labels and a page index.
///
/// Rebuilt wholesale whenever the payload changes, never edited in place.
#[derive(Debug, Clone, Default)]
pub struct ChunkSnapshot {
    chunks: Vec<Chunk>,
    labels: LabelMap,
    by_id: HashMap<String, usize>,
    by_page: BTreeMap<usize, Vec<usize>>,
}

impl ChunkSnapshot {
    pub fn from_payload(payload: &Value, budget: usize) -> Self {
        let raw = find_chunk_array(payload, budget).map(Vec::as_slice).unwrap_or(&[]);
        let snapshot = Self::from_chunks(parse_chunks(raw));
        info!(
            raw = raw.len(),
            chunks = snapshot.len(),
            grounded = snapshot.grounded().count(),
            "chunk snapshot built"
        );
        snapshot
    }

    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let labels = assign_labels(&chunks);
        let by_id = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        let mut by_page: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.bbox.is_some() {
                by_page.entry(chunk.page).or_default().push(i);
            }
        }

        Self { chunks, labels, by_id, by_page }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.by_id.get(id).map(|&i| &self.chunks[i])
    }

    pub fn label(&self, id: &str) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Chunks eligible for overlay rendering
    pub fn grounded(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| c.bbox.is_some())
    }

    /// Grounded chunks on one page
    pub fn on_page(&self, page: usize) -> impl Iterator<Item = &Chunk> {
        self.by_page
            .get(&page)
            .into_iter()
            .flatten()
            .map(|&i| &self.chunks[i])
    }

    /// Chunks in label order: page, then top, then left
    pub fn reading_order(&self) -> Vec<&Chunk> {
        let mut ordered: Vec<&Chunk> = self.chunks.iter().collect();
        ordered.sort_by(|a, b| crate::labels::reading_order(a, b));
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(found: Option<&Vec<Value>>) -> Vec<String> {
        found
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_known_shapes() {
        let root = json!({"chunks": [{"id": "r"}]});
        let data = json!({"data": {"chunks": [{"id": "d"}]}});
        let result = json!({"result": {"chunks": [{"id": "x"}]}});
        assert_eq!(ids(find_chunk_array(&root, 10)), vec!["r"]);
        assert_eq!(ids(find_chunk_array(&data, 10)), vec!["d"]);
        assert_eq!(ids(find_chunk_array(&result, 10)), vec!["x"]);
    }

    #[test]
    fn test_nested_search() {
        let payload = json!({"foo": {"bar": {"chunks": [{"id": "deep"}]}}});
        assert_eq!(ids(find_chunk_array(&payload, DEFAULT_SEARCH_BUDGET)), vec!["deep"]);

        let in_list = json!({"pages": [{"meta": 1}, {"chunks": [{"id": "p2"}]}]});
        assert_eq!(ids(find_chunk_array(&in_list, DEFAULT_SEARCH_BUDGET)), vec!["p2"]);
    }

    #[test]
    fn test_search_is_breadth_first() {
        let payload = json!({
            "a": {"b": {"c": {"chunks": [{"id": "deep"}]}}},
            "z": {"chunks": [{"id": "shallow"}]}
        });
        assert_eq!(ids(find_chunk_array(&payload, DEFAULT_SEARCH_BUDGET)), vec!["shallow"]);
    }

    #[test]
    fn test_non_array_chunks_and_non_objects() {
        assert!(find_chunk_array(&json!({"chunks": "not an array"}), 100).is_none());
        assert!(find_chunk_array(&json!([{"chunks": []}]), 100).is_none());
        assert!(find_chunk_array(&json!("chunks"), 100).is_none());
        assert!(ChunkSnapshot::from_payload(&json!({"chunks": 3}), 100).is_empty());
    }

    #[test]
    fn test_budget_bounds_search() {
        let mut payload = json!({"chunks_here": {"chunks": [{"id": "late"}]}});
        for _ in 0..20 {
            payload = json!({"wrap": payload});
        }
        assert!(find_chunk_array(&payload, 5).is_none());
        assert_eq!(ids(find_chunk_array(&payload, 100)), vec!["late"]);
    }

    #[test]
    fn test_parse_discards_missing_ids_and_bad_boxes() {
        let raw = vec![
            json!({"type": "text", "content": "no id"}),
            json!({"id": "  ", "content": "blank id"}),
            json!({"id": "a", "type": "Table", "markdown": "| x |",
                   "grounding": {"page": 2, "box": {"left": 0.1, "top": 0.1, "right": 0.4, "bottom": 0.3}}}),
            json!({"id": "b", "grounding": {"page": 1, "box": {"left": 0.5, "top": 0.1, "right": 0.4, "bottom": 0.3}}}),
            json!({"id": "a", "content": "duplicate"}),
            json!({"id": 7, "text": "numeric id"}),
        ];
        let chunks = parse_chunks(&raw);
        assert_eq!(chunks.len(), 3);

        assert_eq!(chunks[0].id, "a");
        assert_eq!(chunks[0].kind, "Table");
        assert_eq!(chunks[0].content, "| x |");
        assert_eq!(chunks[0].page, 2);
        assert!(chunks[0].overlay_box().is_some());

        assert_eq!(chunks[1].id, "b");
        assert_eq!(chunks[1].kind, "text");
        assert_eq!(chunks[1].page, 1);
        assert!(chunks[1].overlay_box().is_none());

        assert_eq!(chunks[2].id, "7");
        assert_eq!(chunks[2].content, "numeric id");
    }

    #[test]
    fn test_grounding_list_takes_first_usable_box() {
        let raw = vec![json!({"id": "g", "grounding": [
            {"page": 0, "box": null},
            {"page": 3, "box": {"left": 0.2, "top": 0.2, "right": 0.3, "bottom": 0.3}}
        ]})];
        let chunks = parse_chunks(&raw);
        assert_eq!(chunks[0].page, 3);
        assert!(chunks[0].bbox.is_some());
    }

    #[test]
    fn test_snapshot_page_index() {
        let payload = json!({"data": {"chunks": [
            {"id": "p0", "grounding": {"page": 0, "box": {"left": 0, "top": 0, "right": 0.5, "bottom": 0.5}}},
            {"id": "p1", "grounding": {"page": 1, "box": {"left": 0, "top": 0, "right": 0.5, "bottom": 0.5}}},
            {"id": "loose", "content": "no grounding"}
        ]}});
        let snapshot = ChunkSnapshot::from_payload(&payload, DEFAULT_SEARCH_BUDGET);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.grounded().count(), 2);
        assert_eq!(snapshot.on_page(1).map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["p1"]);
        assert_eq!(snapshot.on_page(5).count(), 0);
        // Unboxed chunks sort after the boxed ones on their own page
        assert_eq!(snapshot.label("p0"), Some("1.text"));
        assert_eq!(snapshot.label("loose"), Some("2.text"));
        assert_eq!(snapshot.label("p1"), Some("3.text"));
    }
}
