//! Wire shapes of `DOMSnapshot.captureSnapshot`.
//!
//! All string-valued fields are indices into [`DomSnapshot::strings`]; `-1`
//! means "no string". Per-node arrays of a document share one index space and
//! the layout arrays cover the rendered subset of nodes.

use crate::codec::TransientCodec;
use crate::error::{BrowserError, Result};
use crate::marking::TRANSIENT_ATTRIBUTE;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Index into the snapshot's strings table
pub type StringIndex = i64;

/// Element node type
pub const ELEMENT_NODE: i64 = 1;
/// Text node type
pub const TEXT_NODE: i64 = 3;

/// Treat an explicit `null` like a missing field
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Sparse string column: `value[i]` belongs to node `index[i]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RareStringData {
    #[serde(default, deserialize_with = "nullable")]
    pub index: Vec<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub value: Vec<StringIndex>,
}

impl RareStringData {
    pub fn to_map(&self) -> HashMap<i64, StringIndex> {
        self.index.iter().copied().zip(self.value.iter().copied()).collect()
    }
}

/// Sparse boolean column: nodes listed in `index` are `true`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RareBooleanData {
    #[serde(default, deserialize_with = "nullable")]
    pub index: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RareIntegerData {
    #[serde(default, deserialize_with = "nullable")]
    pub index: Vec<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub value: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTreeSnapshot {
    #[serde(default, deserialize_with = "nullable")]
    pub parent_index: Vec<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub node_type: Vec<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub node_name: Vec<StringIndex>,
    #[serde(default, deserialize_with = "nullable")]
    pub node_value: Vec<StringIndex>,
    #[serde(default, deserialize_with = "nullable")]
    pub backend_node_id: Vec<i64>,
    /// Flattened `[name, value, name, value, ...]` string indices per node
    #[serde(default, deserialize_with = "nullable")]
    pub attributes: Vec<Vec<StringIndex>>,
    #[serde(default, deserialize_with = "nullable")]
    pub text_value: RareStringData,
    #[serde(default, deserialize_with = "nullable")]
    pub input_value: RareStringData,
    #[serde(default, deserialize_with = "nullable")]
    pub input_checked: RareBooleanData,
    #[serde(default, deserialize_with = "nullable")]
    pub option_selected: RareBooleanData,
    /// Frame owner node → index of the hosted document
    #[serde(default, deserialize_with = "nullable")]
    pub content_document_index: RareIntegerData,
    #[serde(default, deserialize_with = "nullable")]
    pub is_clickable: RareBooleanData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeTreeSnapshot {
    pub fn len(&self) -> usize {
        self.parent_index
            .len()
            .max(self.node_name.len())
            .max(self.node_type.len())
            .max(self.attributes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node_type(&self, node: usize) -> Option<i64> {
        self.node_type.get(node).copied()
    }

    /// `(name, value)` string index pairs of a node
    pub fn attribute_pairs(&self, node: usize) -> impl Iterator<Item = (StringIndex, StringIndex)> + '_ {
        self.attributes
            .get(node)
            .map(|attrs| attrs.as_slice())
            .unwrap_or_default()
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutTreeSnapshot {
    #[serde(default, deserialize_with = "nullable")]
    pub node_index: Vec<i64>,
    /// `[x, y, width, height]` relative to the owning document
    #[serde(default, deserialize_with = "nullable")]
    pub bounds: Vec<Vec<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub client_rects: Vec<Vec<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub paint_orders: Vec<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(rename = "documentURL", default = "missing_string")]
    pub document_url: StringIndex,
    #[serde(default = "missing_string")]
    pub frame_id: StringIndex,
    #[serde(default, deserialize_with = "nullable")]
    pub nodes: NodeTreeSnapshot,
    #[serde(default, deserialize_with = "nullable")]
    pub layout: LayoutTreeSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_offset_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_offset_y: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn missing_string() -> StringIndex {
    -1
}

impl DocumentSnapshot {
    pub fn scroll_offset(&self) -> (f64, f64) {
        (self.scroll_offset_x.unwrap_or(0.0), self.scroll_offset_y.unwrap_or(0.0))
    }

    /// `(node, child document)` pairs for frame owner nodes
    pub fn content_documents(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        let links = &self.nodes.content_document_index;
        links.index.iter().copied().zip(links.value.iter().copied())
    }
}

/// Result of one `DOMSnapshot.captureSnapshot` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    #[serde(default, deserialize_with = "nullable")]
    pub documents: Vec<DocumentSnapshot>,
    #[serde(default, deserialize_with = "nullable")]
    pub strings: Vec<String>,
}

impl DomSnapshot {
    pub fn string_table(&self) -> StringTable<'_> {
        StringTable::new(&self.strings)
    }

    /// Decode the transient data out of every `aria-roledescription` value.
    ///
    /// Shared value strings are rewritten once; attribute pairs whose original
    /// text is empty are dropped. Returns the number of attributes removed.
    pub fn strip_transient_data<C>(&mut self, codec: &C) -> usize
    where
        C: TransientCodec + ?Sized,
    {
        let Some(name_id) = self.string_table().position(TRANSIENT_ATTRIBUTE) else {
            return 0;
        };

        let mut processed: HashSet<StringIndex> = HashSet::new();
        let mut removed = 0;
        for document in &mut self.documents {
            for attrs in &mut document.nodes.attributes {
                let Some(pair) = attrs.chunks_exact(2).position(|pair| pair[0] == name_id) else {
                    continue;
                };
                let value_id = attrs[2 * pair + 1];
                let Some(value) = usize::try_from(value_id).ok().and_then(|i| self.strings.get_mut(i)) else {
                    continue;
                };
                if processed.insert(value_id) {
                    *value = codec.decode(value).original;
                }
                if value.is_empty() {
                    attrs.drain(2 * pair..2 * pair + 2);
                    removed += 1;
                }
            }
        }
        removed
    }
}

/// Interned string table with a one-time reverse lookup
#[derive(Debug)]
pub struct StringTable<'a> {
    strings: &'a [String],
    positions: HashMap<&'a str, StringIndex>,
}

impl<'a> StringTable<'a> {
    pub fn new(strings: &'a [String]) -> Self {
        let mut positions = HashMap::with_capacity(strings.len());
        for (i, s) in strings.iter().enumerate() {
            positions.entry(s.as_str()).or_insert(i as StringIndex);
        }
        Self { strings, positions }
    }

    /// Index of a string, or `None` if this snapshot never interned it
    pub fn position(&self, value: &str) -> Option<StringIndex> {
        self.positions.get(value).copied()
    }

    /// `Ok(None)` for the `-1` sentinel, an error for an index past the table
    pub fn resolve(&self, index: StringIndex) -> Result<Option<&'a str>> {
        if index < 0 {
            return Ok(None);
        }
        self.strings
            .get(index as usize)
            .map(|s| Some(s.as_str()))
            .ok_or_else(|| {
                BrowserError::MalformedSnapshot(format!(
                    "string index {} out of range ({} strings)",
                    index,
                    self.strings.len()
                ))
            })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::UnderscoreCodec;
    use serde_json::json;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_string_table_lookup() {
        let strings = strings(&["bid", "DIV", "bid", "alt"]);
        let table = StringTable::new(&strings);

        assert_eq!(table.position("bid"), Some(0));
        assert_eq!(table.position("alt"), Some(3));
        assert_eq!(table.position("missing"), None);
        assert_eq!(table.resolve(1).unwrap(), Some("DIV"));
        assert_eq!(table.resolve(-1).unwrap(), None);
        assert!(matches!(table.resolve(9), Err(BrowserError::MalformedSnapshot(_))));
    }

    #[test]
    fn test_deserialize_cdp_payload() {
        let payload = json!({
            "documents": [{
                "documentURL": 0,
                "title": 1,
                "frameId": 2,
                "nodes": {
                    "parentIndex": [-1, 0],
                    "nodeType": [9, 1],
                    "nodeName": [3, 4],
                    "nodeValue": [-1, -1],
                    "attributes": [[], [5, 6]],
                    "textValue": {"index": [], "value": []},
                    "isClickable": {"index": [1]},
                    "contentDocumentIndex": null
                },
                "layout": {
                    "nodeIndex": [1],
                    "bounds": [[0, 0, 100, 20]],
                    "text": [-1],
                    "styles": [[]],
                    "stackingContexts": {"index": []}
                },
                "textBoxes": {"layoutIndex": [], "bounds": [], "start": [], "length": []},
                "scrollOffsetX": 0,
                "scrollOffsetY": 12.5
            }],
            "strings": ["about:blank", "", "F1", "#document", "BUTTON", "bid", "0"]
        });

        let snapshot: DomSnapshot = serde_json::from_value(payload).unwrap();
        let document = &snapshot.documents[0];

        assert_eq!(document.nodes.len(), 2);
        assert_eq!(document.nodes.is_clickable.index, vec![1]);
        assert!(document.nodes.content_document_index.index.is_empty());
        assert_eq!(document.scroll_offset(), (0.0, 12.5));
        assert!(document.layout.client_rects.is_empty());
        assert!(document.layout.extra.contains_key("stackingContexts"));
        assert!(document.extra.contains_key("textBoxes"));

        let pairs: Vec<_> = document.nodes.attribute_pairs(1).collect();
        assert_eq!(pairs, vec![(5, 6)]);
    }

    #[test]
    fn test_serialization_preserves_unknown_fields() {
        let payload = json!({
            "documents": [{
                "documentURL": 0,
                "frameId": 0,
                "nodes": {"parentIndex": [-1], "shadowRootType": {"index": [], "value": []}},
                "layout": {"nodeIndex": [], "bounds": [], "text": []},
                "contentWidth": 800.0
            }],
            "strings": ["x"]
        });

        let snapshot: DomSnapshot = serde_json::from_value(payload).unwrap();
        let value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(value["documents"][0]["contentWidth"], json!(800.0));
        assert!(value["documents"][0]["nodes"]["shadowRootType"].is_object());
    }

    #[test]
    fn test_strip_transient_data() {
        let mut snapshot = DomSnapshot {
            documents: vec![DocumentSnapshot {
                nodes: NodeTreeSnapshot {
                    parent_index: vec![-1, 0, 0, 0],
                    attributes: vec![vec![], vec![0, 1, 4, 5], vec![0, 2], vec![4, 6, 0, 2]],
                    ..Default::default()
                },
                ..Default::default()
            }],
            strings: strings(&["aria-roledescription", "12_", "13_slide", "unused", "bid", "12", "13"]),
        };

        let removed = snapshot.strip_transient_data(&UnderscoreCodec::default());

        assert_eq!(removed, 1);
        assert_eq!(snapshot.strings[1], "");
        assert_eq!(snapshot.strings[2], "slide");
        let attrs = &snapshot.documents[0].nodes.attributes;
        assert_eq!(attrs[1], vec![4, 5]);
        assert_eq!(attrs[2], vec![0, 2]);
        assert_eq!(attrs[3], vec![4, 6, 0, 2]);
    }

    #[test]
    fn test_strip_without_transient_attribute_is_noop() {
        let mut snapshot = DomSnapshot { documents: vec![], strings: strings(&["bid"]) };
        assert_eq!(snapshot.strip_transient_data(&UnderscoreCodec::default()), 0);
        assert_eq!(snapshot.strings, vec!["bid"]);
    }
}
