use crate::dom::snapshot::{DocumentSnapshot, DomSnapshot, StringTable, TEXT_NODE};
use crate::error::{BrowserError, Result};
use crate::marking::{BID_ATTRIBUTE, SET_OF_MARKS_ATTRIBUTE, VISIBILITY_ATTRIBUTE};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Bounding box in absolute page coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Parse a CDP `[x, y, width, height]` rectangle
    pub fn from_rect(rect: &[f64]) -> Option<Self> {
        match rect {
            [x, y, width, height, ..] => Some(Self::new(*x, *y, *width, *height)),
            _ => None,
        }
    }

    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy, ..self }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Per-element properties derived from the DOM snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtraProperties {
    /// Fraction of the element inside the viewport, as measured at marking time
    pub visibility: Option<f64>,

    /// `None` when the element is not rendered
    pub bbox: Option<BoundingBox>,

    pub clickable: bool,

    pub set_of_marks: Option<bool>,

    /// Upper-case tag name
    pub element: Option<String>,

    pub alt: Option<String>,

    /// Raw concatenation of direct child text and the element's own text
    pub text_content: Option<String>,
}

/// Extra properties keyed by bid, in document order
pub type ExtraPropertiesMap = IndexMap<String, ExtraProperties>;

/// Attribute name ids looked up once per snapshot
struct AttributeIds {
    bid: Option<i64>,
    visibility: Option<i64>,
    set_of_marks: Option<i64>,
    alt: Option<i64>,
}

impl AttributeIds {
    fn new(strings: &StringTable<'_>) -> Self {
        Self {
            bid: strings.position(BID_ATTRIBUTE),
            visibility: strings.position(VISIBILITY_ATTRIBUTE),
            set_of_marks: strings.position(SET_OF_MARKS_ATTRIBUTE),
            alt: strings.position("alt"),
        }
    }
}

/// Derive the extra properties of every marked element.
///
/// Documents are visited depth-first from the main document through the
/// content document links. A document's absolute offset is its owner element's
/// offset in the parent document minus its own scroll offset.
pub fn derive_extra_properties(snapshot: &DomSnapshot) -> Result<ExtraPropertiesMap> {
    let strings = snapshot.string_table();
    let ids = AttributeIds::new(&strings);
    let mut properties = ExtraPropertiesMap::new();

    if snapshot.documents.is_empty() {
        return Ok(properties);
    }

    let mut visited: HashSet<usize> = HashSet::new();
    let mut stack: Vec<(usize, (f64, f64))> = vec![(0, (0.0, 0.0))];

    while let Some((doc_index, owner_offset)) = stack.pop() {
        if !visited.insert(doc_index) {
            log::warn!("Document {} is linked more than once in the snapshot, skipping", doc_index);
            continue;
        }
        let document = snapshot.documents.get(doc_index).ok_or_else(|| {
            BrowserError::MalformedSnapshot(format!("content document index {} out of range", doc_index))
        })?;

        let (scroll_x, scroll_y) = document.scroll_offset();
        let abs = (owner_offset.0 - scroll_x, owner_offset.1 - scroll_y);

        let layout_bounds = layout_bounds_by_node(document);
        for (node, child_doc) in document.content_documents() {
            let child = usize::try_from(child_doc).map_err(|_| {
                BrowserError::MalformedSnapshot(format!("negative content document index {}", child_doc))
            })?;
            let child_offset = match layout_bounds.get(&node) {
                Some(bounds) => (abs.0 + bounds.x, abs.1 + bounds.y),
                None => abs,
            };
            stack.push((child, child_offset));
        }

        collect_document(document, &strings, &ids, abs, &mut properties)?;
    }

    Ok(properties)
}

/// Relative bounds of every laid-out node, keyed by node index
fn layout_bounds_by_node(document: &DocumentSnapshot) -> HashMap<i64, BoundingBox> {
    let layout = &document.layout;
    layout
        .node_index
        .iter()
        .zip(layout.bounds.iter())
        .filter_map(|(node, rect)| BoundingBox::from_rect(rect).map(|bbox| (*node, bbox)))
        .collect()
}

fn collect_document(
    document: &DocumentSnapshot,
    strings: &StringTable<'_>,
    ids: &AttributeIds,
    abs: (f64, f64),
    properties: &mut ExtraPropertiesMap,
) -> Result<()> {
    let nodes = &document.nodes;
    let count = nodes.len();

    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for (child, parent) in nodes.parent_index.iter().enumerate() {
        if let Ok(parent) = usize::try_from(*parent) {
            children.entry(parent).or_default().push(child);
        }
    }

    let text_values = nodes.text_value.to_map();
    let input_values = nodes.input_value.to_map();
    let clickable: HashSet<i64> = nodes.is_clickable.index.iter().copied().collect();
    let bboxes = absolute_bboxes(document, abs);

    // text of a node on its own: node value, then input value, then text value
    let own_text = |node: usize| -> Result<Option<&str>> {
        if let Some(text) = nodes.node_value.get(node).map(|id| strings.resolve(*id)).transpose()?.flatten() {
            return Ok(Some(text));
        }
        for column in [&input_values, &text_values] {
            if let Some(id) = column.get(&(node as i64)) {
                return strings.resolve(*id);
            }
        }
        Ok(None)
    };

    for node in 0..count {
        let mut bid = None;
        let mut visibility = None;
        let mut set_of_marks = None;
        let mut alt = None;

        for (name, value) in nodes.attribute_pairs(node) {
            let name = Some(name);
            if name == ids.bid {
                bid = strings.resolve(value)?;
            } else if name == ids.visibility {
                visibility = strings.resolve(value)?.and_then(|v| match v.trim().parse::<f64>() {
                    Ok(ratio) => Some(ratio),
                    Err(_) => {
                        log::warn!("Unparsable {} value {:?}", VISIBILITY_ATTRIBUTE, v);
                        None
                    }
                });
            } else if name == ids.set_of_marks {
                set_of_marks = Some(strings.resolve(value)? == Some("1"));
            } else if name == ids.alt {
                alt = strings.resolve(value)?.map(str::to_string);
            }
        }

        let Some(bid) = bid else {
            continue;
        };

        let mut parts: Vec<&str> = Vec::new();
        for child in children.get(&node).into_iter().flatten() {
            if nodes.node_type(*child) != Some(TEXT_NODE) {
                continue;
            }
            if let Some(text) = own_text(*child)? {
                parts.push(text);
            }
        }
        if let Some(text) = own_text(node)? {
            parts.push(text);
        }
        // formatting whitespace between children is not text
        parts.retain(|text| !text.trim().is_empty());
        let text_content = if parts.is_empty() { None } else { Some(parts.join(" ")) };

        let element = nodes
            .node_name
            .get(node)
            .map(|id| strings.resolve(*id))
            .transpose()?
            .flatten()
            .map(str::to_uppercase);

        let entry = ExtraProperties {
            visibility,
            bbox: bboxes.get(&(node as i64)).copied().flatten(),
            clickable: clickable.contains(&(node as i64)),
            set_of_marks,
            element,
            alt,
            text_content,
        };

        if properties.insert(bid.to_string(), entry).is_some() {
            log::warn!("Duplicate {}={:?} attribute detected", BID_ATTRIBUTE, bid);
        }
    }

    Ok(())
}

/// Absolute bbox per laid-out node; `None` for nodes with an empty client rect
fn absolute_bboxes(document: &DocumentSnapshot, abs: (f64, f64)) -> HashMap<i64, Option<BoundingBox>> {
    let layout = &document.layout;
    let has_client_rects = !layout.client_rects.is_empty();

    layout
        .node_index
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let rendered = !has_client_rects || layout.client_rects.get(i).is_some_and(|rect| !rect.is_empty());
            let bbox = if rendered {
                layout
                    .bounds
                    .get(i)
                    .and_then(|rect| BoundingBox::from_rect(rect))
                    .map(|bbox| bbox.translate(abs.0, abs.1))
            } else {
                None
            };
            (*node, bbox)
        })
        .collect()
}
