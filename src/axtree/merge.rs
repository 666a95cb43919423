use crate::axtree::node::{AxNode, AxProperty, AxValue};
use crate::codec::{TransientCodec, TransientData, TransientGeometry};
use crate::error::Result;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// AX property carrying the `aria-roledescription` attribute
pub const ROLEDESCRIPTION_PROPERTY: &str = "roledescription";

/// AX property the recovered bid is promoted to
pub const BID_PROPERTY: &str = "browsergym_id";

const IFRAME_ROLE: &str = "Iframe";

/// Decode the transient data out of a node's `roledescription` property.
///
/// The property is restored to its original text, or removed when that text
/// is empty, and the recovered bid is appended as a `browsergym_id` property.
pub fn promote_transient_data<C>(node: &mut AxNode, codec: &C) -> Option<TransientData>
where
    C: TransientCodec + ?Sized,
{
    let position = node.properties.iter().position(|p| p.name == ROLEDESCRIPTION_PROPERTY)?;
    let decoded = codec.decode(node.properties[position].value.as_str()?);

    if decoded.original.is_empty() {
        node.properties.remove(position);
    } else {
        node.properties[position].value.value = Some(decoded.original.into());
    }

    let data = decoded.data?;
    node.properties.push(AxProperty::new(BID_PROPERTY, AxValue::string(data.bid.clone())));
    Some(data)
}

/// Accessibility trees of all frames joined into one
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergedAxTree {
    /// Frame node lists concatenated in capture order, main frame first
    pub nodes: Vec<AxNode>,

    /// Geometry recovered by the codec, keyed by bid
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub geometry: IndexMap<String, TransientGeometry>,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl MergedAxTree {
    pub fn new(nodes: Vec<AxNode>) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.node_id.clone(), i).is_some() {
                log::warn!("AX node id '{}' appears in more than one frame", node.node_id);
            }
        }
        Self { nodes, geometry: IndexMap::new(), index }
    }

    /// The main frame's root node
    pub fn root(&self) -> Option<&AxNode> {
        self.nodes.first()
    }

    pub fn get(&self, node_id: &str) -> Option<&AxNode> {
        self.index.get(node_id).map(|i| &self.nodes[*i])
    }

    pub fn children<'a>(&'a self, node: &'a AxNode) -> impl Iterator<Item = &'a AxNode> + 'a {
        node.child_ids.iter().filter_map(move |id| self.get(id))
    }

    /// Ids of every node reachable from the root, depth-first
    pub fn reachable_from_root(&self) -> Vec<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<&AxNode> = self.root().into_iter().collect();

        while let Some(node) = stack.pop() {
            if !seen.insert(node.node_id.as_str()) {
                continue;
            }
            order.push(node.node_id.as_str());
            stack.extend(self.children(node).collect::<Vec<_>>().into_iter().rev());
        }
        order
    }

    /// Node whose promoted `browsergym_id` equals `bid`
    pub fn find_by_bid(&self, bid: &str) -> Option<&AxNode> {
        self.nodes
            .iter()
            .find(|node| node.property(BID_PROPERTY).and_then(AxValue::as_str) == Some(bid))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Merge per-frame accessibility trees into one tree.
///
/// `frame_axtrees` must list the main frame first. `resolve_frame` maps the
/// backend DOM node of an `Iframe` node to the frame it hosts. A timeout while
/// resolving leaves that Iframe node childless; other errors propagate.
pub fn merge_frame_axtrees<C, F>(
    frame_axtrees: IndexMap<String, Vec<AxNode>>,
    codec: &C,
    mut resolve_frame: F,
) -> Result<MergedAxTree>
where
    C: TransientCodec + ?Sized,
    F: FnMut(i64) -> Result<Option<String>>,
{
    let mut geometry = IndexMap::new();
    let mut roots: HashMap<String, String> = HashMap::new();
    let mut nodes = Vec::new();

    for (frame_id, mut frame_nodes) in frame_axtrees {
        for node in &mut frame_nodes {
            if let Some(TransientData { bid, geometry: Some(geo) }) = promote_transient_data(node, codec) {
                geometry.insert(bid, geo);
            }
        }

        match frame_nodes.first() {
            Some(root) => {
                if root.frame_id.as_deref().is_some_and(|id| id != frame_id) {
                    log::warn!(
                        "Root AX node of frame '{}' reports frame '{}'",
                        frame_id,
                        root.frame_id.as_deref().unwrap_or_default()
                    );
                }
                roots.insert(frame_id, root.node_id.clone());
            }
            None => log::debug!("Frame '{}' has an empty AXTree", frame_id),
        }
        nodes.extend(frame_nodes);
    }

    for node in &mut nodes {
        if node.role_name() != Some(IFRAME_ROLE) {
            continue;
        }
        let Some(backend_node_id) = node.backend_dom_node_id else {
            log::warn!("Iframe AX node '{}' has no backend DOM node", node.node_id);
            continue;
        };

        let frame_id = match resolve_frame(backend_node_id) {
            Ok(Some(frame_id)) => frame_id,
            Ok(None) => {
                log::warn!("Iframe AX node '{}' does not host a frame", node.node_id);
                continue;
            }
            Err(e) if e.is_timeout() => {
                log::warn!("Could not resolve frame of Iframe AX node '{}': {}", node.node_id, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        match roots.get(&frame_id) {
            Some(root_id) => node.child_ids.push(root_id.clone()),
            None => log::warn!("Extracted AXTree does not contain frameId '{}'", frame_id),
        }
    }

    let mut merged = MergedAxTree::new(nodes);
    merged.geometry = geometry;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{TransientLayout, UnderscoreCodec};
    use crate::error::BrowserError;

    fn roledescription(value: &str) -> AxValue {
        AxValue::string(value)
    }

    fn main_frame() -> Vec<AxNode> {
        vec![
            AxNode::new("1").with_role("RootWebArea").with_children(["2", "3"]).with_frame("MAIN"),
            AxNode::new("2")
                .with_role("button")
                .with_name("Go")
                .with_property(ROLEDESCRIPTION_PROPERTY, roledescription("5_"))
                .with_frame("MAIN"),
            AxNode::new("3")
                .with_role(IFRAME_ROLE)
                .with_backend_node(40)
                .with_property(ROLEDESCRIPTION_PROPERTY, roledescription("a_"))
                .with_frame("MAIN"),
        ]
    }

    fn child_frame() -> Vec<AxNode> {
        vec![
            AxNode::new("100").with_role("RootWebArea").with_children(["101"]).with_frame("CHILD"),
            AxNode::new("101")
                .with_role("link")
                .with_property(ROLEDESCRIPTION_PROPERTY, roledescription("a0_slide"))
                .with_frame("CHILD"),
        ]
    }

    fn frames() -> IndexMap<String, Vec<AxNode>> {
        IndexMap::from([("MAIN".to_string(), main_frame()), ("CHILD".to_string(), child_frame())])
    }

    #[test]
    fn test_promote_removes_empty_roledescription() {
        let mut node = AxNode::new("2").with_property(ROLEDESCRIPTION_PROPERTY, roledescription("12_"));
        let data = promote_transient_data(&mut node, &UnderscoreCodec::default());

        assert_eq!(data, Some(TransientData::bid("12")));
        assert!(node.property(ROLEDESCRIPTION_PROPERTY).is_none());
        assert_eq!(node.property(BID_PROPERTY).and_then(AxValue::as_str), Some("12"));
    }

    #[test]
    fn test_promote_restores_original_text() {
        let mut node = AxNode::new("2").with_property(ROLEDESCRIPTION_PROPERTY, roledescription("7_carousel"));
        promote_transient_data(&mut node, &UnderscoreCodec::default());

        assert_eq!(node.property(ROLEDESCRIPTION_PROPERTY).and_then(AxValue::as_str), Some("carousel"));
        assert_eq!(node.properties.last().map(|p| p.name.as_str()), Some(BID_PROPERTY));
    }

    #[test]
    fn test_promote_leaves_unmarked_node() {
        let mut node = AxNode::new("2").with_property(ROLEDESCRIPTION_PROPERTY, roledescription("Slide"));
        assert!(promote_transient_data(&mut node, &UnderscoreCodec::default()).is_none());
        assert_eq!(node.property(ROLEDESCRIPTION_PROPERTY).and_then(AxValue::as_str), Some("Slide"));
        assert!(node.property(BID_PROPERTY).is_none());

        let mut bare = AxNode::new("3");
        assert!(promote_transient_data(&mut bare, &UnderscoreCodec::default()).is_none());
    }

    #[test]
    fn test_merge_connects_iframe_to_child_root() {
        let merged = merge_frame_axtrees(frames(), &UnderscoreCodec::default(), |backend| {
            assert_eq!(backend, 40);
            Ok(Some("CHILD".to_string()))
        })
        .unwrap();

        assert_eq!(merged.len(), 5);
        assert_eq!(merged.root().map(|n| n.node_id.as_str()), Some("1"));
        assert_eq!(merged.get("3").unwrap().child_ids, vec!["100"]);

        let mut reachable = merged.reachable_from_root();
        reachable.sort();
        assert_eq!(reachable, vec!["1", "100", "101", "2", "3"]);

        assert_eq!(merged.find_by_bid("a0").map(|n| n.node_id.as_str()), Some("101"));
        assert_eq!(merged.find_by_bid("5").and_then(AxNode::name_text), Some("Go"));
    }

    #[test]
    fn test_missing_child_tree_leaves_iframe_childless() {
        let only_main = IndexMap::from([("MAIN".to_string(), main_frame())]);
        let merged =
            merge_frame_axtrees(only_main, &UnderscoreCodec::default(), |_| Ok(Some("GONE".to_string()))).unwrap();

        assert!(merged.get("3").unwrap().child_ids.is_empty());
        assert_eq!(merged.reachable_from_root().len(), 3);
    }

    #[test]
    fn test_resolve_timeout_is_tolerated() {
        let merged = merge_frame_axtrees(frames(), &UnderscoreCodec::default(), |_| {
            Err(BrowserError::Timeout { method: "DOM.describeNode".to_string(), reason: "timed out".to_string() })
        })
        .unwrap();

        assert!(merged.get("3").unwrap().child_ids.is_empty());
    }

    #[test]
    fn test_resolve_lifecycle_error_propagates() {
        let result = merge_frame_axtrees(frames(), &UnderscoreCodec::default(), |_| {
            Err(BrowserError::FrameLifecycle("No node with given id found".to_string()))
        });

        assert!(matches!(result, Err(BrowserError::FrameLifecycle(_))));
    }

    #[test]
    fn test_geometry_layout_is_collected() {
        let codec = UnderscoreCodec::new(TransientLayout::Geometry);
        let main = vec![
            AxNode::new("1")
                .with_role("button")
                .with_property(ROLEDESCRIPTION_PROPERTY, roledescription("4_10_20_15_25_20_30_1_")),
        ];
        let merged = merge_frame_axtrees(IndexMap::from([("MAIN".to_string(), main)]), &codec, |_| Ok(None)).unwrap();

        let geometry = merged.geometry["4"];
        assert_eq!((geometry.left, geometry.bottom), (10.0, 30.0));
        assert!(geometry.in_viewport);
        assert_eq!(merged.find_by_bid("4").map(|n| n.node_id.as_str()), Some("1"));
    }

    #[test]
    fn test_serialized_tree_uses_wire_shape() {
        let merged = merge_frame_axtrees(frames(), &UnderscoreCodec::default(), |_| Ok(Some("CHILD".to_string()))).unwrap();
        let value = serde_json::to_value(&merged).unwrap();

        assert_eq!(value["nodes"].as_array().map(Vec::len), Some(5));
        assert!(value.get("geometry").is_none());
        assert!(value.get("index").is_none());
    }
}
