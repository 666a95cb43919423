//! The narrow browser surface the extraction pipeline needs.
//!
//! [`crate::browser::CdpPage`] implements it over a live Chrome tab; tests
//! implement it over an in-memory page.

use crate::axtree::AxNode;
use crate::dom::DomSnapshot;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters of a `DOMSnapshot.captureSnapshot` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotParams {
    pub computed_styles: Vec<String>,
    #[serde(rename = "includeDOMRects")]
    pub include_dom_rects: bool,
    pub include_paint_order: bool,
}

/// Identity of one browsing context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub url: String,
}

/// Frame hierarchy as reported by `Page.getFrameTree`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTree {
    pub frame: FrameInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_frames: Vec<FrameTree>,
}

impl FrameTree {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            frame: FrameInfo { id: id.into(), parent_id: None, name: None, url: String::new() },
            child_frames: Vec::new(),
        }
    }

    pub fn with_child(mut self, mut child: FrameTree) -> Self {
        child.frame.parent_id = Some(self.frame.id.clone());
        self.child_frames.push(child);
        self
    }

    pub fn id(&self) -> &str {
        &self.frame.id
    }

    /// Display name used in log messages
    pub fn label(&self) -> &str {
        match self.frame.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.frame.id,
        }
    }

    /// Frame ids in pre-order, main frame first
    pub fn frame_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            ids.push(tree.frame.id.clone());
            stack.extend(tree.child_frames.iter().rev());
        }
        ids
    }

    pub fn find(&self, frame_id: &str) -> Option<&FrameTree> {
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            if tree.frame.id == frame_id {
                return Some(tree);
            }
            stack.extend(tree.child_frames.iter());
        }
        None
    }

    pub fn contains(&self, frame_id: &str) -> bool {
        self.find(frame_id).is_some()
    }
}

/// The `<iframe>`/`<frame>`/`<embed>` element that owns a child frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOwner {
    pub backend_node_id: i64,
    pub node_name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Frame actually hosted by the element (`contentFrame`)
    pub content_frame_id: Option<String>,
}

impl FrameOwner {
    /// Build from the flat `[name, value, name, value, ...]` list CDP returns
    pub fn from_flat_attributes(
        backend_node_id: i64,
        node_name: impl Into<String>,
        flat: &[String],
        content_frame_id: Option<String>,
    ) -> Self {
        let attributes = flat.chunks_exact(2).map(|pair| (pair[0].clone(), pair[1].clone())).collect();
        Self { backend_node_id, node_name: node_name.into(), attributes, content_frame_id }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Whether the owner hosts exactly the given frame
    pub fn hosts(&self, frame_id: &str) -> bool {
        self.content_frame_id.as_deref() == Some(frame_id)
    }

    /// A `sandbox` attribute without `allow-scripts` blocks script execution
    pub fn blocks_scripts(&self) -> bool {
        match self.attribute("sandbox") {
            Some(tokens) => !tokens.split_whitespace().any(|t| t == "allow-scripts"),
            None => false,
        }
    }
}

/// Browser operations used by the extraction pipeline.
///
/// Every call is a blocking round-trip and must be bounded by a timeout.
pub trait PageDriver {
    /// Current frame hierarchy, main frame at the root
    fn frame_tree(&self) -> Result<FrameTree>;

    /// Owner element of a child frame; fails with a frame lifecycle error if the frame is gone
    fn frame_owner(&self, frame_id: &str) -> Result<FrameOwner>;

    /// Call `function` (a JS function expression) in the frame's document and return its JSON result
    fn call_function(&self, frame_id: &str, function: &str, args: &[Value]) -> Result<Value>;

    /// One `DOMSnapshot.captureSnapshot` covering the page and all its frames
    fn capture_snapshot(&self, params: &SnapshotParams) -> Result<DomSnapshot>;

    /// Raw `Accessibility.getFullAXTree` node list of one frame
    fn full_ax_tree(&self, frame_id: &str) -> Result<Vec<AxNode>>;

    /// Frame hosted by the DOM node (for frame owner elements)
    fn describe_node_frame(&self, backend_node_id: i64) -> Result<Option<String>>;

    /// Viewport screenshot as PNG bytes
    fn capture_screenshot(&self) -> Result<Vec<u8>>;
}
