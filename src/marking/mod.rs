//! Identifier injection and cleanup
//!
//! Every element of every reachable frame gets a `bid` attribute. Child frames
//! are marked with their owner element's bid as a namespace prefix, so bids
//! stay unique across the whole page. The injected script also smuggles
//! transient data through `aria-roledescription`; [`unmark_frames`] restores it.

use crate::browser::config::TagsToMark;
use crate::codec::TransientLayout;
use crate::error::{BrowserError, Result};
use crate::page::{FrameOwner, FrameTree, PageDriver};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute holding an element's bid
pub const BID_ATTRIBUTE: &str = "bid";

/// Attribute holding the visibility ratio measured at marking time
pub const VISIBILITY_ATTRIBUTE: &str = "browsergym_visibility_ratio";

/// Attribute holding the set-of-marks flag (`"1"` or `"0"`)
pub const SET_OF_MARKS_ATTRIBUTE: &str = "browsergym_set_of_marks";

/// Attribute borrowed to carry transient data into the accessibility tree
pub const TRANSIENT_ATTRIBUTE: &str = "aria-roledescription";

/// Elements that can host a child frame; they get frame bids instead of decimal ones
pub const FRAME_OWNER_TAGS: &[&str] = &["iframe", "frame", "object", "embed"];

/// `async function (parentBid, options)` resolving to a [`MarkScriptResult`]
pub const MARK_ELEMENTS_JS: &str = include_str!("mark_elements.js");

/// `function (options)` returning the number of restored attributes
pub const UNMARK_ELEMENTS_JS: &str = include_str!("unmark_elements.js");

/// `function (bidAttribute, frameOwnerTags)` returning `{bid, frameOwner}` or `null`
pub const FOCUSED_ELEMENT_JS: &str = include_str!("focused_element.js");

/// Options passed to the injected scripts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOptions {
    pub bid_attribute: String,
    pub visibility_attribute: String,
    pub set_of_marks_attribute: String,
    pub transient_attribute: String,
    pub tags_to_mark: TagsToMark,
    pub transient_layout: TransientLayout,
    /// Delimited fields ahead of the original `aria-roledescription` text
    pub field_count: usize,
    pub visibility_timeout_ms: u64,
    /// Lowercase tag names of [`FRAME_OWNER_TAGS`]
    pub frame_owner_tags: Vec<String>,
}

impl ScriptOptions {
    pub fn new(tags_to_mark: TagsToMark, transient_layout: TransientLayout, visibility_timeout_ms: u64) -> Self {
        Self {
            bid_attribute: BID_ATTRIBUTE.to_string(),
            visibility_attribute: VISIBILITY_ATTRIBUTE.to_string(),
            set_of_marks_attribute: SET_OF_MARKS_ATTRIBUTE.to_string(),
            transient_attribute: TRANSIENT_ATTRIBUTE.to_string(),
            tags_to_mark,
            transient_layout,
            field_count: transient_layout.field_count(),
            visibility_timeout_ms,
            frame_owner_tags: FRAME_OWNER_TAGS.iter().map(|tag| tag.to_string()).collect(),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// What the marking script reports for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkScriptResult {
    pub marked: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The frame went away before it could be marked
    Detached,
    /// The owner element hosts a different frame (e.g. a PDF viewer in `<embed>`)
    MismatchedOwner,
    /// Sandboxed without `allow-scripts`
    ScriptsBlocked,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFrame {
    pub frame_id: String,
    pub reason: SkipReason,
}

/// Outcome of one marking pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkingReport {
    /// `(frame id, bid prefix)` of each marked frame, in marking order
    pub marked: Vec<(String, String)>,
    pub skipped: Vec<SkippedFrame>,
    pub elements: usize,
}

impl MarkingReport {
    pub fn is_marked(&self, frame_id: &str) -> bool {
        self.marked.iter().any(|(id, _)| id == frame_id)
    }

    fn skip(&mut self, frame_id: &str, reason: SkipReason) {
        self.skipped.push(SkippedFrame { frame_id: frame_id.to_string(), reason });
    }
}

fn is_frame_bid(bid: &str) -> bool {
    !bid.is_empty() && bid.chars().all(|c| c.is_ascii_lowercase())
}

/// Why a child frame cannot be reached through its owner, if it cannot
fn check_owner<P>(page: &P, frame: &FrameTree) -> Result<std::result::Result<FrameOwner, SkipReason>>
where
    P: PageDriver + ?Sized,
{
    let owner = match page.frame_owner(frame.id()) {
        Ok(owner) => owner,
        Err(e) if e.is_frame_lifecycle() => {
            log::debug!("Frame '{}' detached: {}", frame.label(), e);
            return Ok(Err(SkipReason::Detached));
        }
        Err(e) if e.is_timeout() => {
            log::warn!("Frame '{}' owner lookup timed out: {}", frame.label(), e);
            return Ok(Err(SkipReason::TimedOut));
        }
        Err(e) => return Err(e),
    };

    if !owner.hosts(frame.id()) {
        log::warn!("Skipping frame '{}', its owner element hosts another frame", frame.label());
        return Ok(Err(SkipReason::MismatchedOwner));
    }
    if owner.blocks_scripts() {
        log::debug!("Skipping sandboxed frame '{}'", frame.label());
        return Ok(Err(SkipReason::ScriptsBlocked));
    }
    Ok(Ok(owner))
}

/// Mark every element of the page and of every reachable child frame.
///
/// Frames are walked depth-first with an explicit worklist: a frame is marked
/// before its children, whose prefixes are read back from the bids just
/// assigned to their owner elements. Detached, mismatched, and script-blocked
/// frames are skipped, as are child frames whose calls time out. A child frame
/// whose owner carries no usable bid fails with
/// [`BrowserError::MissingFrameBid`].
pub fn mark_frames<P>(page: &P, options: &ScriptOptions) -> Result<MarkingReport>
where
    P: PageDriver + ?Sized,
{
    let root = page.frame_tree()?;
    let main_frame_id = root.id().to_string();
    let script_options = options.to_value()?;
    let mut report = MarkingReport::default();
    let mut worklist: Vec<(FrameTree, String)> = vec![(root, String::new())];

    while let Some((frame, prefix)) = worklist.pop() {
        let is_main = frame.id() == main_frame_id;
        let result = page.call_function(
            frame.id(),
            MARK_ELEMENTS_JS,
            &[Value::String(prefix.clone()), script_options.clone()],
        );
        let result = match result {
            Ok(value) => value,
            Err(e) if !is_main && e.is_timeout() => {
                log::warn!("Marking frame '{}' timed out: {}", frame.label(), e);
                report.skip(frame.id(), SkipReason::TimedOut);
                continue;
            }
            Err(e) => return Err(e),
        };

        let result: MarkScriptResult = serde_json::from_value(result)
            .map_err(|e| BrowserError::Protocol(format!("marking script result: {}", e)))?;
        for warning in &result.warnings {
            log::warn!("Frame '{}': {}", frame.label(), warning);
        }
        log::debug!("Marked {} elements in frame '{}' with prefix {:?}", result.marked, frame.label(), prefix);
        report.elements += result.marked;
        report.marked.push((frame.id().to_string(), prefix));

        for child in frame.child_frames.into_iter().rev() {
            let owner = match check_owner(page, &child)? {
                Ok(owner) => owner,
                Err(reason) => {
                    report.skip(child.id(), reason);
                    continue;
                }
            };
            match owner.attribute(BID_ATTRIBUTE) {
                Some(bid) if is_frame_bid(bid) => {
                    let bid = bid.to_string();
                    worklist.push((child, bid));
                }
                _ => return Err(BrowserError::MissingFrameBid { frame_id: child.id().to_string() }),
            }
        }
    }

    Ok(report)
}

/// Remove the transient data from every frame.
///
/// Frames that vanished are skipped. Other failures do not stop the pass; the
/// first one is returned once every frame has been visited. Bids stay in place.
pub fn unmark_frames<P>(page: &P, transient_layout: TransientLayout) -> Result<()>
where
    P: PageDriver + ?Sized,
{
    let root = page.frame_tree()?;
    let script_options = ScriptOptions::new(TagsToMark::All, transient_layout, 0).to_value()?;
    let mut first_error = None;
    let mut worklist = vec![&root];

    while let Some(frame) = worklist.pop() {
        worklist.extend(frame.child_frames.iter().rev());

        if frame.id() != root.id() {
            match check_owner(page, frame) {
                Ok(Ok(_)) => {}
                Ok(Err(_)) => continue,
                Err(e) => {
                    first_error.get_or_insert(e);
                    continue;
                }
            }
        }

        match page.call_function(frame.id(), UNMARK_ELEMENTS_JS, std::slice::from_ref(&script_options)) {
            Ok(restored) => log::debug!("Restored {} attributes in frame '{}'", restored, frame.label()),
            Err(e) if e.is_frame_lifecycle() => log::debug!("Frame '{}' gone before cleanup: {}", frame.label(), e),
            Err(e) => {
                log::warn!("Cleanup of frame '{}' failed: {}", frame.label(), e);
                first_error.get_or_insert(e);
            }
        }
    }

    first_error.map_or(Ok(()), Err)
}

/// Keeps the page marked until released; cleans up on drop otherwise
pub struct TransientMarks<'p, P: PageDriver + ?Sized> {
    page: &'p P,
    layout: TransientLayout,
    released: bool,
}

impl<'p, P: PageDriver + ?Sized> TransientMarks<'p, P> {
    pub fn new(page: &'p P, layout: TransientLayout) -> Self {
        Self { page, layout, released: false }
    }

    /// Run the cleanup pass now and report its outcome
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        unmark_frames(self.page, self.layout)
    }
}

impl<P: PageDriver + ?Sized> Drop for TransientMarks<'_, P> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = unmark_frames(self.page, self.layout) {
            log::warn!("Cleanup after aborted extraction failed: {}", e);
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FocusedElement {
    #[serde(default)]
    bid: String,
    #[serde(default)]
    frame_owner: bool,
}

/// Bid of the element that has focus, descending through shadow roots and
/// focused frames. Empty when nothing carrying a bid is focused.
pub fn focused_element_bid<P>(page: &P) -> Result<String>
where
    P: PageDriver + ?Sized,
{
    let root = page.frame_tree()?;
    let args = [Value::String(BID_ATTRIBUTE.to_string()), serde_json::json!(FRAME_OWNER_TAGS)];
    let mut frame = &root;
    let mut focused = String::new();

    loop {
        let value = page.call_function(frame.id(), FOCUSED_ELEMENT_JS, &args)?;
        if value.is_null() {
            break;
        }
        let element: FocusedElement = serde_json::from_value(value)
            .map_err(|e| BrowserError::Protocol(format!("focused element result: {}", e)))?;
        focused = element.bid;
        if !element.frame_owner || focused.is_empty() {
            break;
        }

        let next = frame.child_frames.iter().find(|child| match page.frame_owner(child.id()) {
            Ok(owner) => owner.hosts(child.id()) && owner.attribute(BID_ATTRIBUTE) == Some(focused.as_str()),
            Err(e) => {
                log::debug!("Ignoring frame '{}' while locating focus: {}", child.label(), e);
                false
            }
        });
        match next {
            Some(child) => frame = child,
            None => break,
        }
    }

    Ok(focused)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bid_validation() {
        assert!(is_frame_bid("a"));
        assert!(is_frame_bid("zab"));
        assert!(!is_frame_bid(""));
        assert!(!is_frame_bid("a1"));
        assert!(!is_frame_bid("A"));
    }

    #[test]
    fn test_script_options_wire_shape() {
        let value = ScriptOptions::new(TagsToMark::StandardHtml, TransientLayout::Geometry, 750).to_value().unwrap();

        assert_eq!(value["bidAttribute"], "bid");
        assert_eq!(value["transientAttribute"], "aria-roledescription");
        assert_eq!(value["tagsToMark"], "standard_html");
        assert_eq!(value["transientLayout"], "geometry");
        assert_eq!(value["fieldCount"], 8);
        assert_eq!(value["visibilityTimeoutMs"], 750);
        assert_eq!(value["frameOwnerTags"], serde_json::json!(["iframe", "frame", "object", "embed"]));
    }

    #[test]
    fn test_scripts_are_function_expressions() {
        assert!(MARK_ELEMENTS_JS.trim_start().starts_with("async function (parentBid, options)"));
        assert!(UNMARK_ELEMENTS_JS.trim_start().starts_with("function (options)"));
        assert!(FOCUSED_ELEMENT_JS.trim_start().starts_with("function (bidAttribute, frameOwnerTags)"));
        assert!(MARK_ELEMENTS_JS.contains("new Set(options.frameOwnerTags)"));
    }

    #[test]
    fn test_mark_script_result_defaults() {
        let result: MarkScriptResult = serde_json::from_value(serde_json::json!({"marked": 3})).unwrap();
        assert_eq!(result.marked, 3);
        assert!(result.warnings.is_empty());
    }
}
