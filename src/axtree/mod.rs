//! Accessibility tree capture and cross-frame merging

pub mod merge;
pub mod node;

pub use merge::{BID_PROPERTY, MergedAxTree, ROLEDESCRIPTION_PROPERTY, merge_frame_axtrees, promote_transient_data};
pub use node::{AxNode, AxProperty, AxValue};

use crate::error::Result;
use crate::page::PageDriver;
use indexmap::IndexMap;

/// Raw AXTree of every frame currently in the page, main frame first.
///
/// A child frame whose capture times out is left out; any other failure,
/// frame lifecycle races included, propagates.
pub fn capture_frame_axtrees<P>(page: &P) -> Result<IndexMap<String, Vec<AxNode>>>
where
    P: PageDriver + ?Sized,
{
    let frame_tree = page.frame_tree()?;
    let mut frame_axtrees = IndexMap::new();

    for frame_id in frame_tree.frame_ids() {
        match page.full_ax_tree(&frame_id) {
            Ok(nodes) => {
                log::debug!("Captured {} AX nodes in frame '{}'", nodes.len(), frame_id);
                frame_axtrees.insert(frame_id, nodes);
            }
            Err(e) if e.is_timeout() && frame_id != frame_tree.id() => {
                log::warn!("Skipping AXTree of frame '{}': {}", frame_id, e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(frame_axtrees)
}
