//! DOM snapshot capture and per-element property derivation

pub mod properties;
pub mod snapshot;

pub use properties::{BoundingBox, ExtraProperties, ExtraPropertiesMap, derive_extra_properties};
pub use snapshot::{DocumentSnapshot, DomSnapshot, StringTable};

use crate::codec::TransientCodec;
use crate::error::Result;
use crate::page::{PageDriver, SnapshotParams};

/// Capture one snapshot of the page and all its frames.
///
/// With a codec, the transient data is decoded out of the snapshot's
/// `aria-roledescription` values before returning.
pub fn capture_dom_snapshot<P>(
    page: &P,
    params: &SnapshotParams,
    cleanup: Option<&dyn TransientCodec>,
) -> Result<DomSnapshot>
where
    P: PageDriver + ?Sized,
{
    let mut snapshot = page.capture_snapshot(params)?;
    log::debug!(
        "Captured DOM snapshot: {} documents, {} strings",
        snapshot.documents.len(),
        snapshot.strings.len()
    );

    if let Some(codec) = cleanup {
        let removed = snapshot.strip_transient_data(codec);
        log::debug!("Removed {} emptied aria-roledescription attributes", removed);
    }
    Ok(snapshot)
}
