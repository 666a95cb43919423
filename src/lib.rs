//! # browser-observe
//!
//! Agent-consumable observations of live web pages over the Chrome DevTools
//! Protocol (CDP).
//!
//! One extraction cycle:
//!
//! - **marks** every element of the page and of its nested frames with a
//!   stable `bid` attribute, namespaced by the owning frame's bid
//! - captures one **DOM snapshot** and one **accessibility tree per frame**
//! - **merges** the per-frame accessibility trees into a single tree
//! - derives per-element **extra properties** (bounding box in page
//!   coordinates, visibility, clickability, text)
//! - **cleans up** the transient attributes, even when the cycle fails
//!
//! The cycle retries when frames detach or navigate underneath it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use browser_observe::{BrowserSession, ExtractionOptions, LaunchOptions};
//!
//! # fn main() -> browser_observe::Result<()> {
//! let session = BrowserSession::launch(LaunchOptions::default())?;
//! session.navigate("https://example.com")?;
//! session.wait_for_navigation()?;
//!
//! let observation = session.observe(&ExtractionOptions::default())?;
//! for (bid, props) in &observation.extra_properties {
//!     if props.clickable {
//!         println!("{} {:?} {:?}", bid, props.element, props.text_content);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Anything implementing [`PageDriver`] can be observed; [`CdpPage`] is the
//! implementation over a `headless_chrome` tab.
//!
//! ## Module Overview
//!
//! - [`browser`]: session management, configuration, and the CDP driver
//! - [`marking`]: bid injection, cleanup, and focused-element lookup
//! - [`dom`]: DOM snapshot types and extra-property derivation
//! - [`axtree`]: accessibility tree types and cross-frame merging
//! - [`codec`]: transient data carried through `aria-roledescription`
//! - [`extraction`]: the retrying extraction cycle
//! - [`error`]: error types and result aliases

pub mod axtree;
pub mod browser;
pub mod codec;
pub mod dom;
pub mod error;
pub mod extraction;
pub mod marking;
pub mod page;
pub mod screenshot;

pub use axtree::{AxNode, MergedAxTree};
pub use browser::{BrowserSession, CdpPage, ConnectionOptions, ExtractionOptions, LaunchOptions, TagsToMark};
pub use codec::{TransientCodec, TransientLayout, UnderscoreCodec};
pub use dom::{BoundingBox, DomSnapshot, ExtraProperties, ExtraPropertiesMap};
pub use error::{BrowserError, Result};
pub use extraction::{ExtractionPhase, Extractor, PageObservation, extract_observation};
pub use marking::MarkingReport;
pub use page::{FrameOwner, FrameTree, PageDriver, SnapshotParams};
