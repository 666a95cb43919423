//! One observation cycle: mark, capture, merge, derive, clean up.
//!
//! The cycle is retried from scratch when the page changes underneath it (a
//! frame detaches, an execution context is destroyed, a child frame turns up
//! without a bid). Cleanup runs after every attempt, failed or not.

use crate::axtree::{MergedAxTree, capture_frame_axtrees, merge_frame_axtrees};
use crate::browser::config::ExtractionOptions;
use crate::codec::{TransientCodec, UnderscoreCodec};
use crate::dom::{DomSnapshot, ExtraPropertiesMap, capture_dom_snapshot, derive_extra_properties};
use crate::error::{BrowserError, Result};
use crate::marking::{MarkingReport, ScriptOptions, TransientMarks, focused_element_bid, mark_frames};
use crate::page::{PageDriver, SnapshotParams};
use crate::screenshot::capture_screenshot;
use image::RgbImage;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPhase {
    Idle,
    Marking,
    Capturing,
    Merging,
    Cleanup,
    Done,
}

/// Everything one extraction cycle produces
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageObservation {
    pub dom_snapshot: DomSnapshot,
    pub merged_axtree: MergedAxTree,
    pub extra_properties: ExtraPropertiesMap,
    /// Empty when nothing carrying a bid has focus
    #[serde(rename = "focusedElementId")]
    pub focused_element_bid: String,
    pub marking: MarkingReport,
    #[serde(skip)]
    pub screenshot: Option<RgbImage>,
}

/// Runs extraction cycles against one page
pub struct Extractor<'p, P: PageDriver + ?Sized> {
    page: &'p P,
    options: ExtractionOptions,
    codec: UnderscoreCodec,
    phase: ExtractionPhase,
}

impl<'p, P: PageDriver + ?Sized> Extractor<'p, P> {
    pub fn new(page: &'p P, options: ExtractionOptions) -> Result<Self> {
        options.validate()?;
        let codec = UnderscoreCodec::new(options.transient_layout);
        Ok(Self { page, options, codec, phase: ExtractionPhase::Idle })
    }

    pub fn phase(&self) -> ExtractionPhase {
        self.phase
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    fn enter(&mut self, phase: ExtractionPhase) {
        log::debug!("Extraction phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Extract one observation, retrying on recoverable failures.
    ///
    /// Makes at most `max_retries + 1` attempts. Once the budget is spent the
    /// last failure is returned wrapped in [`BrowserError::RetriesExhausted`].
    pub fn extract(&mut self) -> Result<PageObservation> {
        let attempts = self.options.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let error = match self.attempt() {
                Ok(observation) => {
                    self.enter(ExtractionPhase::Done);
                    log::info!(
                        "Extracted observation: {} marked elements, {} AX nodes, {} frames",
                        observation.extra_properties.len(),
                        observation.merged_axtree.len(),
                        observation.marking.marked.len()
                    );
                    return Ok(observation);
                }
                Err(e) => e,
            };

            self.enter(ExtractionPhase::Idle);
            if !error.is_recoverable() {
                return Err(error);
            }
            if attempt == attempts {
                return Err(BrowserError::RetriesExhausted { attempts, source: Box::new(error) });
            }

            log::warn!("Extraction attempt {}/{} failed, retrying: {}", attempt, attempts, error);
            std::thread::sleep(self.options.retry_delay());
        }

        // attempts is never zero
        Err(BrowserError::InvalidConfig("no extraction attempt was made".to_string()))
    }

    fn attempt(&mut self) -> Result<PageObservation> {
        let page = self.page;
        let options = &self.options;
        let script_options =
            ScriptOptions::new(options.tags_to_mark, options.transient_layout, options.visibility_timeout_ms);
        let params = SnapshotParams {
            computed_styles: options.computed_styles.clone(),
            include_dom_rects: options.include_dom_rects,
            include_paint_order: options.include_paint_order,
        };
        let include_screenshot = options.include_screenshot;
        let cleanup = options.cleanup_temporary_data;

        self.enter(ExtractionPhase::Marking);
        let marks = TransientMarks::new(page, self.codec.layout());
        let marking = mark_frames(page, &script_options)?;

        self.enter(ExtractionPhase::Capturing);
        let snapshot_codec: Option<&dyn TransientCodec> = if cleanup { Some(&self.codec) } else { None };
        let dom_snapshot = capture_dom_snapshot(page, &params, snapshot_codec)?;
        let frame_axtrees = capture_frame_axtrees(page)?;
        let focused_element_bid = focused_element_bid(page)?;

        self.enter(ExtractionPhase::Merging);
        let merged_axtree =
            merge_frame_axtrees(frame_axtrees, &self.codec, |backend_node_id| page.describe_node_frame(backend_node_id))?;
        let extra_properties = derive_extra_properties(&dom_snapshot)?;

        self.enter(ExtractionPhase::Cleanup);
        marks.release()?;

        let screenshot = if include_screenshot { Some(capture_screenshot(page)?) } else { None };

        Ok(PageObservation {
            dom_snapshot,
            merged_axtree,
            extra_properties,
            focused_element_bid,
            marking,
            screenshot,
        })
    }
}

/// Extract one observation from `page` with the given options
pub fn extract_observation<P>(page: &P, options: &ExtractionOptions) -> Result<PageObservation>
where
    P: PageDriver + ?Sized,
{
    Extractor::new(page, options.clone())?.extract()
}
