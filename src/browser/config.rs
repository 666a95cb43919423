use crate::codec::TransientLayout;
use crate::error::{BrowserError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Options for launching a new browser instance
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run the browser without a visible window
    pub headless: bool,

    pub window_width: u32,
    pub window_height: u32,

    /// Custom Chrome/Chromium binary
    pub chrome_path: Option<PathBuf>,

    /// Profile directory to reuse between runs
    pub user_data_dir: Option<PathBuf>,

    /// Enable the Chrome sandbox
    pub sandbox: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 720,
            chrome_path: None,
            user_data_dir: None,
            sandbox: true,
        }
    }
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }
}

/// Options for connecting to an already running browser
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// DevTools WebSocket URL (e.g. `ws://localhost:9222/devtools/browser/...`)
    pub ws_url: String,

    /// Connection timeout in milliseconds
    pub timeout: u64,
}

impl ConnectionOptions {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self { ws_url: ws_url.into(), timeout: 30_000 }
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Which elements the identifier injector marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagsToMark {
    /// Every element, custom elements included
    All,
    /// Only elements whose tag is part of the HTML standard
    #[default]
    StandardHtml,
}

impl TagsToMark {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagsToMark::All => "all",
            TagsToMark::StandardHtml => "standard_html",
        }
    }
}

/// Upper bound on [`ExtractionOptions::max_retries`]
pub const MAX_RETRIES: usize = 100;

/// Configuration of one observation extraction cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionOptions {
    /// Whitelist of computed styles to include in the DOM snapshot
    pub computed_styles: Vec<String>,

    /// Include offset/client/scroll rects in the DOM snapshot
    pub include_dom_rects: bool,

    pub include_paint_order: bool,

    /// Decode the transient data out of the snapshot's `aria-roledescription` values
    pub cleanup_temporary_data: bool,

    /// Retries after the first attempt when a frame lifecycle race is detected,
    /// at most [`MAX_RETRIES`]
    pub max_retries: usize,

    pub retry_delay_ms: u64,

    /// Bound on every browser round-trip
    pub call_timeout_ms: u64,

    /// How long the in-page visibility observer may wait for all elements
    pub visibility_timeout_ms: u64,

    pub tags_to_mark: TagsToMark,

    pub transient_layout: TransientLayout,

    pub include_screenshot: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            computed_styles: Vec::new(),
            include_dom_rects: true,
            include_paint_order: true,
            cleanup_temporary_data: true,
            max_retries: 3,
            retry_delay_ms: 500,
            call_timeout_ms: 5_000,
            visibility_timeout_ms: 1_000,
            tags_to_mark: TagsToMark::default(),
            transient_layout: TransientLayout::default(),
            include_screenshot: false,
        }
    }
}

impl ExtractionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn computed_styles<I, S>(mut self, styles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.computed_styles = styles.into_iter().map(Into::into).collect();
        self
    }

    pub fn include_dom_rects(mut self, include: bool) -> Self {
        self.include_dom_rects = include;
        self
    }

    pub fn include_paint_order(mut self, include: bool) -> Self {
        self.include_paint_order = include;
        self
    }

    pub fn cleanup_temporary_data(mut self, cleanup: bool) -> Self {
        self.cleanup_temporary_data = cleanup;
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_delay_ms(mut self, delay: u64) -> Self {
        self.retry_delay_ms = delay;
        self
    }

    pub fn call_timeout_ms(mut self, timeout: u64) -> Self {
        self.call_timeout_ms = timeout;
        self
    }

    pub fn visibility_timeout_ms(mut self, timeout: u64) -> Self {
        self.visibility_timeout_ms = timeout;
        self
    }

    pub fn tags_to_mark(mut self, tags: TagsToMark) -> Self {
        self.tags_to_mark = tags;
        self
    }

    pub fn transient_layout(mut self, layout: TransientLayout) -> Self {
        self.transient_layout = layout;
        self
    }

    pub fn include_screenshot(mut self, include: bool) -> Self {
        self.include_screenshot = include;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.call_timeout_ms == 0 {
            return Err(BrowserError::InvalidConfig("callTimeoutMs must be greater than zero".to_string()));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(BrowserError::InvalidConfig(format!(
                "maxRetries must be at most {}, got {}",
                MAX_RETRIES, self.max_retries
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_defaults() {
        let opts = ExtractionOptions::default();

        assert!(opts.computed_styles.is_empty());
        assert!(opts.include_dom_rects);
        assert!(opts.include_paint_order);
        assert!(opts.cleanup_temporary_data);
        assert_eq!(opts.max_retries, 3);
        assert_eq!(opts.tags_to_mark, TagsToMark::StandardHtml);
        assert_eq!(opts.transient_layout, TransientLayout::Bid);
        assert!(!opts.include_screenshot);
    }

    #[test]
    fn test_extraction_options_from_camel_case_json() {
        let json = serde_json::json!({
            "computedStyles": ["display", "visibility"],
            "includeDomRects": false,
            "maxRetries": 5,
            "tagsToMark": "all"
        });

        let opts: ExtractionOptions = serde_json::from_value(json).unwrap();
        assert_eq!(opts.computed_styles, vec!["display", "visibility"]);
        assert!(!opts.include_dom_rects);
        assert!(opts.include_paint_order);
        assert_eq!(opts.max_retries, 5);
        assert_eq!(opts.tags_to_mark, TagsToMark::All);
    }

    #[test]
    fn test_extraction_builder() {
        let opts = ExtractionOptions::new()
            .computed_styles(["display"])
            .include_paint_order(false)
            .max_retries(0)
            .call_timeout_ms(250);

        assert_eq!(opts.computed_styles, vec!["display".to_string()]);
        assert!(!opts.include_paint_order);
        assert_eq!(opts.max_retries, 0);
        assert_eq!(opts.call_timeout(), Duration::from_millis(250));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let opts = ExtractionOptions::new().call_timeout_ms(0);
        assert!(matches!(opts.validate(), Err(BrowserError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_huge_retry_budget() {
        let opts: ExtractionOptions = serde_json::from_value(serde_json::json!({"maxRetries": u64::MAX})).unwrap();
        assert_eq!(opts.max_retries, usize::MAX);
        assert!(matches!(opts.validate(), Err(BrowserError::InvalidConfig(msg)) if msg.contains("maxRetries")));

        assert!(ExtractionOptions::new().max_retries(MAX_RETRIES).validate().is_ok());
        assert!(ExtractionOptions::new().max_retries(MAX_RETRIES + 1).validate().is_err());
    }

    #[test]
    fn test_launch_options_builder() {
        let opts = LaunchOptions::new().headless(false).window_size(800, 600).sandbox(false);

        assert!(!opts.headless);
        assert_eq!(opts.window_width, 800);
        assert_eq!(opts.window_height, 600);
        assert!(!opts.sandbox);
    }

    #[test]
    fn test_connection_options() {
        let opts = ConnectionOptions::new("ws://localhost:9222").timeout(5000);

        assert_eq!(opts.ws_url, "ws://localhost:9222");
        assert_eq!(opts.timeout, 5000);
    }
}
