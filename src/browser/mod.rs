//! Browser management: launching or attaching to Chrome and driving a tab over CDP

pub mod cdp;
pub mod config;
pub mod session;

pub use cdp::CdpPage;
pub use config::{ConnectionOptions, ExtractionOptions, LaunchOptions, MAX_RETRIES, TagsToMark};
pub use session::BrowserSession;
