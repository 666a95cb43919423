//! browser-observe CLI
//!
//! Opens a page, extracts one observation, and prints it.
//!
//! Usage:
//!   browser-observe <url>                     JSON observation on stdout
//!   browser-observe <url> --format summary    One line per marked element
//!   browser-observe <url> --screenshot shot.png

use anyhow::{Context, Result};
use browser_observe::{
    BrowserSession, ConnectionOptions, ExtractionOptions, LaunchOptions, PageObservation, TagsToMark, TransientLayout,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "browser-observe")]
#[command(author, version, about = "Extract an agent-consumable observation of a web page")]
struct Cli {
    /// Page to observe
    url: String,

    /// Launch a visible browser window
    #[arg(long)]
    headed: bool,

    /// Attach to a running browser instead of launching one
    #[arg(long, value_name = "WS_URL")]
    connect: Option<String>,

    /// Milliseconds to wait after navigation before extracting
    #[arg(long, default_value = "0")]
    settle_ms: u64,

    /// Retries after the first attempt
    #[arg(long, default_value = "3")]
    max_retries: usize,

    /// Bound on each browser round-trip, in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    /// Which elements get a bid
    #[arg(long, value_enum, default_value = "standard-html")]
    tags: Tags,

    /// Also encode element geometry in the transient data
    #[arg(long)]
    geometry: bool,

    /// Keep the transient data in the DOM snapshot strings
    #[arg(long)]
    no_cleanup: bool,

    /// Computed style to include in the snapshot (repeatable)
    #[arg(long = "style", value_name = "NAME")]
    styles: Vec<String>,

    /// Write a PNG screenshot of the viewport
    #[arg(long, value_name = "FILE")]
    screenshot: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "json")]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Tags {
    All,
    StandardHtml,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Summary,
}

impl Cli {
    fn extraction_options(&self) -> ExtractionOptions {
        ExtractionOptions::new()
            .computed_styles(self.styles.iter().cloned())
            .cleanup_temporary_data(!self.no_cleanup)
            .max_retries(self.max_retries)
            .call_timeout_ms(self.timeout_ms)
            .tags_to_mark(match self.tags {
                Tags::All => TagsToMark::All,
                Tags::StandardHtml => TagsToMark::StandardHtml,
            })
            .transient_layout(if self.geometry { TransientLayout::Geometry } else { TransientLayout::Bid })
            .include_screenshot(self.screenshot.is_some())
    }
}

fn print_summary(observation: &PageObservation) {
    println!("focused: {:?}", observation.focused_element_bid);
    for skipped in &observation.marking.skipped {
        println!("skipped frame {} ({:?})", skipped.frame_id, skipped.reason);
    }
    for (bid, props) in &observation.extra_properties {
        let bbox = props
            .bbox
            .map(|b| format!("[{:.0},{:.0} {:.0}x{:.0}]", b.x, b.y, b.width, b.height))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>8} {:<10} {:<24} vis={} click={} {}",
            bid,
            props.element.as_deref().unwrap_or("?"),
            bbox,
            props.visibility.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string()),
            props.clickable,
            props.text_content.as_deref().unwrap_or("").chars().take(60).collect::<String>(),
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let options = cli.extraction_options();

    let session = match &cli.connect {
        Some(ws_url) => BrowserSession::connect(ConnectionOptions::new(ws_url.clone())),
        None => BrowserSession::launch(LaunchOptions::new().headless(!cli.headed)),
    }
    .context("Failed to start browser")?;

    session.navigate(&cli.url).with_context(|| format!("Failed to open {}", cli.url))?;
    session.wait_for_navigation()?;
    if cli.settle_ms > 0 {
        std::thread::sleep(Duration::from_millis(cli.settle_ms));
    }

    let observation = session.observe(&options).context("Extraction failed")?;

    if let (Some(path), Some(image)) = (&cli.screenshot, &observation.screenshot) {
        image.save(path).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Screenshot written to {}", path.display());
    }

    match cli.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&observation)?),
        Format::Summary => print_summary(&observation),
    }

    Ok(())
}
