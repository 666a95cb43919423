//! Temporary-data codec
//!
//! The identifier injector smuggles per-element data through the
//! `aria-roledescription` attribute so that it shows up in both the DOM snapshot
//! and the accessibility tree. Values are laid out as
//! `bid_value1_value2_..._originalText`; decoding recovers the data and the
//! attribute's original text.

use regex::Regex;
use serde::{Deserialize, Serialize};

const BID_EXPR: &str = r"([a-z0-9]+)";
const FLOAT_EXPR: &str = r"([+-]?(?:[0-9]*[.])?[0-9]+)";
const BOOL_EXPR: &str = r"([01])";
const DELIMITER: char = '_';

/// Which fields the injector encodes ahead of the original attribute text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientLayout {
    /// `bid_original`
    #[default]
    Bid,
    /// `bid_left_top_centerX_centerY_right_bottom_inViewport_original`
    Geometry,
}

impl TransientLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientLayout::Bid => "bid",
            TransientLayout::Geometry => "geometry",
        }
    }

    /// Number of delimited fields encoded ahead of the original text
    pub fn field_count(&self) -> usize {
        match self {
            TransientLayout::Bid => 1,
            TransientLayout::Geometry => 8,
        }
    }

    fn pattern(&self) -> String {
        let fields = match self {
            TransientLayout::Bid => vec![BID_EXPR.to_string()],
            TransientLayout::Geometry => {
                let mut fields = vec![BID_EXPR.to_string()];
                fields.extend(std::iter::repeat_n(FLOAT_EXPR.to_string(), 6));
                fields.push(BOOL_EXPR.to_string());
                fields
            }
        };
        format!("(?s)^{}{}(.*)$", fields.join("_"), DELIMITER)
    }
}

/// Viewport geometry of an element at marking time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransientGeometry {
    pub left: f64,
    pub top: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub right: f64,
    pub bottom: f64,
    pub in_viewport: bool,
}

/// Data recovered from an encoded attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientData {
    pub bid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<TransientGeometry>,
}

impl TransientData {
    pub fn bid(bid: impl Into<String>) -> Self {
        Self { bid: bid.into(), geometry: None }
    }

    pub fn with_geometry(mut self, geometry: TransientGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

/// Outcome of decoding an attribute value
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// `None` when the value did not carry any transient data
    pub data: Option<TransientData>,
    /// Attribute text as it was before the injector touched it
    pub original: String,
}

/// Encoding scheme for transient per-element data
pub trait TransientCodec {
    fn layout(&self) -> TransientLayout;

    fn encode(&self, data: &TransientData, original: &str) -> String;

    /// Never fails: a value that does not match yields no data and is returned unchanged
    fn decode(&self, value: &str) -> Decoded;
}

/// The underscore-delimited scheme understood by the injected marking script
#[derive(Debug, Clone)]
pub struct UnderscoreCodec {
    layout: TransientLayout,
    pattern: Regex,
}

impl UnderscoreCodec {
    pub fn new(layout: TransientLayout) -> Self {
        let pattern = Regex::new(&layout.pattern()).expect("codec pattern is assembled from constant fragments");
        Self { layout, pattern }
    }
}

impl Default for UnderscoreCodec {
    fn default() -> Self {
        Self::new(TransientLayout::default())
    }
}

fn format_number(value: f64) -> String {
    if value.is_finite() { value.to_string() } else { "0".to_string() }
}

fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok()
}

impl TransientCodec for UnderscoreCodec {
    fn layout(&self) -> TransientLayout {
        self.layout
    }

    fn encode(&self, data: &TransientData, original: &str) -> String {
        let mut fields = vec![data.bid.clone()];
        if self.layout == TransientLayout::Geometry {
            let geometry = data.geometry.unwrap_or(TransientGeometry {
                left: 0.0,
                top: 0.0,
                center_x: 0.0,
                center_y: 0.0,
                right: 0.0,
                bottom: 0.0,
                in_viewport: false,
            });
            fields.extend(
                [geometry.left, geometry.top, geometry.center_x, geometry.center_y, geometry.right, geometry.bottom]
                    .into_iter()
                    .map(format_number),
            );
            fields.push(if geometry.in_viewport { "1" } else { "0" }.to_string());
        }
        fields.push(original.to_string());
        fields.join(&DELIMITER.to_string())
    }

    fn decode(&self, value: &str) -> Decoded {
        let unmatched = || {
            log::warn!("Data items could not be extracted from \"aria-roledescription\" attribute: {}", value);
            Decoded { data: None, original: value.to_string() }
        };

        let Some(captures) = self.pattern.captures(value) else {
            return unmatched();
        };
        let group = |i: usize| captures.get(i).map(|m| m.as_str()).unwrap_or_default();

        match self.layout {
            TransientLayout::Bid => Decoded { data: Some(TransientData::bid(group(1))), original: group(2).to_string() },
            TransientLayout::Geometry => {
                let numbers: Option<Vec<f64>> = (2..=7).map(|i| parse_number(group(i))).collect();
                let Some(numbers) = numbers else {
                    return unmatched();
                };
                let geometry = TransientGeometry {
                    left: numbers[0],
                    top: numbers[1],
                    center_x: numbers[2],
                    center_y: numbers[3],
                    right: numbers[4],
                    bottom: numbers[5],
                    in_viewport: group(8) == "1",
                };
                Decoded {
                    data: Some(TransientData::bid(group(1)).with_geometry(geometry)),
                    original: group(9).to_string(),
                }
            }
        }
    }
}
