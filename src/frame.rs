//! The unit of dataflow exchanged between pipeline elements.
//!
//! A [`Frame`] carries an optional media payload (tensor, regions of interest,
//! color space) plus an open key-value side channel (`other_data`). Elements
//! never mutate a frame in place: derived frames are built with
//! [`Frame::project`], which shares the structural fields and copies the side
//! channel so that sibling frames cannot observe each other's data.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A dense numeric payload attached to a frame, shape-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Dimensions of the payload, outermost first.
    pub shape: Vec<usize>,
    /// Raw element data.
    pub data: Vec<u8>,
}

/// An axis-aligned region of interest within a frame's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Color space tag for a frame's payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    Rgb,
    Bgr,
    Grayscale,
    Yuv,
    #[default]
    Unspecified,
}

/// The unit of dataflow exchanged between pipeline elements.
///
/// Structural fields (`tensor`, `rois`, `headers`) are reference-counted and
/// treated as immutable once attached; the `other_data` side channel is owned
/// per frame.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Optional numeric array payload.
    pub tensor: Option<Arc<Tensor>>,
    /// Optional regions of interest within the payload.
    pub rois: Option<Arc<Vec<RegionOfInterest>>>,
    /// Color space of the payload.
    pub color_space: ColorSpace,
    /// Identifier assigned by the frame's producer.
    pub frame_id: u64,
    /// Optional transport headers attached by the host runtime.
    pub headers: Option<Arc<HashMap<String, String>>>,
    /// Open side-channel data, keyed by string.
    pub other_data: Map<String, Value>,
}

impl Frame {
    /// Create an empty frame with the given identifier.
    pub fn new(frame_id: u64) -> Self {
        Self {
            frame_id,
            ..Self::default()
        }
    }

    /// Insert a side-channel entry, returning the frame for chaining.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.other_data.insert(key.into(), value.into());
        self
    }

    /// Build a derived frame: structural fields shared by reference, the side
    /// channel copied and then merged with `overlay`.
    ///
    /// Overlay keys win on collision; keys already present in the source are
    /// never dropped. The returned frame shares no mutable side-channel state
    /// with the source or with any previously projected sibling.
    ///
    /// # Example
    ///
    /// ```rust
    /// use prompt_chain::Frame;
    /// use serde_json::{json, Map};
    ///
    /// let source = Frame::new(7).with_data("message", "hello");
    /// let mut overlay = Map::new();
    /// overlay.insert("chain_step".to_string(), json!(1));
    ///
    /// let derived = source.project(overlay);
    /// assert_eq!(derived.frame_id, 7);
    /// assert_eq!(derived.other_data["message"], json!("hello"));
    /// assert_eq!(derived.other_data["chain_step"], json!(1));
    /// ```
    #[must_use]
    pub fn project(&self, overlay: Map<String, Value>) -> Frame {
        let mut other_data = self.other_data.clone();
        for (key, value) in overlay {
            other_data.insert(key, value);
        }
        Frame {
            tensor: self.tensor.clone(),
            rois: self.rois.clone(),
            color_space: self.color_space,
            frame_id: self.frame_id,
            headers: self.headers.clone(),
            other_data,
        }
    }

    /// Recover the chain's input text from the side channel.
    ///
    /// Sources are checked in priority order: a direct `message` entry
    /// (stringified whatever its JSON type), then an `api` message list from
    /// which user-role text is gathered — plain string content as well as
    /// `{"type": "text"}` parts of multimodal content lists — joined with
    /// single spaces.
    ///
    /// Returns `None` when neither source is present. The result may still be
    /// blank (e.g. a user message with only image parts); callers decide
    /// whether that is an error.
    pub fn extract_text(&self) -> Option<String> {
        if let Some(message) = self.other_data.get("message") {
            return Some(match message {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }

        let messages = self.other_data.get("api")?.as_array()?;
        let mut text = String::new();
        for message in messages {
            let Some(message) = message.as_object() else {
                continue;
            };
            if message.get("role").and_then(Value::as_str) != Some("user") {
                continue;
            }
            match message.get("content") {
                Some(Value::String(content)) => push_segment(&mut text, content),
                Some(Value::Array(parts)) => {
                    for part in parts {
                        if part.get("type").and_then(Value::as_str) == Some("text") {
                            if let Some(part_text) = part.get("text").and_then(Value::as_str) {
                                push_segment(&mut text, part_text);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        Some(text)
    }
}

fn push_segment(text: &mut String, segment: &str) {
    if !text.is_empty() {
        text.push(' ');
    }
    text.push_str(segment);
}
