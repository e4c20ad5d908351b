//! Runtime-typed pipeline elements.
//!
//! The graph is edited at runtime, so slot element types are checked as
//! strings ([`Payload::type_name`]) rather than with Rust generics. All
//! media-domain currencies are variants of one cloneable enum; the bulky
//! ones carry [`Bytes`] so fan-out to many subscribers stays cheap.

use bytes::Bytes;
use serde_json::Value;

/// One element flowing through a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw PCM audio frame.
    Audio(Bytes),
    /// Encoded video frame (JPEG).
    Video(Bytes),
    /// A line of text (transcripts, prompts, generated responses).
    Text(String),
    /// Structured data (detection results, API responses).
    Json(Value),
    /// Integer sample (counters, levels).
    Int(i64),
    /// Floating point sample (confidence scores, energies).
    Float(f64),
    /// Boolean sample (voice activity flags).
    Bool(bool),
    /// Opaque binary blob.
    Blob(Bytes),
}

fn truncate_chars(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push('…');
    }
    out
}

impl Payload {
    /// Declared-type string used for slot compatibility checks.
    ///
    /// Edge validation compares these by strict string equality; there is no
    /// implicit coercion between payload kinds.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Audio(_) => "audio",
            Self::Video(_) => "video",
            Self::Text(_) => "text",
            Self::Json(_) => "json",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Blob(_) => "bytes",
        }
    }

    /// Size probe for byte throughput accounting.
    ///
    /// Types with no natural byte size contribute 0.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Audio(b) | Self::Video(b) | Self::Blob(b) => b.len(),
            Self::Text(s) => s.len(),
            Self::Json(v) => v.to_string().len(),
            Self::Int(_) | Self::Float(_) | Self::Bool(_) => 0,
        }
    }

    /// Short human-readable rendering for the frame inspector.
    ///
    /// Bounded to keep inspector records small regardless of payload size.
    #[must_use]
    pub fn preview(&self) -> String {
        const MAX_TEXT: usize = 80;
        match self {
            Self::Audio(b) => format!("<audio {} bytes>", b.len()),
            Self::Video(b) => format!("<video {} bytes>", b.len()),
            Self::Blob(b) => format!("<bytes {} bytes>", b.len()),
            Self::Text(s) => truncate_chars(s, MAX_TEXT),
            Self::Json(v) => truncate_chars(&v.to_string(), MAX_TEXT),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}
