//! Builtin components.
//!
//! Real capture/recognition/synthesis components live in separate crates and
//! register themselves at process start; the builtins here are the small set
//! every deployment gets — paced test sources, arithmetic conduits, and the
//! sinks that back the editor's preview surfaces.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Category, Component, ComponentDescriptor, ComponentRegistration, ComponentRegistry, NodeContext, StepInput};
use crate::error::{ComponentError, ComponentResult};
use crate::payload::Payload;

/// Registers every builtin component.
pub fn register_all(registry: &mut ComponentRegistry) {
    registry.register(ticker_registration());
    registry.register(tone_registration());
    registry.register(scale_registration());
    registry.register(stamp_registration());
    registry.register(mix_registration());
    registry.register(log_sink_registration());
    registry.register(video_preview_registration());
}

fn descriptor(
    name: &str,
    category: Category,
    init: Value,
    inputs: &[(&str, &str)],
    outputs: &[(&str, &str)],
) -> ComponentDescriptor {
    ComponentDescriptor {
        name: name.to_string(),
        category,
        init: init
            .as_object()
            .expect("init schema must be an object")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        inputs: inputs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        outputs: outputs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ticker — paced integer source
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(default)]
struct TickerConfig {
    interval_ms: u64,
    start: i64,
    limit: Option<u64>,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            start: 1,
            limit: None,
        }
    }
}

struct Ticker {
    config: TickerConfig,
    next: i64,
    emitted: u64,
}

#[async_trait]
impl Component for Ticker {
    async fn step(&mut self, _input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()> {
        if self.config.limit.is_some_and(|limit| self.emitted >= limit) {
            // Exhausted: park until the runtime cancels the produce loop.
            futures::future::pending::<()>().await;
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(self.config.interval_ms)).await;
        ctx.publish("out", Payload::Int(self.next))?;
        self.next += 1;
        self.emitted += 1;
        Ok(())
    }
}

fn ticker_registration() -> ComponentRegistration {
    ComponentRegistration::new(
        descriptor(
            "ticker",
            Category::Source,
            json!({
                "interval_ms": {"type": "integer", "default": 100},
                "start": {"type": "integer", "default": 1},
                "limit": {"anyOf": [{"type": "integer"}, {"type": "null"}], "default": null},
            }),
            &[],
            &[("out", "int")],
        ),
        |args| {
            let config: TickerConfig = serde_json::from_value(args.clone())?;
            let next = config.start;
            Ok(Box::new(Ticker {
                config,
                next,
                emitted: 0,
            }))
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// tone — sine wave PCM source
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(default)]
struct ToneFormat {
    sample_rate: u32,
    channels: u16,
}

impl Default for ToneFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct ToneEnvelope {
    gain: f64,
}

impl Default for ToneEnvelope {
    fn default() -> Self {
        Self { gain: 0.5 }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct ToneConfig {
    freq_hz: f64,
    frame_ms: u64,
    format: ToneFormat,
    envelope: ToneEnvelope,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            freq_hz: 440.0,
            frame_ms: 20,
            format: ToneFormat::default(),
            envelope: ToneEnvelope::default(),
        }
    }
}

struct Tone {
    config: ToneConfig,
    phase: f64,
}

impl Tone {
    /// Synthesizes one interleaved 16-bit PCM frame, advancing the phase.
    fn frame(&mut self) -> Bytes {
        let samples =
            (self.config.format.sample_rate as u64 * self.config.frame_ms / 1000) as usize;
        let channels = self.config.format.channels as usize;
        let step = std::f64::consts::TAU * self.config.freq_hz / self.config.format.sample_rate as f64;
        let gain = self.config.envelope.gain.clamp(0.0, 1.0);

        let mut buf = Vec::with_capacity(samples * channels * 2);
        for _ in 0..samples {
            let value = (self.phase.sin() * gain * f64::from(i16::MAX)) as i16;
            for _ in 0..channels {
                buf.extend_from_slice(&value.to_le_bytes());
            }
            self.phase = (self.phase + step) % std::f64::consts::TAU;
        }
        Bytes::from(buf)
    }
}

#[async_trait]
impl Component for Tone {
    async fn step(&mut self, _input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()> {
        tokio::time::sleep(Duration::from_millis(self.config.frame_ms)).await;
        let frame = self.frame();
        ctx.publish("out", Payload::Audio(frame))?;
        Ok(())
    }
}

fn tone_registration() -> ComponentRegistration {
    ComponentRegistration::new(
        descriptor(
            "tone",
            Category::Source,
            json!({
                "freq_hz": {"type": "number", "default": 440.0},
                "frame_ms": {"type": "integer", "default": 20},
                "format": {
                    "type": "object",
                    "properties": {
                        "sample_rate": {"type": "integer", "default": 48000},
                        "channels": {"type": "integer", "default": 1},
                    }
                },
                "envelope": {
                    "$ref": "#/$defs/Envelope",
                    "$defs": {
                        "Envelope": {
                            "type": "object",
                            "properties": {"gain": {"type": "number", "default": 0.5}}
                        }
                    }
                },
            }),
            &[],
            &[("out", "audio")],
        ),
        |args| {
            let config: ToneConfig = serde_json::from_value(args.clone())?;
            if config.freq_hz <= 0.0 {
                return Err(ComponentError::Config("freq_hz must be positive".into()));
            }
            Ok(Box::new(Tone { config, phase: 0.0 }))
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// scale — integer multiplier
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(default)]
struct ScaleConfig {
    factor: i64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self { factor: 2 }
    }
}

struct Scale {
    factor: i64,
}

#[async_trait]
impl Component for Scale {
    async fn step(&mut self, input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()> {
        let Some(StepInput { item, .. }) = input else {
            return Ok(());
        };
        let Payload::Int(value) = item else {
            return Err(ComponentError::failed("scale expects int input"));
        };
        ctx.publish("out", Payload::Int(value.wrapping_mul(self.factor)))
    }
}

fn scale_registration() -> ComponentRegistration {
    ComponentRegistration::new(
        descriptor(
            "scale",
            Category::Conduit,
            json!({"factor": {"type": "integer", "default": 2}}),
            &[("in", "int")],
            &[("out", "int")],
        ),
        |args| {
            let config: ScaleConfig = serde_json::from_value(args.clone())?;
            Ok(Box::new(Scale {
                factor: config.factor,
            }))
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// stamp — integer to text formatter
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(default)]
struct StampConfig {
    template: String,
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            template: "tick {}".to_string(),
        }
    }
}

struct Stamp {
    template: String,
}

#[async_trait]
impl Component for Stamp {
    async fn step(&mut self, input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()> {
        let Some(StepInput { item, .. }) = input else {
            return Ok(());
        };
        let Payload::Int(value) = item else {
            return Err(ComponentError::failed("stamp expects int input"));
        };
        let text = self.template.replace("{}", &value.to_string());
        ctx.publish("out", Payload::Text(text))
    }
}

fn stamp_registration() -> ComponentRegistration {
    ComponentRegistration::new(
        descriptor(
            "stamp",
            Category::Conduit,
            json!({"template": {"type": "string", "default": "tick {}"}}),
            &[("in", "int")],
            &[("out", "text")],
        ),
        |args| {
            let config: StampConfig = serde_json::from_value(args.clone())?;
            Ok(Box::new(Stamp {
                template: config.template,
            }))
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// mix — two-input pass-through
// ─────────────────────────────────────────────────────────────────────────────

/// Forwards whichever input produced. A two-input conduit exists mostly to
/// exercise the step-on-any delivery policy end to end.
struct Mix;

#[async_trait]
impl Component for Mix {
    async fn step(&mut self, input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()> {
        if let Some(StepInput { item, .. }) = input {
            ctx.publish("out", item)?;
        }
        Ok(())
    }
}

fn mix_registration() -> ComponentRegistration {
    ComponentRegistration::new(
        descriptor(
            "mix",
            Category::Conduit,
            json!({}),
            &[("a", "int"), ("b", "int")],
            &[("out", "int")],
        ),
        |_args| Ok(Box::new(Mix)),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// log_sink — text logger
// ─────────────────────────────────────────────────────────────────────────────

struct LogSink {
    lines: u64,
}

#[async_trait]
impl Component for LogSink {
    async fn step(&mut self, input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()> {
        let Some(StepInput { item, .. }) = input else {
            return Ok(());
        };
        let Payload::Text(line) = item else {
            return Err(ComponentError::failed("log_sink expects text input"));
        };
        self.lines += 1;
        log::info!("[log_sink:{}] {}", ctx.node_id(), line);
        Ok(())
    }

    async fn stop(&mut self) {
        log::debug!("[log_sink] {} lines received", self.lines);
    }
}

fn log_sink_registration() -> ComponentRegistration {
    ComponentRegistration::new(
        descriptor(
            "log_sink",
            Category::Sink,
            json!({}),
            &[("in", "text")],
            &[],
        ),
        |_args| Ok(Box::new(LogSink { lines: 0 })),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// video_preview — JPEG frame forwarder
// ─────────────────────────────────────────────────────────────────────────────

/// Visual sink backing `/video/ws/{node_id}`: forwards each incoming encoded
/// frame to the node's video tap.
struct VideoPreview;

#[async_trait]
impl Component for VideoPreview {
    async fn step(&mut self, input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()> {
        let Some(StepInput { item, .. }) = input else {
            return Ok(());
        };
        let Payload::Video(frame) = item else {
            return Err(ComponentError::failed("video_preview expects video input"));
        };
        ctx.emit_video(frame);
        Ok(())
    }
}

fn video_preview_registration() -> ComponentRegistration {
    ComponentRegistration::new(
        descriptor(
            "video_preview",
            Category::Sink,
            json!({}),
            &[("in", "video")],
            &[],
        ),
        |_args| Ok(Box::new(VideoPreview)),
    )
}
