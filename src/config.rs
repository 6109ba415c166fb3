use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use frame_bus::{
    codec::{CodecFormat, ThreadKind, Threading},
    decoder::DecoderConfig,
    display::DisplayConfig,
    scaler::Viewport,
    writer::WriterConfig,
};
use serde::{Deserialize, Serialize};

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn as_millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSection {
    pub queue_capacity: usize,
    pub submit_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// `null` waits for the writer to drain however long it takes.
    pub stop_timeout_ms: Option<u64>,
    pub flush_each_frame: bool,
    pub progress_interval: u64,
}

impl Default for WriterSection {
    fn default() -> Self {
        let d = WriterConfig::default();
        Self {
            queue_capacity: d.queue_capacity,
            submit_timeout_ms: as_millis(d.submit_timeout),
            poll_interval_ms: as_millis(d.poll_interval),
            stop_timeout_ms: d.stop_timeout.map(as_millis),
            flush_each_frame: d.flush_each_frame,
            progress_interval: d.progress_interval,
        }
    }
}

impl WriterSection {
    pub fn to_bus(&self) -> WriterConfig {
        WriterConfig {
            queue_capacity: self.queue_capacity,
            submit_timeout: millis(self.submit_timeout_ms),
            poll_interval: millis(self.poll_interval_ms),
            stop_timeout: self.stop_timeout_ms.map(millis),
            flush_each_frame: self.flush_each_frame,
            progress_interval: self.progress_interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSection {
    pub queue_capacity: usize,
    pub submit_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub stop_timeout_ms: Option<u64>,
    pub primary: String,
    pub fallback: Option<String>,
    pub threads: usize,
}

impl Default for DecoderSection {
    fn default() -> Self {
        let d = DecoderConfig::default();
        Self {
            queue_capacity: d.queue_capacity,
            submit_timeout_ms: as_millis(d.submit_timeout),
            poll_interval_ms: as_millis(d.poll_interval),
            stop_timeout_ms: d.stop_timeout.map(as_millis),
            primary: d.primary.name().to_string(),
            fallback: d.fallback.map(|f| f.name().to_string()),
            threads: d.threading.count,
        }
    }
}

impl DecoderSection {
    pub fn to_bus(&self) -> anyhow::Result<DecoderConfig> {
        let primary = CodecFormat::parse(&self.primary)
            .with_context(|| format!("unknown decoder format: {}", self.primary))?;
        let fallback = match &self.fallback {
            Some(name) => Some(
                CodecFormat::parse(name)
                    .with_context(|| format!("unknown decoder format: {}", name))?,
            ),
            None => None,
        };
        Ok(DecoderConfig {
            queue_capacity: self.queue_capacity,
            submit_timeout: millis(self.submit_timeout_ms),
            poll_interval: millis(self.poll_interval_ms),
            stop_timeout: self.stop_timeout_ms.map(millis),
            primary,
            fallback,
            threading: Threading {
                count: self.threads.max(1),
                kind: ThreadKind::Slice,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    pub queue_capacity: usize,
    pub submit_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub stop_timeout_ms: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
}

impl Default for DisplaySection {
    fn default() -> Self {
        let d = DisplayConfig::default();
        Self {
            queue_capacity: d.queue_capacity,
            submit_timeout_ms: as_millis(d.submit_timeout),
            poll_interval_ms: as_millis(d.poll_interval),
            stop_timeout_ms: d.stop_timeout.map(as_millis),
            width: 960,
            height: 540,
            jpeg_quality: 80,
        }
    }
}

impl DisplaySection {
    pub fn to_bus(&self) -> DisplayConfig {
        DisplayConfig {
            queue_capacity: self.queue_capacity,
            submit_timeout: millis(self.submit_timeout_ms),
            poll_interval: millis(self.poll_interval_ms),
            stop_timeout: self.stop_timeout_ms.map(millis),
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    pub timeout_ms: u64,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl ControlSection {
    pub fn timeout(&self) -> Duration {
        millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub writer: WriterSection,
    pub decoder: DecoderSection,
    pub display: DisplaySection,
    pub control: ControlSection,
    pub dump_dir: PathBuf,
    pub api_addr: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            writer: WriterSection::default(),
            decoder: DecoderSection::default(),
            display: DisplaySection::default(),
            control: ControlSection::default(),
            dump_dir: PathBuf::from("dump"),
            api_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("parse relay config")?;
        config.decoder.to_bus()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("load config {}", path.display()))
    }
}

static CONFIG: OnceLock<RelayConfig> = OnceLock::new();

/// Installs the process-wide config. Only the first call has any effect.
pub fn init(config: RelayConfig) -> &'static RelayConfig {
    CONFIG.get_or_init(|| config)
}

pub fn config() -> &'static RelayConfig {
    CONFIG.get_or_init(RelayConfig::default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
