//! Camera HTTP control plane: stream settings query and stream selection.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn validate_stream_index(index: u8) -> anyhow::Result<()> {
    if index > 1 {
        anyhow::bail!("stream index must be 0 or 1, got {}", index);
    }
    Ok(())
}

/// Response of `/ctrl/stream_setting?action=query`. Numeric fields are kept
/// as the camera sent them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    #[serde(rename = "streamIndex", default)]
    pub stream_index: Option<String>,
    #[serde(rename = "encoderType", default)]
    pub encoder_type: Option<String>,
    #[serde(default)]
    pub bitwidth: Option<Value>,
    #[serde(default)]
    pub width: Option<Value>,
    #[serde(default)]
    pub height: Option<Value>,
    #[serde(default)]
    pub fps: Option<Value>,
    #[serde(default)]
    pub sample_unit: Option<Value>,
    #[serde(default)]
    pub bitrate: Option<Value>,
    #[serde(default)]
    pub gop_n: Option<Value>,
    #[serde(default)]
    pub rotation: Option<Value>,
    #[serde(rename = "splitDuration", default)]
    pub split_duration: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
}

impl StreamSettings {
    pub fn is_idle(&self) -> bool {
        self.status.as_deref() == Some("idle")
    }

    /// Dump file extension; the camera reports e.g. "h264" or "h265".
    pub fn encoder_type(&self) -> &str {
        self.encoder_type.as_deref().unwrap_or("h26x")
    }
}

fn or_na(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => "N/A".to_string(),
    }
}

impl Display for StreamSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  Stream Index: {}", self.stream_index.as_deref().unwrap_or("N/A"))?;
        writeln!(f, "  Encoder Type: {}", self.encoder_type.as_deref().unwrap_or("N/A"))?;
        writeln!(f, "  Bit Width: {}", or_na(&self.bitwidth))?;
        writeln!(f, "  Resolution: {}x{}", or_na(&self.width), or_na(&self.height))?;
        writeln!(f, "  FPS: {}", or_na(&self.fps))?;
        writeln!(f, "  Sample Unit: {}", or_na(&self.sample_unit))?;
        writeln!(f, "  Bitrate: {} kbps", or_na(&self.bitrate))?;
        writeln!(f, "  GOP: {}", or_na(&self.gop_n))?;
        writeln!(f, "  Rotation: {}", or_na(&self.rotation))?;
        writeln!(f, "  Split Duration: {} seconds", or_na(&self.split_duration))?;
        write!(f, "  Status: {}", self.status.as_deref().unwrap_or("N/A"))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SetResponse {
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
}

pub struct ControlClient {
    client: reqwest::Client,
    base_url: String,
}

impl ControlClient {
    pub fn new(ip: &str, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_base_url(format!("http://{}", ip), timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn query_stream_settings(&self, index: u8) -> anyhow::Result<StreamSettings> {
        validate_stream_index(index)?;
        let url = format!(
            "{}/ctrl/stream_setting?index=stream{}&action=query",
            self.base_url, index
        );
        log::info!("querying stream{} settings with: {}", index, url);

        let settings = self
            .client
            .get(&url)
            .send()
            .await
            .context("HTTP request failed")?
            .error_for_status()
            .context("HTTP request failed")?
            .json::<StreamSettings>()
            .await
            .context("invalid JSON response")?;

        log::info!("stream{} settings:\n{}", index, settings);
        Ok(settings)
    }

    /// Fails unless the stream reports `idle`.
    pub async fn ensure_idle(&self, index: u8) -> anyhow::Result<StreamSettings> {
        let settings = self.query_stream_settings(index).await?;
        if !settings.is_idle() {
            anyhow::bail!(
                "Stream is not idle, current status: {}",
                settings.status.as_deref().unwrap_or("None")
            );
        }
        log::info!("stream{} is idle", index);
        Ok(settings)
    }

    pub async fn select_stream(&self, index: u8) -> anyhow::Result<()> {
        validate_stream_index(index)?;
        let url = format!("{}/ctrl/set?send_stream=Stream{}", self.base_url, index);
        log::info!("selecting Stream{} with: {}", index, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("HTTP request failed")?
            .error_for_status()
            .context("HTTP request failed")?
            .json::<SetResponse>()
            .await
            .context("invalid JSON response")?;

        match response.code {
            Some(0) => {
                log::info!("Stream{} set successfully", index);
                Ok(())
            }
            code => anyhow::bail!(
                "Error code: {}, message: {}",
                code.map_or("None".to_string(), |c| c.to_string()),
                response.msg.as_deref().unwrap_or("None")
            ),
        }
    }

    /// Query, check idle, then select: the sequence required before the
    /// camera will stream.
    pub async fn prepare_stream(&self, index: u8) -> anyhow::Result<StreamSettings> {
        let settings = self.ensure_idle(index).await?;
        self.select_stream(index).await?;
        Ok(settings)
    }
}

#[cfg(test)]
#[path = "control_test.rs"]
mod control_test;
