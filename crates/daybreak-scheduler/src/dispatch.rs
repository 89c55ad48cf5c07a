//! Briefing delivery: Discord webhook or a generic JSON webhook.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use daybreak_core::config::DeliveryConfig;
use daybreak_core::error::{DaybreakError, Result};
use daybreak_core::traits::Delivery;
use daybreak_core::types::{BriefingArtifact, Section, Tone};
use serde_json::{Value, json};

/// Longest alert message shown in a critical-alert embed.
pub const ALERT_MESSAGE_CAP: usize = 2000;

const CRITICAL_COLOR: u32 = 0xFF0000;

/// Where briefings go.
#[derive(Debug, Clone)]
pub enum NotifyTarget {
    /// Discord webhook URL.
    Discord { webhook_url: String },
    /// Generic HTTP webhook, POST with the artifact as JSON.
    Webhook {
        url: String,
        headers: Vec<(String, String)>,
    },
}

impl NotifyTarget {
    /// Discord wins when both are configured.
    pub fn from_config(config: &DeliveryConfig) -> Option<Self> {
        if !config.discord_webhook_url.is_empty() {
            Some(NotifyTarget::Discord {
                webhook_url: config.discord_webhook_url.clone(),
            })
        } else if !config.webhook_url.is_empty() {
            Some(NotifyTarget::Webhook {
                url: config.webhook_url.clone(),
                headers: vec![],
            })
        } else {
            None
        }
    }

    fn label(&self) -> &'static str {
        match self {
            NotifyTarget::Discord { .. } => "discord",
            NotifyTarget::Webhook { .. } => "webhook",
        }
    }
}

pub struct WebhookDelivery {
    target: Option<NotifyTarget>,
    username: String,
    client: reqwest::Client,
}

impl WebhookDelivery {
    pub fn new(target: Option<NotifyTarget>, username: impl Into<String>) -> Self {
        Self {
            target,
            username: username.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        let target = NotifyTarget::from_config(config);
        if target.is_none() {
            tracing::warn!("⚠️ No delivery target configured; briefings will fail to send");
        }
        Self::new(target, config.username.clone())
    }

    fn target(&self) -> Result<&NotifyTarget> {
        self.target
            .as_ref()
            .ok_or_else(|| DaybreakError::Delivery("no delivery target configured".into()))
    }

    async fn post(&self, target: &NotifyTarget, payload: &Value) -> Result<()> {
        let (url, headers) = match target {
            NotifyTarget::Discord { webhook_url } => (webhook_url.as_str(), None),
            NotifyTarget::Webhook { url, headers } => (url.as_str(), Some(headers)),
        };

        let mut req = self
            .client
            .post(url)
            .json(payload)
            .timeout(Duration::from_secs(10));
        for (key, value) in headers.into_iter().flatten() {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| DaybreakError::Delivery(format!("{} send failed: {e}", target.label())))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(DaybreakError::Delivery(format!(
                "{} webhook error {status}: {body}",
                target.label()
            )))
        }
    }
}

fn tone_color(tone: Tone) -> u32 {
    match tone {
        Tone::Positive => 0x2ECC71,
        Tone::Negative => 0xE74C3C,
        Tone::Neutral => 0x95A5A6,
        Tone::Warning => 0xF39C12,
        Tone::Info => 0x3498DB,
    }
}

fn section_embed(section: &Section) -> Value {
    json!({
        "title": section.title,
        "description": section.body,
        "color": tone_color(section.tone),
    })
}

/// Names of the stages that degraded, from `"<stage>: <reason>"` entries.
fn degraded_stages(artifact: &BriefingArtifact) -> Vec<&str> {
    artifact
        .failures
        .iter()
        .map(|f| f.split_once(':').map_or(f.as_str(), |(stage, _)| stage))
        .collect()
}

/// One embed per section; header on the first, status footer on the last.
pub fn discord_briefing_payload(artifact: &BriefingArtifact, username: &str) -> Value {
    let mut embeds: Vec<Value> = artifact.sections.iter().map(section_embed).collect();

    if let Some(first) = embeds.first_mut() {
        first["author"] = json!({ "name": format!("{} · {}", artifact.title, artifact.generated_at) });
    }
    let footer = if artifact.failures.is_empty() {
        "All sources OK".to_string()
    } else {
        format!("Degraded: {}", degraded_stages(artifact).join(", "))
    };
    if let Some(last) = embeds.last_mut() {
        last["footer"] = json!({ "text": footer });
    }

    json!({ "username": username, "embeds": embeds })
}

fn truncate_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        s.to_string()
    } else {
        let kept: String = s.chars().take(cap.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

pub fn discord_alert_payload(message: &str, username: &str) -> Value {
    json!({
        "username": username,
        "embeds": [{
            "title": "🚨 Critical briefing failure",
            "description": format!("```\n{}\n```", truncate_chars(message, ALERT_MESSAGE_CAP)),
            "color": CRITICAL_COLOR,
            "footer": { "text": format!("Daybreak • {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")) },
        }]
    })
}

#[async_trait]
impl Delivery for WebhookDelivery {
    fn name(&self) -> &str {
        self.target.as_ref().map_or("none", NotifyTarget::label)
    }

    async fn send(&self, artifact: &BriefingArtifact) -> Result<()> {
        let target = self.target()?;
        let payload = match target {
            NotifyTarget::Discord { .. } => discord_briefing_payload(artifact, &self.username),
            NotifyTarget::Webhook { .. } => json!({
                "kind": "briefing",
                "username": self.username,
                "briefing": artifact,
            }),
        };
        self.post(target, &payload).await?;
        tracing::info!(
            "📨 Briefing delivered via {} ({} sections)",
            target.label(),
            artifact.sections.len()
        );
        Ok(())
    }

    async fn send_alert(&self, message: &str) -> Result<()> {
        let target = self.target()?;
        let payload = match target {
            NotifyTarget::Discord { .. } => discord_alert_payload(message, &self.username),
            NotifyTarget::Webhook { .. } => json!({
                "kind": "critical",
                "username": self.username,
                "message": truncate_chars(message, ALERT_MESSAGE_CAP),
                "timestamp": Utc::now().to_rfc3339(),
            }),
        };
        self.post(target, &payload).await?;
        tracing::info!("🚨 Critical alert delivered via {}", target.label());
        Ok(())
    }
}
