//! Optional run notifications posted to a Discord webhook.

use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Error, Result};

const USERNAME: &str = "Placemend";
const COLOR_OK: u32 = 0x2E_CC_71;
const COLOR_WARN: u32 = 0xF1_C4_0F;
const COLOR_FAIL: u32 = 0xE7_4C_3C;

/// Discord caps embed descriptions at 4096 characters
const MAX_DESCRIPTION: usize = 4000;

#[derive(Serialize, Debug, PartialEq)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

#[derive(Serialize, Debug, PartialEq)]
struct Payload {
    username: String,
    embeds: Vec<Embed>,
}

/// Milestones of a run worth telling the operators about
#[derive(Debug, Clone)]
pub enum RunEvent<'a> {
    Started { target: &'a str, mode: &'a str },
    Reported { summary: &'a str },
    Finished { summary: &'a str },
    Aborted { reason: &'a str },
    Failed { error: &'a str },
}

impl RunEvent<'_> {
    fn title(&self, tool: &str) -> String {
        let what = match self {
            RunEvent::Started { .. } => "started",
            RunEvent::Reported { .. } => "report ready",
            RunEvent::Finished { .. } => "finished",
            RunEvent::Aborted { .. } => "aborted",
            RunEvent::Failed { .. } => "failed",
        };
        format!("{} {}", tool, what)
    }

    fn description(&self) -> String {
        let text = match self {
            RunEvent::Started { target, mode } => format!("Running on **{}** ({})", target, mode),
            RunEvent::Reported { summary } | RunEvent::Finished { summary } => {
                format!("```\n{}\n```", summary)
            }
            RunEvent::Aborted { reason } => format!("No changes written: {}", reason),
            RunEvent::Failed { error } => format!("Error: {}", error),
        };
        if text.chars().count() > MAX_DESCRIPTION {
            let mut cut: String = text.chars().take(MAX_DESCRIPTION).collect();
            cut.push_str("\n...");
            cut
        } else {
            text
        }
    }

    fn color(&self) -> u32 {
        match self {
            RunEvent::Failed { .. } => COLOR_FAIL,
            RunEvent::Aborted { .. } => COLOR_WARN,
            _ => COLOR_OK,
        }
    }
}

pub struct DiscordNotifier {
    url: String,
    tool: String,
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(url: impl Into<String>, tool: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.into(),
            tool: tool.into(),
            client,
        })
    }

    fn payload(&self, event: &RunEvent<'_>) -> Payload {
        Payload {
            username: USERNAME.to_string(),
            embeds: vec![Embed {
                title: event.title(&self.tool),
                description: event.description(),
                color: event.color(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            }],
        }
    }

    pub async fn send(&self, event: &RunEvent<'_>) -> Result<()> {
        let payload = self.payload(event);
        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::unavailable("discord", format!("HTTP {}: {}", status, body)));
        }

        info!("Sent notification: {}", payload.embeds[0].title);
        Ok(())
    }

    /// Send, logging failures instead of returning them
    pub async fn notify(&self, event: &RunEvent<'_>) {
        if let Err(e) = self.send(event).await {
            warn!("Notification failed: {}", e);
        }
    }
}

/// Send through `notifier` when one is configured
pub async fn maybe_notify(notifier: Option<&DiscordNotifier>, event: RunEvent<'_>) {
    if let Some(n) = notifier {
        n.notify(&event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let notifier = DiscordNotifier::new("http://localhost/hook", "fix-regions").unwrap();
        let payload = notifier.payload(&RunEvent::Aborted { reason: "not confirmed" });

        assert_eq!(payload.username, "Placemend");
        assert_eq!(payload.embeds[0].title, "fix-regions aborted");
        assert_eq!(payload.embeds[0].color, COLOR_WARN);
        assert!(payload.embeds[0].description.contains("not confirmed"));

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["embeds"][0]["timestamp"].is_string());
    }

    #[test]
    fn test_long_reports_are_truncated() {
        let summary = "x".repeat(5000);
        let event = RunEvent::Finished { summary: &summary };
        let description = event.description();
        assert!(description.chars().count() <= MAX_DESCRIPTION + 4);
        assert!(description.ends_with("..."));
    }
}
