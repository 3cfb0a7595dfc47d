//! Outbound webhook target for chat connectors and overlays.
//!
//! Each reply is POSTed as JSON. When the target has a secret, the body is
//! signed with HMAC-SHA256 and the signature sent as
//! `X-Reka-Signature: sha256=<hex>`, so the receiver can verify it the same
//! way GitHub-style webhooks are verified.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use rk_domain::config::{WebhookKind, WebhookTargetConfig};
use rk_domain::error::{Error, Result};
use rk_domain::InboundMeta;

use crate::{DispatchTarget, TargetKind};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-reka-signature";

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    platform: &'a str,
    user: Option<&'a str>,
    channel: Option<&'a str>,
    reply_to: Option<&'a str>,
}

/// `sha256=<hex>` HMAC of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Other(format!("HMAC key: {e}")))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

pub struct WebhookTarget {
    name: String,
    kind: WebhookKind,
    url: String,
    platforms: Vec<String>,
    secret: Option<String>,
    client: reqwest::Client,
}

impl WebhookTarget {
    pub fn from_config(cfg: &WebhookTargetConfig, timeout: Duration) -> Result<Self> {
        let secret = cfg.secret_env.as_deref().and_then(|var| match std::env::var(var) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => {
                tracing::warn!(target_name = %cfg.name, env = var, "webhook secret env var not set, sending unsigned");
                None
            }
        });

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("build client for {}: {e}", cfg.name)))?;

        Ok(Self {
            name: cfg.name.clone(),
            kind: cfg.kind,
            url: cfg.url.clone(),
            platforms: cfg.platforms.clone(),
            secret,
            client,
        })
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Empty `platforms` means every platform.
    fn accepts(&self, meta: &InboundMeta) -> bool {
        self.platforms.is_empty() || self.platforms.iter().any(|p| p == &meta.platform)
    }

    fn dispatch_error(&self, message: impl Into<String>) -> Error {
        Error::Dispatch {
            target: self.name.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl DispatchTarget for WebhookTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TargetKind {
        match self.kind {
            WebhookKind::ChatReply => TargetKind::ChatReply,
            WebhookKind::Overlay => TargetKind::Overlay,
        }
    }

    async fn send(&self, text: &str, meta: &InboundMeta) -> Result<()> {
        if !self.accepts(meta) {
            tracing::trace!(target_name = %self.name, platform = %meta.platform, "platform not served, skipping");
            return Ok(());
        }

        let payload = WebhookPayload {
            text,
            platform: &meta.platform,
            user: meta.user.as_deref(),
            channel: meta.channel.as_deref(),
            reply_to: meta.reply_to.as_deref(),
        };
        let body = serde_json::to_vec(&payload)?;

        let mut req = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            req = req.header(SIGNATURE_HEADER, sign(secret, &body)?);
        }

        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| self.dispatch_error(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(self.dispatch_error(format!("HTTP {} - {}", status.as_u16(), text)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(platforms: &[&str]) -> WebhookTargetConfig {
        WebhookTargetConfig {
            name: "twitch".into(),
            kind: WebhookKind::ChatReply,
            url: "http://127.0.0.1:9/reply".into(),
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            secret_env: None,
        }
    }

    #[test]
    fn signature_is_prefixed_hex() {
        let sig = sign("secret", b"{}").unwrap();
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
        assert_eq!(sig, sign("secret", b"{}").unwrap());
        assert_ne!(sig, sign("other", b"{}").unwrap());
    }

    #[test]
    fn platform_filter() {
        let all = WebhookTarget::from_config(&config(&[]), Duration::from_secs(1)).unwrap();
        assert!(all.accepts(&InboundMeta::for_platform("discord")));

        let twitch = WebhookTarget::from_config(&config(&["twitch"]), Duration::from_secs(1)).unwrap();
        assert!(twitch.accepts(&InboundMeta::for_platform("twitch")));
        assert!(!twitch.accepts(&InboundMeta::for_platform("discord")));
    }

    #[tokio::test]
    async fn filtered_platform_is_a_successful_no_op() {
        // Port 9 (discard) is never contacted because the filter short-circuits.
        let target = WebhookTarget::from_config(&config(&["twitch"]), Duration::from_secs(1)).unwrap();
        target.send("hi", &InboundMeta::for_platform("discord")).await.unwrap();
    }

    #[test]
    fn overlay_kind_maps_through() {
        let mut cfg = config(&[]);
        cfg.kind = WebhookKind::Overlay;
        let target = WebhookTarget::from_config(&cfg, Duration::from_secs(1)).unwrap();
        assert_eq!(target.kind(), TargetKind::Overlay);
    }
}
