use anyhow::{Context, Result};
use std::net::SocketAddr;
use url::Url;

// ── Address resolution ──────────────────────────────────────────────────────

/// Parse a listen address given either as `host:port` or `ws://host:port`.
pub fn resolve_listen_addr(listen: &str) -> Result<SocketAddr> {
    let trimmed = listen.trim();
    if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        let url = Url::parse(trimmed).context("Invalid WebSocket URL")?;
        let host = url.host_str().context("WebSocket URL missing host")?;
        let port = url
            .port_or_known_default()
            .context("WebSocket URL missing port")?;
        let addr = format!("{}:{}", host, port);
        return addr
            .parse()
            .with_context(|| format!("Invalid listen address {}", addr));
    }

    trimmed
        .parse()
        .with_context(|| format!("Invalid listen address {}", trimmed))
}

/// URL of the game client's data channel: `ws://<host>:<port>/<path>`.
pub fn data_channel_url(host: &str, port: u16, path: &str) -> Result<Url> {
    let raw = format!(
        "ws://{}:{}/{}",
        host.trim(),
        port,
        path.trim().trim_start_matches('/')
    );
    Url::parse(&raw).with_context(|| format!("Invalid data channel URL {}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_accepts_plain_and_ws_forms() {
        let plain = resolve_listen_addr("127.0.0.1:8765").unwrap();
        let ws = resolve_listen_addr(" ws://127.0.0.1:8765 ").unwrap();
        assert_eq!(plain, ws);
        assert_eq!(plain.port(), 8765);
    }

    #[test]
    fn listen_addr_rejects_garbage() {
        assert!(resolve_listen_addr("localhost").is_err());
        assert!(resolve_listen_addr("ws://").is_err());
    }

    #[test]
    fn data_channel_url_joins_parts() {
        let url = data_channel_url("127.0.0.1", 9000, "sus-agent-channel").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/sus-agent-channel");

        let url = data_channel_url("127.0.0.1", 9000, "/sus-agent-channel").unwrap();
        assert_eq!(url.path(), "/sus-agent-channel");
    }
}
