// ABOUTME: Anti-block signal collaborator that requests a new network identity after a block.
// ABOUTME: Provides the AntiBlockSignal trait and a Tor control-port implementation (NEWNYM).

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Requests a fresh network identity (e.g. a new exit relay).
///
/// Invoked for effect only after a 403/429. Callers log a failure and carry on.
#[async_trait]
pub trait AntiBlockSignal: Send + Sync + fmt::Debug {
    async fn renew_identity(&self) -> anyhow::Result<()>;
}

/// Connection settings for a Tor control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorControlConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl Default for TorControlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9051,
            password: String::new(),
        }
    }
}

/// Sends `SIGNAL NEWNYM` over the Tor control protocol.
#[derive(Debug, Clone)]
pub struct TorControl {
    config: TorControlConfig,
    timeout: Duration,
}

impl TorControl {
    pub fn new(config: TorControlConfig) -> Self {
        Self {
            config,
            timeout: Duration::from_secs(10),
        }
    }

    /// Bound on connecting plus the whole command exchange.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn exchange(&self) -> anyhow::Result<()> {
        let addr = (self.config.host.as_str(), self.config.port);
        let stream = TcpStream::connect(addr).await.with_context(|| {
            format!(
                "connecting to Tor control port {}:{}",
                self.config.host, self.config.port
            )
        })?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let auth = format!("AUTHENTICATE \"{}\"\r\n", quote(&self.config.password));
        command(&mut write_half, &mut reader, &auth, "AUTHENTICATE").await?;
        command(&mut write_half, &mut reader, "SIGNAL NEWNYM\r\n", "SIGNAL NEWNYM").await?;

        // The relay closes the connection after QUIT; its reply is not needed.
        let _ = write_half.write_all(b"QUIT\r\n").await;
        Ok(())
    }
}

/// Escape a password for a quoted control-protocol string.
fn quote(password: &str) -> String {
    password.replace('\\', "\\\\").replace('"', "\\\"")
}

async fn command<W, R>(writer: &mut W, reader: &mut R, line: &str, name: &str) -> anyhow::Result<()>
where
    W: AsyncWriteExt + Unpin,
    R: AsyncBufReadExt + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let mut reply = String::new();
    let read = reader.read_line(&mut reply).await?;
    if read == 0 {
        bail!("control port closed the connection during {}", name);
    }
    if !reply.starts_with("250") {
        bail!("{} rejected: {}", name, reply.trim_end());
    }
    Ok(())
}

#[async_trait]
impl AntiBlockSignal for TorControl {
    async fn renew_identity(&self) -> anyhow::Result<()> {
        tokio::time::timeout(self.timeout, self.exchange())
            .await
            .context("Tor control exchange timed out")??;
        tracing::info!("Tor circuit renewed (NEWNYM sent)");
        Ok(())
    }
}
