use crate::domain::{Endpoint, LatencyProbe};
use crate::errors::{CoreError, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Latency probe that measures the time to complete a TCP handshake with
/// the endpoint. Good enough for proxy reachability checks and relay
/// ranking without speaking any higher protocol.
#[derive(Debug, Default)]
pub struct TcpLatencyProbe;

impl TcpLatencyProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LatencyProbe for TcpLatencyProbe {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Duration> {
        let started = Instant::now();
        let address = format!("{}:{}", endpoint.host, endpoint.port);

        match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                let elapsed = started.elapsed();
                tracing::debug!(%endpoint, latency_ms = elapsed.as_millis() as u64, "probe succeeded");
                Ok(elapsed)
            }
            Ok(Err(e)) => Err(CoreError::Network(format!(
                "probe of {} failed: {}",
                endpoint, e
            ))),
            Err(_) => Err(CoreError::Network(format!(
                "probe of {} timed out after {}ms",
                endpoint,
                timeout.as_millis()
            ))),
        }
    }
}
