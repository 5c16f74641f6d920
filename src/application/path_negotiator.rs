use crate::domain::{
    AccelerationSettings, ConnectionProfile, Endpoint, LatencyProbe, PathDecision,
    SessionSettings,
};
use std::sync::Arc;
use std::time::Duration;

/// ProxyNegotiator picks the network path for a connect attempt: direct,
/// user-configured proxy, or lowest-latency acceleration relay.
///
/// Stateless apart from the injected probe; every failure degrades to a
/// direct decision rather than blocking the connection.
pub struct ProxyNegotiator {
    probe: Arc<dyn LatencyProbe>,
    probe_timeout: Duration,
}

impl ProxyNegotiator {
    pub fn new(probe: Arc<dyn LatencyProbe>, settings: &SessionSettings) -> Self {
        Self {
            probe,
            probe_timeout: settings.probe_timeout(),
        }
    }

    /// Decide the path for one connect attempt.
    ///
    /// A configured proxy wins when reachable; an unreachable proxy falls
    /// back to direct with the `degraded` flag set. With acceleration
    /// enabled, every relay is probed concurrently and the fastest responder
    /// wins, ties broken by list order; if all relays fail the decision is
    /// direct.
    pub async fn select_path(
        &self,
        profile: &ConnectionProfile,
        acceleration: &AccelerationSettings,
    ) -> PathDecision {
        if let Some(proxy) = &profile.proxy {
            let endpoint = proxy.endpoint();
            return match self.probe.probe(&endpoint, self.probe_timeout).await {
                Ok(latency) => {
                    tracing::debug!(%endpoint, ?latency, "proxy reachable");
                    PathDecision::proxy(endpoint)
                }
                Err(e) => {
                    tracing::warn!(%endpoint, error = %e, "proxy unreachable, falling back to direct");
                    PathDecision::direct_degraded()
                }
            };
        }

        if acceleration.enabled && !acceleration.relays.is_empty() {
            if let Some(relay) = self.fastest_relay(&acceleration.relays).await {
                return PathDecision::acceleration(relay);
            }
            tracing::warn!("all acceleration relays unreachable, falling back to direct");
        }

        PathDecision::direct()
    }

    async fn fastest_relay(&self, relays: &[Endpoint]) -> Option<Endpoint> {
        let probes = relays.iter().map(|relay| {
            let probe = Arc::clone(&self.probe);
            let timeout = self.probe_timeout;
            async move { probe.probe(relay, timeout).await.ok().map(|lat| (relay, lat)) }
        });

        let results = futures::future::join_all(probes).await;

        // strictly-lower comparison keeps the earliest relay on latency ties
        let mut best: Option<(&Endpoint, Duration)> = None;
        for (relay, latency) in results.into_iter().flatten() {
            match best {
                Some((_, current)) if latency >= current => {}
                _ => best = Some((relay, latency)),
            }
        }

        best.map(|(relay, latency)| {
            tracing::info!(%relay, ?latency, "selected acceleration relay");
            relay.clone()
        })
    }
}
