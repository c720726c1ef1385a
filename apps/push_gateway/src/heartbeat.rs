use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::transport::Transport;

/// Used when a heartbeat URL is configured without a usable interval.
const FALLBACK_INTERVAL_SECS: u64 = 60;
/// Longer intervals are clamped so the timer deadline cannot overflow.
const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Periodic liveness ping, independent of inbound traffic.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    url: String,
    interval: Duration,
}

impl Heartbeat {
    /// `None` when no heartbeat URL is configured.
    pub fn new(url: &str, interval_secs: u64) -> Option<Self> {
        if url.is_empty() {
            return None;
        }
        let interval_secs = if interval_secs == 0 {
            tracing::warn!(
                "heartbeat_interval is not set, pinging every {}s",
                FALLBACK_INTERVAL_SECS
            );
            FALLBACK_INTERVAL_SECS
        } else if interval_secs > MAX_INTERVAL_SECS {
            tracing::warn!(
                "heartbeat_interval {}s is too large, pinging every {}s",
                interval_secs,
                MAX_INTERVAL_SECS
            );
            MAX_INTERVAL_SECS
        } else {
            interval_secs
        };
        Some(Self {
            url: url.to_string(),
            interval: Duration::from_secs(interval_secs),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Pings once per interval until `shutdown` is cancelled. The first ping
    /// goes out one interval after the call. A ping in flight is abandoned on
    /// cancellation.
    pub fn spawn(self, transport: Transport, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = self.ping(&transport) => {}
                }
            }
            tracing::debug!("heartbeat stopped");
        })
    }

    async fn ping(&self, transport: &Transport) {
        match transport.get(&self.url).await {
            Ok((status, body)) => {
                tracing::info!("heartbeat response ({}): {}", status, body);
            }
            Err(err) => {
                tracing::warn!("heartbeat failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn empty_url_disables_heartbeat() {
        assert!(Heartbeat::new("", 30).is_none());
    }

    #[test]
    fn zero_interval_uses_fallback() {
        let heartbeat = Heartbeat::new("http://localhost/ping", 0).expect("heartbeat");
        assert_eq!(heartbeat.interval(), Duration::from_secs(FALLBACK_INTERVAL_SECS));
        assert_eq!(heartbeat.url(), "http://localhost/ping");
    }

    #[test]
    fn oversized_interval_is_clamped() {
        let heartbeat = Heartbeat::new("http://localhost/ping", u64::MAX).expect("heartbeat");
        assert_eq!(heartbeat.interval(), Duration::from_secs(MAX_INTERVAL_SECS));
        assert_eq!(
            Heartbeat::new("http://localhost/ping", 45).expect("heartbeat").interval(),
            Duration::from_secs(45)
        );
    }

    #[tokio::test]
    async fn oversized_interval_spawns_and_stops() {
        let heartbeat = Heartbeat::new("http://127.0.0.1:1/ping", u64::MAX).expect("heartbeat");
        let shutdown = CancellationToken::new();
        let handle = heartbeat.spawn(Transport::new().expect("transport"), shutdown.clone());
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("heartbeat exits after cancel")
            .expect("task did not panic");
    }

    #[tokio::test]
    async fn cancel_interrupts_slow_ping() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200).delay(Duration::from_secs(20));
            })
            .await;

        let heartbeat = Heartbeat::new(&server.url("/ping"), 1).expect("heartbeat");
        let shutdown = CancellationToken::new();
        let handle = heartbeat.spawn(Transport::new().expect("transport"), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("heartbeat exits while a ping is pending")
            .expect("task");
    }

    #[tokio::test]
    async fn pings_until_cancelled() {
        let server = MockServer::start_async().await;
        let ping = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200).body("pong");
            })
            .await;

        let heartbeat = Heartbeat::new(&server.url("/ping"), 1).expect("heartbeat");
        let shutdown = CancellationToken::new();
        let handle = heartbeat.spawn(Transport::new().expect("transport"), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("heartbeat exits after cancel")
            .expect("task");

        let calls = ping.calls_async().await;
        assert!((1..=3).contains(&calls), "unexpected ping count {calls}");
    }

    #[tokio::test]
    async fn first_ping_waits_one_interval() {
        let server = MockServer::start_async().await;
        let ping = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200);
            })
            .await;

        let heartbeat = Heartbeat::new(&server.url("/ping"), 30).expect("heartbeat");
        let shutdown = CancellationToken::new();
        let handle = heartbeat.spawn(Transport::new().expect("transport"), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        handle.await.expect("task");
        ping.assert_calls_async(0).await;
    }
}
