//! Readiness probes used by stage checks.
//!
//! Every probe is a single attempt; callers wrap them in a [`RetryPolicy`].

use nebari_core::{NebariError, Result, RetryPolicy};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;

/// Attempts per readiness check.
pub const NUM_ATTEMPTS: u32 = 10;
/// Pause between attempts.
pub const ATTEMPT_DELAY: Duration = Duration::from_secs(10);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Ten attempts, ten seconds apart.
pub fn readiness_policy() -> RetryPolicy {
    RetryPolicy::fixed(NUM_ATTEMPTS, ATTEMPT_DELAY)
}

/// Five DNS polling rounds, waiting 60·2ⁿ seconds after round n.
pub fn dns_backoff_policy() -> RetryPolicy {
    RetryPolicy::exponential(5, Duration::from_secs(60), 2.0)
}

/// Every address `host` resolves to.
pub async fn resolve(host: &str) -> Result<BTreeSet<IpAddr>> {
    let addresses = lookup_host((host, 0))
        .await
        .map_err(|e| NebariError::Stage(format!("failed to resolve {}: {}", host, e)))?;
    Ok(addresses.map(|a| a.ip()).collect())
}

pub async fn tcp_connect(host: &str, port: u16) -> Result<()> {
    let connect = TcpStream::connect((host, port));
    match timeout(CONNECT_TIMEOUT, connect).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(NebariError::Stage(format!("tcp://{}:{}: {}", host, port, e))),
        Err(_) => Err(NebariError::Stage(format!("tcp://{}:{}: timed out", host, port))),
    }
}

/// Waits until `host:port` accepts connections.
pub async fn wait_for_tcp(host: &str, port: u16, policy: &RetryPolicy) -> Result<()> {
    policy
        .retry(&format!("tcp://{}:{}", host, port), |_| tcp_connect(host, port))
        .await?;
    tracing::info!("connected to tcp://{}:{}", host, port);
    Ok(())
}

/// Succeeds when `domain` resolves to at least one of `expected`.
pub async fn dns_points_to(domain: &str, expected: &BTreeSet<IpAddr>) -> Result<()> {
    let resolved = resolve(domain).await?;
    if resolved.iter().any(|ip| expected.contains(ip)) {
        return Ok(());
    }
    Err(NebariError::Stage(format!(
        "domain {} resolves to {:?}, expected one of {:?}",
        domain, resolved, expected
    )))
}

/// Polls DNS in rounds of `lookup` attempts, backing off between rounds.
pub async fn wait_for_dns(
    domain: &str,
    expected: &BTreeSet<IpAddr>,
    lookup: &RetryPolicy,
    rounds: &RetryPolicy,
) -> Result<()> {
    let lookup_label = format!("DNS lookup of {}", domain);
    rounds
        .retry(&format!("DNS record for {}", domain), |_| {
            lookup.retry(&lookup_label, |_| dns_points_to(domain, expected))
        })
        .await?;
    tracing::info!("DNS configured: domain={} matches ingress ips={:?}", domain, expected);
    Ok(())
}

/// HTTP client for in-cluster endpoints. Certificates are usually self-signed
/// right after a deploy, so they are not verified.
pub fn insecure_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| NebariError::Stage(format!("failed to build HTTP client: {}", e)))
}

/// Any status below 400 counts as healthy.
pub async fn http_healthy(client: &reqwest::Client, url: &str) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| NebariError::Stage(format!("{}: {}", url, e)))?;
    let status = response.status();
    if status.as_u16() < 400 {
        Ok(())
    } else {
        Err(NebariError::Stage(format!("{} answered {}", url, status)))
    }
}

pub async fn wait_for_http(client: &reqwest::Client, url: &str, policy: &RetryPolicy) -> Result<()> {
    policy
        .retry(&format!("health check {}", url), |_| http_healthy(client, url))
        .await?;
    tracing::info!("health check succeeded for url={}", url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use tokio::net::TcpListener;

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_tcp_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        wait_for_tcp("127.0.0.1", port, &quick(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_closed_port_gives_up() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(wait_for_tcp("127.0.0.1", port, &quick(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_dns_match() {
        let expected: BTreeSet<IpAddr> = ["127.0.0.1".parse().unwrap()].into();
        wait_for_dns("127.0.0.1", &expected, &quick(1), &quick(1)).await.unwrap();

        let elsewhere: BTreeSet<IpAddr> = ["192.0.2.1".parse().unwrap()].into();
        assert!(wait_for_dns("127.0.0.1", &elsewhere, &quick(2), &quick(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_http_retries_until_healthy() {
        let mut server = Server::new_async().await;
        let starting = server
            .mock("GET", "/hub/api/")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let ready = server
            .mock("GET", "/hub/api/")
            .with_status(302)
            .expect(1)
            .create_async()
            .await;
        let url = format!("{}/hub/api/", server.url());

        wait_for_http(&insecure_client().unwrap(), &url, &quick(3)).await.unwrap();
        starting.assert_async().await;
        ready.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_status_fails() {
        let mut server = Server::new_async().await;
        let _broken = server.mock("GET", "/").with_status(500).create_async().await;
        let err = wait_for_http(&insecure_client().unwrap(), &server.url(), &quick(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
