//! The server's own public (egress) IP, used to tell tenants what to
//! allow-list when their database refuses us.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kennel_core::{KennelError, KennelResult};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[async_trait]
pub trait PublicIpLookup: Send + Sync {
    async fn lookup(&self) -> KennelResult<String>;
}

/// Asks an ipify-style endpoint (`{"ip": "..."}`) for our address.
pub struct HttpIpLookup {
    http: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct IpResponse {
    ip: String,
}

impl HttpIpLookup {
    pub fn new(url: impl Into<String>, timeout: Duration) -> KennelResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KennelError::configuration("cannot build egress lookup client").with_source(e))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PublicIpLookup for HttpIpLookup {
    async fn lookup(&self) -> KennelResult<String> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| KennelError::connectivity("egress ip lookup failed").with_source(e))?;
        let body: IpResponse = response
            .json()
            .await
            .map_err(|e| KennelError::internal("egress ip lookup returned garbage").with_source(e))?;
        Ok(body.ip)
    }
}

/// Fixed answer, or a failure, for tests and air-gapped deployments.
pub struct StaticIpLookup {
    ip: Option<String>,
    calls: AtomicUsize,
}

impl StaticIpLookup {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            ip: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublicIpLookup for StaticIpLookup {
    async fn lookup(&self) -> KennelResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ip
            .clone()
            .ok_or_else(|| KennelError::connectivity("egress ip lookup disabled"))
    }
}

/// Best-effort, TTL-cached egress IP.
pub struct EgressIp {
    lookup: Arc<dyn PublicIpLookup>,
    ttl: Duration,
    cached: Mutex<Option<(String, Instant)>>,
}

impl EgressIp {
    pub fn new(lookup: Arc<dyn PublicIpLookup>, ttl: Duration) -> Self {
        Self {
            lookup,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// `None` when the lookup fails; failures are not cached.
    pub async fn current(&self) -> Option<String> {
        // Held across the lookup so concurrent callers share one request.
        let mut cached = self.cached.lock().await;
        if let Some((ip, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                debug!("egress ip cache hit");
                return Some(ip.clone());
            }
        }

        match self.lookup.lookup().await {
            Ok(ip) => {
                *cached = Some((ip.clone(), Instant::now()));
                Some(ip)
            }
            Err(err) => {
                warn!(error = %err, "egress ip lookup failed");
                None
            }
        }
    }
}
