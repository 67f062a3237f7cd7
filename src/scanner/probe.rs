use std::collections::HashMap;
use std::fmt;
use std::io::{self, ErrorKind};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{OnceCell, RwLock};
use tokio::time::timeout;
use tracing::{debug, warn};

pub const RESOLUTION_FAILED: &str = "name resolution failed";

/// A single `(host, port)` pair to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: Arc<str>,
    pub port: u16,
}

impl Target {
    pub fn new(host: Arc<str>, port: u16) -> Self {
        Self { host, port }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Open,
    Closed,
    /// The host itself cannot be reached by name. Fatal for the whole scan.
    Unreachable(String),
}

/// One connection attempt against one target.
///
/// Implementations must be single-shot: no retries, and any socket they open
/// is released before `probe` returns.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome;
}

/// Name lookup used by [`TcpProber`].
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// The OS resolver, through tokio's blocking pool.
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(lookup_host((host, port)).await?.collect())
    }
}

/// TCP connect prober backed by a name resolver and tokio sockets.
///
/// Each host name is looked up at most once per prober: concurrent callers
/// wait on the same in-flight lookup and share its answer, failures included.
pub struct TcpProber {
    resolver: Arc<dyn Resolver>,
    resolved: RwLock<HashMap<Arc<str>, Arc<OnceCell<Option<IpAddr>>>>>,
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::with_resolver(Arc::new(SystemResolver))
    }
}

impl TcpProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    async fn resolve(&self, host: &Arc<str>, port: u16) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }

        let cached = self.resolved.read().await.get(host).cloned();
        let cell = match cached {
            Some(cell) => cell,
            None => self
                .resolved
                .write()
                .await
                .entry(host.clone())
                .or_default()
                .clone(),
        };

        *cell.get_or_init(|| self.lookup(host, port)).await
    }

    async fn lookup(&self, host: &str, port: u16) -> Option<IpAddr> {
        let addrs = match self.resolver.lookup(host, port).await {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!("lookup of {} failed: {}", host, e);
                return None;
            }
        };

        // Prefer IPv4, fall back to whatever the resolver gave us first
        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .map(|addr| addr.ip())
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, target: &Target, connect_timeout: Duration) -> ProbeOutcome {
        let Some(ip) = self.resolve(&target.host, target.port).await else {
            return ProbeOutcome::Unreachable(RESOLUTION_FAILED.to_string());
        };

        let addr = SocketAddr::new(ip, target.port);
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                ProbeOutcome::Open
            }
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                debug!("{} refused", target);
                ProbeOutcome::Closed
            }
            Ok(Err(e)) => {
                warn!("{} connect error: {}", target, e);
                ProbeOutcome::Closed
            }
            Err(_) => {
                debug!("{} timed out after {:?}", target, connect_timeout);
                ProbeOutcome::Closed
            }
        }
    }
}
