//! Dynamic port discovery

use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Default scan range when the configured port is 0.
pub const DEFAULT_PORT_RANGE: (u16, u16) = (10000, 10500);

/// Bind the first free port in `[start, end]` on `host`. Ports already in
/// use are skipped; any other bind error aborts the scan.
pub async fn discover_port(host: &str, start: u16, end: u16) -> Result<(TcpListener, u16)> {
    let host_ip: std::net::IpAddr = host.parse()?;

    for port in start..=end {
        let addr = SocketAddr::from((host_ip, port));
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                if port != start {
                    info!("Ports below {} were taken, bound {}", port, port);
                }
                return Ok((listener, port));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(e) => return Err(anyhow!("bind {} failed: {}", addr, e)),
        }
    }

    Err(anyhow!(
        "no free port between {} and {} on {}",
        start,
        end,
        host
    ))
}

/// Bind a fixed port, or discover one when `port` is 0.
pub async fn bind(host: &str, port: u16) -> Result<(TcpListener, u16)> {
    if port == 0 {
        let (start, end) = DEFAULT_PORT_RANGE;
        return discover_port(host, start, end).await;
    }

    let host_ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((host_ip, port));
    let listener = TcpListener::bind(addr).await?;
    Ok((listener, port))
}
