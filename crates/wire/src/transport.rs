use crate::error::WireError;

/// TCP location of a remote service.
///
/// A service answers calls on `port` and publishes events on `port + 1`,
/// the same adjacent-port layout a broker uses for its frontend/backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transport {
    host: String,
    port: u16,
}

impl Transport {
    /// Create a transport for the given host and call port.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` or `scheme://host:port[/]`.
    ///
    /// The scheme is ignored so that addresses published as `ws://...` by
    /// other components still resolve to a ZeroMQ TCP endpoint.
    pub fn parse(address: &str) -> Result<Self, WireError> {
        let invalid = || WireError::InvalidAddress(address.to_string());

        let trimmed = address.trim();
        let rest = match trimmed.split_once("://") {
            Some((_, rest)) => rest,
            None => trimmed,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        // The event port sits right above the call port.
        if port == u16::MAX {
            return Err(invalid());
        }
        Ok(Self::tcp(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Endpoint of the service's call (ROUTER) socket.
    pub fn rpc_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    /// Endpoint of the service's event (PUB) socket.
    pub fn events_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port.saturating_add(1))
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
