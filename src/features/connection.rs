//! Connection-level feature.

use std::net::SocketAddr;

use crate::net::exchange::ConnectionInfo;

/// Addressing details of the connection a request arrived on.
#[derive(Debug, Clone)]
pub struct HttpConnectionFeature {
    pub connection_id: String,
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
}

impl From<&ConnectionInfo> for HttpConnectionFeature {
    fn from(info: &ConnectionInfo) -> Self {
        Self {
            connection_id: info.id.to_string(),
            remote_addr: info.remote_addr,
            local_addr: info.local_addr,
        }
    }
}
