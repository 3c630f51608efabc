//! Connectivity Probes
//!
//! How the monitor decides whether the network is reachable right now.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::network::{Network, RequestDescriptor};

/// Answers "is the network reachable?" at the moment of the call.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

// == HTTP Probe ==
/// Issues a HEAD request to a known URL. Any response, whatever its status,
/// means the network is reachable; a timeout or transport error means it is
/// not.
pub struct HttpProbe {
    network: Arc<dyn Network>,
    request: RequestDescriptor,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(network: Arc<dyn Network>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            network,
            request: RequestDescriptor::new("HEAD", url),
            timeout,
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_online(&self) -> bool {
        let outcome =
            tokio::time::timeout(self.timeout, self.network.send(&self.request, self.timeout)).await;
        match outcome {
            Ok(Ok(response)) => {
                debug!(url = %self.request.url, status = response.status, "Probe reached network");
                true
            }
            Ok(Err(e)) => {
                debug!(url = %self.request.url, error = %e, "Probe failed");
                false
            }
            Err(_) => {
                debug!(url = %self.request.url, "Probe timed out");
                false
            }
        }
    }
}
