//! The peer identifier service.
//!
//! Runs on the serializer, after the distributor. When the dialog path did
//! not already attach a peer, the registered resolvers are consulted in
//! order. A request nobody can identify gets the artificial peer instead,
//! so the authenticator downstream challenges it; only ACK is exempt,
//! because SIP allows no response to an ACK. The service never consumes a
//! message.
//!
//! Sources that keep sending unidentifiable requests are tracked per IP
//! address and escalated once they cross the configured threshold.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::events::{SecurityEvent, SecuritySink};
use crate::peer::{Peer, PeerResolver};
use crate::service::{SipService, PRIORITY_TSX_LAYER};
use crate::transport::IncomingMessage;
use crate::{Endpoint, Result};

/// Registered name of the peer identifier service.
pub const IDENTIFIER_SERVICE: &str = "peer-identifier";

/// Escalation thresholds for unidentifiable traffic.
#[derive(Debug, Clone, Copy)]
pub struct UnidentifiedLimits {
    /// Unidentified requests from one address tolerated per `period`.
    pub count: u32,
    /// Observation window.
    pub period: Duration,
    /// Idle time after which an address's record is forgotten.
    pub prune_interval: Duration,
}

impl Default for UnidentifiedLimits {
    fn default() -> Self {
        UnidentifiedLimits {
            count: 5,
            period: Duration::from_secs(5),
            prune_interval: Duration::from_secs(30),
        }
    }
}

struct UnidentifiedEntry {
    count: u32,
    first: Instant,
    last: Instant,
}

/// The peer identifier service. See the module docs.
pub struct PeerIdentifier {
    resolvers: Vec<Box<dyn PeerResolver>>,
    artificial: Arc<Peer>,
    sink: Arc<dyn SecuritySink>,
    limits: UnidentifiedLimits,
    unidentified: Mutex<HashMap<IpAddr, UnidentifiedEntry>>,
}

impl PeerIdentifier {
    pub(crate) fn new(
        resolvers: Vec<Box<dyn PeerResolver>>,
        artificial: Arc<Peer>,
        sink: Arc<dyn SecuritySink>,
    ) -> Self {
        PeerIdentifier {
            resolvers,
            artificial,
            sink,
            limits: UnidentifiedLimits::default(),
            unidentified: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the escalation thresholds.
    pub fn with_limits(mut self, limits: UnidentifiedLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Counts one unidentified request from `addr` and returns the count
    /// accumulated within the current period.
    fn track(&self, addr: IpAddr) -> u32 {
        let now = Instant::now();
        let mut entries = self.unidentified.lock().expect("Lock failed");

        entries.retain(|_, entry| now.duration_since(entry.last) < self.limits.prune_interval);

        let entry = entries.entry(addr).or_insert(UnidentifiedEntry {
            count: 0,
            first: now,
            last: now,
        });
        if now.duration_since(entry.first) > self.limits.period {
            entry.count = 0;
            entry.first = now;
        }
        entry.count += 1;
        entry.last = now;

        entry.count
    }

    fn forget(&self, addr: IpAddr) {
        let mut entries = self.unidentified.lock().expect("Lock failed");
        entries.remove(&addr);
    }
}

#[async_trait::async_trait]
impl SipService for PeerIdentifier {
    fn name(&self) -> &str {
        IDENTIFIER_SERVICE
    }

    fn priority(&self) -> u32 {
        PRIORITY_TSX_LAYER - 3
    }

    async fn on_rx_request(&self, _endpoint: &Endpoint, rx: &mut IncomingMessage) -> Result<bool> {
        // The dialog path may have attached the peer before dispatch.
        if rx.peer.is_some() {
            return Ok(false);
        }

        for resolver in &self.resolvers {
            if let Some(peer) = resolver.identify(rx).await {
                log::debug!(
                    "{} from /{} identified as '{}' by '{}'",
                    rx.describe(),
                    rx.addr(),
                    peer.name(),
                    resolver.name()
                );
                self.forget(rx.addr().ip());
                rx.peer = Some(peer);
                return Ok(false);
            }
        }

        // No response may follow an ACK, so there is no point in attaching
        // a peer just to have it challenged.
        if rx.method().is_ack() {
            return Ok(false);
        }

        rx.peer = Some(self.artificial.clone());
        log::warn!(
            "Request '{}' from '{}' failed for '{}' (callid: {}) - No matching peer found",
            rx.method(),
            rx.headers.from.uri,
            rx.addr(),
            rx.call_id()
        );

        let count = self.track(rx.addr().ip());
        self.sink.report(SecurityEvent::InvalidPeer {
            from: rx.headers.from.uri.clone(),
            call_id: rx.call_id().clone(),
            addr: *rx.addr(),
        });
        if count >= self.limits.count {
            log::warn!(
                "'{}' sent {} unidentified requests within the observation period",
                rx.addr().ip(),
                count
            );
            self.sink.report(SecurityEvent::RequestFlood {
                addr: rx.addr().ip(),
                count,
            });
        }

        Ok(false)
    }
}
