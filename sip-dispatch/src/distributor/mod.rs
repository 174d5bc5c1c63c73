//! The inbound distributor.
//!
//! Every parsed message the transport layer hands to the endpoint passes
//! through here first. The distributor decides which serializer owns the
//! message, clones it off the transport task, and queues a task that runs
//! the rest of the service pipeline on that serializer. The transport task
//! never runs application logic.
//!
//! Serializer choice, in order:
//!
//! 1. the serializer pinned to the message's dialog;
//! 2. for responses, the serializer named on the matching client
//!    transaction's last request;
//! 3. a pool serializer picked by hashing (Call-ID, tag).
//!
//! In between sit the safety valves: a BYE or CANCEL that matches nothing
//! is answered 481 instead of hashed (a stale call on the far end is worth
//! a cheap answer), and when the overload alert is up, traffic without an
//! affinity is silently dropped so peer retransmission can deliver it once
//! the backlog clears.


use std::sync::Arc;

use crate::auth::{Authenticator, CredentialVerifier};
use crate::dialog::Dialog;
use crate::endpoint::Builder;
use crate::events::SecuritySink;
use crate::identify::PeerIdentifier;
use crate::message::{SipMethod, StatusCode};
use crate::peer::{AuthCred, Peer, PeerResolver};
use crate::serializer::{Serializer, SerializerRegistry};
use crate::service::{SipService, PRIORITY_TSX_LAYER};
use crate::transaction::TsxKey;
use crate::transport::{IncomingMessage, OutgoingRequest};
use crate::{Endpoint, Result};

/// Number of serializers in the dispatch pool. A small prime spreads the
/// bucket hash.
pub const POOL_SIZE: usize = 31;

/// Name base the pool serializers derive their unique names from.
const POOL_NAME_BASE: &str = "sip/distributor";

/// Registered name of the distributor service.
pub const DISTRIBUTOR_SERVICE: &str = "distributor";

/// Picks a pool bucket for (Call-ID, tag).
///
/// DJB2 over the exact bytes of the Call-ID followed by the tag, on a
/// signed 32-bit accumulator with wrapping arithmetic; the bucket is the
/// absolute value modulo [`POOL_SIZE`]. No case folding, no normalization.
pub fn hash_bucket(call_id: &str, tag: Option<&str>) -> usize {
    let mut hash: i32 = 5381;

    for &byte in call_id.as_bytes() {
        hash = hash.wrapping_mul(33) ^ byte as i32;
    }
    if let Some(tag) = tag {
        for &byte in tag.as_bytes() {
            hash = hash.wrapping_mul(33) ^ byte as i32;
        }
    }

    hash.unsigned_abs() as usize % POOL_SIZE
}

/// The inbound dispatch subsystem.
///
/// Owns the serializer pool and the artificial peer/auth singletons for as
/// long as it lives, and hands out the three services that make up the
/// inbound path. Shut down by dropping: drop the endpoint first (no new
/// work), then this; queued tasks drain before the pool serializers
/// disappear.
pub struct Dispatch {
    registry: SerializerRegistry,
    pool: Arc<[Serializer]>,
    artificial_peer: Arc<Peer>,
    artificial_auth: Arc<AuthCred>,
}

impl Dispatch {
    /// Creates the subsystem: the pool of [`POOL_SIZE`] serializers plus
    /// the artificial peer and auth records.
    pub fn new(registry: &SerializerRegistry) -> Self {
        let pool: Vec<Serializer> = (0..POOL_SIZE)
            .map(|_| registry.create_unique(POOL_NAME_BASE))
            .collect();

        Dispatch {
            registry: registry.clone(),
            pool: pool.into(),
            artificial_peer: Arc::new(Peer::artificial()),
            artificial_auth: Arc::new(AuthCred::artificial()),
        }
    }

    /// The stand-in peer attached to unidentifiable requests.
    pub fn artificial_peer(&self) -> &Arc<Peer> {
        &self.artificial_peer
    }

    /// The stand-in credential record backing the artificial peer.
    ///
    /// Verifiers challenge with it when asked to authenticate the
    /// artificial peer; it can never be satisfied.
    pub fn artificial_auth(&self) -> &Arc<AuthCred> {
        &self.artificial_auth
    }

    /// Creates the distributor service.
    pub fn distributor(&self) -> Distributor {
        Distributor {
            registry: self.registry.clone(),
            pool: self.pool.clone(),
        }
    }

    /// Creates the peer identifier service running the given resolvers.
    pub fn identifier(&self, resolvers: Vec<Box<dyn PeerResolver>>, sink: Arc<dyn SecuritySink>) -> PeerIdentifier {
        PeerIdentifier::new(resolvers, self.artificial_peer.clone(), sink)
    }

    /// Creates the authenticator service around `verifier`.
    pub fn authenticator(&self, verifier: Arc<dyn CredentialVerifier>, sink: Arc<dyn SecuritySink>) -> Authenticator {
        Authenticator::new(verifier, sink)
    }

    /// Registers the three inbound services on `builder`.
    pub fn register(
        &self,
        builder: Builder,
        resolvers: Vec<Box<dyn PeerResolver>>,
        verifier: Arc<dyn CredentialVerifier>,
        sink: Arc<dyn SecuritySink>,
    ) -> Builder {
        builder
            .with_service(self.distributor())
            .with_service(self.identifier(resolvers, sink.clone()))
            .with_service(self.authenticator(verifier, sink))
    }

    pub(crate) fn pool(&self) -> &[Serializer] {
        &self.pool
    }
}

enum Target {
    /// Queue onto this serializer, attaching the peer if one is known.
    Queue(Serializer, Option<Arc<Peer>>),
    /// Orphan BYE/CANCEL: answer 481 statelessly.
    Reject,
    /// Overloaded and nothing pins the message: drop it silently.
    Shed,
}

/// The distributor service. See the module docs.
pub struct Distributor {
    registry: SerializerRegistry,
    pool: Arc<[Serializer]>,
}

impl Distributor {
    fn pooled(&self, call_id: &str, tag: Option<&str>) -> Serializer {
        self.pool[hash_bucket(call_id, tag)].clone()
    }

    /// Finds the dialog a message belongs to.
    fn dialog_for(&self, endpoint: &Endpoint, rx: &IncomingMessage) -> Option<Dialog> {
        let headers = &rx.headers;

        if rx.is_request() && rx.method() == SipMethod::Cancel && headers.to_tag().is_none() {
            // A CANCEL that carries no to-tag can only be matched through
            // the INVITE server transaction it cancels.
            let key = TsxKey::server(SipMethod::Invite, rx.branch());
            let tsx = endpoint.transactions().find(&key)?;
            return tsx.dialog();
        }

        let (local_tag, remote_tag) = if rx.is_request() {
            (headers.to_tag(), headers.from_tag())
        } else {
            (headers.from_tag(), headers.to_tag())
        };

        endpoint.dialogs().find(
            rx.call_id(),
            local_tag.map_or("", |tag| tag.as_ref()),
            remote_tag.map_or("", |tag| tag.as_ref()),
        )
    }

    fn resolve(&self, endpoint: &Endpoint, rx: &IncomingMessage) -> Target {
        let mut peer = None;

        if let Some(dialog) = self.dialog_for(endpoint, rx) {
            let (serializer, dialog_peer) = dialog.affinity();
            peer = dialog_peer;
            if let Some(serializer) = serializer {
                return Target::Queue(serializer, peer);
            }
        }

        if !rx.is_request() {
            // Route the response to whichever serializer sent the request,
            // if it still exists by name.
            let key = TsxKey::client(rx.headers.cseq.method, rx.branch());
            if let Some(tsx) = endpoint.transactions().find(&key) {
                if let Some(name) = tsx.last_serializer() {
                    if let Some(serializer) = self.registry.find(&name) {
                        return Target::Queue(serializer, peer);
                    }
                }
            }

            if self.registry.overloaded() {
                return Target::Shed;
            }
            return Target::Queue(self.pooled(rx.call_id(), rx.to_tag().map(|tag| tag.as_ref())), peer);
        }

        if matches!(rx.method(), SipMethod::Bye | SipMethod::Cancel) {
            return Target::Reject;
        }

        if self.registry.overloaded() {
            return Target::Shed;
        }

        Target::Queue(self.pooled(rx.call_id(), rx.from_tag().map(|tag| tag.as_ref())), peer)
    }

    async fn distribute(&self, endpoint: &Endpoint, rx: &IncomingMessage) -> Result<bool> {
        if !endpoint.is_fully_booted() {
            // Peer retransmission covers the startup window.
            log::debug!("Not fully booted; discarding {} from /{}", rx.describe(), rx.addr());
            return Ok(true);
        }

        match self.resolve(endpoint, rx) {
            Target::Queue(serializer, peer) => {
                let mut clone = rx.clone();
                if peer.is_some() {
                    clone.peer = peer;
                }

                let endpoint = endpoint.clone();
                if let Err(err) = serializer.push(distribute_task(endpoint, clone)) {
                    // The rejected task is dropped here, releasing the
                    // clone and its peer reference with it.
                    log::debug!("Discarding {} from /{}: {}", rx.describe(), rx.addr(), err);
                }
            }
            Target::Reject => {
                log::debug!("{} from /{} matches no dialog; replying 481", rx.describe(), rx.addr());
                if let Err(err) = endpoint
                    .respond_stateless(rx, StatusCode::CallOrTransactionDoesNotExist)
                    .await
                {
                    log::warn!("Failed to reply 481 to /{}: {}", rx.addr(), err);
                }
            }
            Target::Shed => {
                log::debug!("Overloaded; discarding {} from /{}", rx.describe(), rx.addr());
            }
        }

        Ok(true)
    }
}

#[async_trait::async_trait]
impl SipService for Distributor {
    fn name(&self) -> &str {
        DISTRIBUTOR_SERVICE
    }

    fn priority(&self) -> u32 {
        PRIORITY_TSX_LAYER - 6
    }

    async fn on_rx_request(&self, endpoint: &Endpoint, rx: &mut IncomingMessage) -> Result<bool> {
        self.distribute(endpoint, rx).await
    }

    async fn on_rx_response(&self, endpoint: &Endpoint, rx: &mut IncomingMessage) -> Result<bool> {
        self.distribute(endpoint, rx).await
    }

    async fn on_tx_request(&self, _endpoint: &Endpoint, tx: &mut OutgoingRequest) -> Result<()> {
        if let Some(current) = Serializer::current() {
            if !current.name().is_empty() {
                tx.record_serializer(current.name());
            }
        }

        Ok(())
    }
}

/// The task queued for every dispatched message.
///
/// Re-enters the pipeline right after the distributor so the identifier,
/// authenticator and application services all run in serialized context.
async fn distribute_task(endpoint: Endpoint, mut rx: IncomingMessage) {
    let handled = match endpoint.process_rx_data(&mut rx, Some(DISTRIBUTOR_SERVICE)).await {
        Ok(handled) => handled,
        Err(err) => {
            log::error!("Failed to process {} from /{}: {}", rx.describe(), rx.addr(), err);
            true
        }
    };

    // A response is never owed to an ACK.
    if !handled && rx.is_request() && !rx.method().is_ack() {
        if let Err(err) = endpoint.respond_stateless(&rx, StatusCode::NotImplemented).await {
            log::warn!("Failed to reply 501 to /{}: {}", rx.addr(), err);
        }
    }

    // Dropping rx releases the peer reference and the cloned message.
}
