//! Shared fixtures for the crate's tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use util::ArcStr;

use crate::auth::{CheckResult, CredentialVerifier};
use crate::events::{SecurityEvent, SecuritySink};
use crate::message::{CSeq, DigestChallenge, MandatoryHeaders, NameAddr, Request, Response, SipMethod, SipMsg, StatusCode, Via};
use crate::peer::{Peer, PeerResolver};
use crate::serializer::Serializer;
use crate::service::SipService;
use crate::transport::{IncomingMessage, OutgoingRequest, OutgoingResponse, Packet, Transport, TransportKind};
use crate::{Endpoint, Result};

/// Default source address test messages claim to come from.
pub const SRC_ADDR: &str = "203.0.113.10:5060";

/// A mock transport, for testing purposes.
#[derive(Clone)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<(Vec<u8>, SocketAddr)>>>,
    addr: SocketAddr,
    kind: TransportKind,
}

impl MockTransport {
    pub fn new_udp() -> Self {
        MockTransport {
            sent: Default::default(),
            addr: "127.0.0.1:5060".parse().unwrap(),
            kind: TransportKind::Udp,
        }
    }

    /// A shareable `dyn Transport` handle backed by the same sent log.
    pub fn handle(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_sent_text(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        sent.last().map(|(buf, _)| String::from_utf8_lossy(buf).into_owned())
    }

    pub fn sent_texts(&self) -> Vec<String> {
        let sent = self.sent.lock().unwrap();
        sent.iter().map(|(buf, _)| String::from_utf8_lossy(buf).into_owned()).collect()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, buf: &[u8], addr: &SocketAddr) -> Result<usize> {
        self.sent.lock().unwrap().push((buf.to_vec(), *addr));
        Ok(buf.len())
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }
}

fn headers(method: SipMethod, call_id: &str, from_tag: &str, to_tag: Option<&str>) -> MandatoryHeaders {
    MandatoryHeaders {
        via: Via {
            kind: TransportKind::Udp,
            sent_by: SRC_ADDR.into(),
            branch: crate::generate_branch(),
            received: None,
        },
        from: NameAddr::with_tag("sip:alice@atlanta.com", from_tag),
        to: match to_tag {
            Some(tag) => NameAddr::with_tag("sip:bob@biloxi.com", tag),
            None => NameAddr::new("sip:bob@biloxi.com"),
        },
        call_id: call_id.into(),
        cseq: CSeq { seq: 1, method },
    }
}

/// Builds an incoming request claiming to come from `addr`.
pub fn rx_request_at(
    method: SipMethod,
    call_id: &str,
    from_tag: &str,
    to_tag: Option<&str>,
    addr: SocketAddr,
    transport: Arc<dyn Transport>,
) -> IncomingMessage {
    IncomingMessage {
        msg: SipMsg::Request(Request {
            method,
            target: "sip:bob@biloxi.com".into(),
        }),
        headers: headers(method, call_id, from_tag, to_tag),
        packet: Packet::new(Bytes::new(), addr),
        transport,
        peer: None,
    }
}

/// Builds an incoming request from the default source address.
pub fn rx_request(
    method: SipMethod,
    call_id: &str,
    from_tag: &str,
    to_tag: Option<&str>,
    transport: Arc<dyn Transport>,
) -> IncomingMessage {
    rx_request_at(method, call_id, from_tag, to_tag, SRC_ADDR.parse().unwrap(), transport)
}

/// Builds an incoming response.
pub fn rx_response(
    status: StatusCode,
    cseq_method: SipMethod,
    call_id: &str,
    from_tag: &str,
    to_tag: Option<&str>,
    transport: Arc<dyn Transport>,
) -> IncomingMessage {
    IncomingMessage {
        msg: SipMsg::Response(Response { status }),
        headers: headers(cseq_method, call_id, from_tag, to_tag),
        packet: Packet::new(Bytes::new(), SRC_ADDR.parse().unwrap()),
        transport,
        peer: None,
    }
}

/// Builds an outgoing request with the given branch.
pub fn tx_request(method: SipMethod, call_id: &str, branch: &ArcStr, transport: Arc<dyn Transport>) -> OutgoingRequest {
    let mut headers = headers(method, call_id, "tx-from-tag", None);
    headers.via.branch = branch.clone();

    OutgoingRequest {
        msg: Request {
            method,
            target: "sip:bob@biloxi.com".into(),
        },
        headers,
        addr: SRC_ADDR.parse().unwrap(),
        transport,
        serializer_name: None,
    }
}

/// A peer whose inbound requests must authenticate.
pub fn secured_peer(name: &str) -> Arc<Peer> {
    Arc::new(Peer::new(name, vec!["auth1".into()]))
}

/// A peer trusted without authentication.
pub fn open_peer(name: &str) -> Arc<Peer> {
    Arc::new(Peer::new(name, vec![]))
}

/// A [`SecuritySink`] that records everything it is given.
pub struct RecordingSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SecuritySink for RecordingSink {
    fn report(&self, event: SecurityEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A [`PeerResolver`] returning a fixed (but settable) answer.
#[derive(Clone)]
pub struct StaticResolver {
    name: &'static str,
    peer: Arc<Mutex<Option<Arc<Peer>>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticResolver {
    pub fn some(name: &'static str, peer: Arc<Peer>) -> Self {
        StaticResolver {
            name,
            peer: Arc::new(Mutex::new(Some(peer))),
            calls: Default::default(),
        }
    }

    pub fn none(name: &'static str) -> Self {
        StaticResolver {
            name,
            peer: Arc::new(Mutex::new(None)),
            calls: Default::default(),
        }
    }

    pub fn set_peer(&self, peer: Option<Arc<Peer>>) {
        *self.peer.lock().unwrap() = peer;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PeerResolver for StaticResolver {
    fn name(&self) -> &str {
        self.name
    }

    async fn identify(&self, _rx: &IncomingMessage) -> Option<Arc<Peer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.peer.lock().unwrap().clone()
    }
}

/// A [`CredentialVerifier`] returning a fixed verdict.
#[derive(Clone)]
pub struct StaticVerifier {
    verdict: CheckResult,
    calls: Arc<AtomicUsize>,
    peers_seen: Arc<Mutex<Vec<ArcStr>>>,
}

impl StaticVerifier {
    pub fn new(verdict: CheckResult) -> Self {
        StaticVerifier {
            verdict,
            calls: Default::default(),
            peers_seen: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peers_seen(&self) -> Vec<ArcStr> {
        self.peers_seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CredentialVerifier for StaticVerifier {
    async fn check(&self, peer: &Arc<Peer>, _rx: &IncomingMessage, response: &mut OutgoingResponse) -> CheckResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.peers_seen.lock().unwrap().push(peer.name().clone());

        if matches!(self.verdict, CheckResult::Challenge | CheckResult::Failed) {
            response.challenge = Some(DigestChallenge::new("asterisk"));
        }

        self.verdict
    }
}

/// What [`AppProbe`] saw for one dispatched message.
#[derive(Debug)]
pub struct ProbeReport {
    pub serializer: Option<String>,
    pub peer: Option<String>,
    pub method: SipMethod,
    pub cseq: u32,
    pub is_request: bool,
}

/// An application-priority service that records every message reaching it
/// without consuming anything.
pub struct AppProbe {
    pub tx: mpsc::UnboundedSender<ProbeReport>,
}

impl AppProbe {
    fn report(&self, rx: &IncomingMessage) {
        let _ = self.tx.send(ProbeReport {
            serializer: Serializer::current().map(|serializer| serializer.name().to_string()),
            peer: rx.peer.as_ref().map(|peer| peer.name().to_string()),
            method: rx.method(),
            cseq: rx.headers.cseq.seq,
            is_request: rx.is_request(),
        });
    }
}

#[async_trait::async_trait]
impl SipService for AppProbe {
    fn name(&self) -> &str {
        "app-probe"
    }

    async fn on_rx_request(&self, _: &Endpoint, rx: &mut IncomingMessage) -> Result<bool> {
        self.report(rx);
        Ok(false)
    }

    async fn on_rx_response(&self, _: &Endpoint, rx: &mut IncomingMessage) -> Result<bool> {
        self.report(rx);
        Ok(false)
    }
}

/// Pushes a sentinel task and waits for it, guaranteeing every task queued
/// before it has finished.
pub async fn drain(serializer: &Serializer) {
    let (tx, rx) = oneshot::channel();
    serializer
        .push(async move {
            let _ = tx.send(());
        })
        .expect("push to a live serializer");
    timeout(Duration::from_secs(1), rx)
        .await
        .expect("serializer did not drain in time")
        .expect("sentinel task dropped");
}
