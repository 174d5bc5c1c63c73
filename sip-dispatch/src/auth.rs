//! The authenticator service.
//!
//! Runs on the serializer, after the peer identifier, so every non-ACK
//! request it sees carries a peer. Peers whose inbound auth list is empty
//! pass untouched; everything else is put to the credential verifier, and
//! the verdict decides between challenging, accepting, rejecting and
//! bailing out with a 500.

use std::sync::Arc;

use crate::events::{SecurityEvent, SecuritySink};
use crate::message::StatusCode;
use crate::peer::Peer;
use crate::service::{SipService, PRIORITY_APPLICATION};
use crate::transport::{IncomingMessage, OutgoingResponse};
use crate::{Endpoint, Result};

/// Registered name of the authenticator service.
pub const AUTHENTICATOR_SERVICE: &str = "authenticator";

/// Verdict of a [`CredentialVerifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    /// No usable credentials presented; the prepared 401 should be sent
    /// with its challenge populated.
    Challenge,
    /// The presented credentials verified; processing continues.
    Success,
    /// The presented credentials failed; the prepared 401 should be sent.
    Failed,
    /// The verifier itself failed; answer 500.
    Error,
}

/// Verifies the credentials of an incoming request.
///
/// The verifier receives the prepared empty 401 and is expected to fill in
/// its challenge when the verdict calls for one.
#[async_trait::async_trait]
pub trait CredentialVerifier: Sync + Send + 'static {
    /// Checks `rx` against `peer`'s credential records.
    async fn check(&self, peer: &Arc<Peer>, rx: &IncomingMessage, response: &mut OutgoingResponse) -> CheckResult;
}

/// The authenticator service. See the module docs.
pub struct Authenticator {
    verifier: Arc<dyn CredentialVerifier>,
    sink: Arc<dyn SecuritySink>,
}

impl Authenticator {
    pub(crate) fn new(verifier: Arc<dyn CredentialVerifier>, sink: Arc<dyn SecuritySink>) -> Self {
        Authenticator { verifier, sink }
    }
}

#[async_trait::async_trait]
impl SipService for Authenticator {
    fn name(&self) -> &str {
        AUTHENTICATOR_SERVICE
    }

    fn priority(&self) -> u32 {
        PRIORITY_APPLICATION - 2
    }

    async fn on_rx_request(&self, endpoint: &Endpoint, rx: &mut IncomingMessage) -> Result<bool> {
        // SIP allows no response to an ACK, a challenge included.
        if rx.method().is_ack() {
            return Ok(false);
        }

        let Some(peer) = rx.peer.clone() else {
            return Ok(false);
        };
        if !peer.requires_authentication() {
            return Ok(false);
        }

        let mut response = endpoint.create_response(rx, StatusCode::Unauthorized);

        match self.verifier.check(&peer, rx, &mut response).await {
            CheckResult::Challenge => {
                endpoint.send_response(&response).await?;
                self.sink.report(SecurityEvent::ChallengeSent {
                    peer: peer.name().clone(),
                    addr: *rx.addr(),
                });
                Ok(true)
            }
            CheckResult::Success => {
                self.sink.report(SecurityEvent::SuccessfulAuth {
                    peer: peer.name().clone(),
                    addr: *rx.addr(),
                });
                Ok(false)
            }
            CheckResult::Failed => {
                endpoint.send_response(&response).await?;
                self.sink.report(SecurityEvent::FailedChallenge {
                    peer: peer.name().clone(),
                    addr: *rx.addr(),
                });
                Ok(true)
            }
            CheckResult::Error => {
                log::warn!("Internal error authenticating request from '{}'", peer.name());
                endpoint.respond_stateless(rx, StatusCode::ServerInternalError).await?;
                self.sink.report(SecurityEvent::FailedChallenge {
                    peer: peer.name().clone(),
                    addr: *rx.addr(),
                });
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SipMethod;
    use crate::test_utils::{open_peer, rx_request, secured_peer, MockTransport, RecordingSink, StaticVerifier};

    fn authenticator(verdict: CheckResult, sink: Arc<RecordingSink>) -> (Authenticator, StaticVerifier) {
        let verifier = StaticVerifier::new(verdict);
        (Authenticator::new(Arc::new(verifier.clone()), sink), verifier)
    }

    #[tokio::test]
    async fn ack_is_never_challenged() {
        let sink = RecordingSink::new();
        let (service, verifier) = authenticator(CheckResult::Challenge, sink.clone());
        let endpoint = Endpoint::builder().build();
        let transport = MockTransport::new_udp();

        let mut rx = rx_request(SipMethod::Ack, "cid", "f1", Some("t1"), transport.handle());
        rx.peer = Some(secured_peer("alice"));

        let handled = service.on_rx_request(&endpoint, &mut rx).await.unwrap();

        assert!(!handled);
        assert_eq!(verifier.calls(), 0);
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn trusted_peer_passes_without_a_check() {
        let sink = RecordingSink::new();
        let (service, verifier) = authenticator(CheckResult::Challenge, sink.clone());
        let endpoint = Endpoint::builder().build();
        let transport = MockTransport::new_udp();

        let mut rx = rx_request(SipMethod::Invite, "cid", "f1", None, transport.handle());
        rx.peer = Some(open_peer("trunk-provider"));

        let handled = service.on_rx_request(&endpoint, &mut rx).await.unwrap();

        assert!(!handled);
        assert_eq!(verifier.calls(), 0);
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn challenge_verdict_sends_the_401() {
        let sink = RecordingSink::new();
        let (service, verifier) = authenticator(CheckResult::Challenge, sink.clone());
        let endpoint = Endpoint::builder().build();
        let transport = MockTransport::new_udp();

        let mut rx = rx_request(SipMethod::Invite, "cid", "f1", None, transport.handle());
        rx.peer = Some(secured_peer("alice"));

        let handled = service.on_rx_request(&endpoint, &mut rx).await.unwrap();

        assert!(handled);
        assert_eq!(verifier.calls(), 1);
        let sent = transport.last_sent_text().unwrap();
        assert!(sent.starts_with("SIP/2.0 401 Unauthorized"));
        assert!(sent.contains("WWW-Authenticate: Digest realm="));
        assert_matches!(sink.events()[..], [SecurityEvent::ChallengeSent { .. }]);
    }

    #[tokio::test]
    async fn success_verdict_lets_the_request_through() {
        let sink = RecordingSink::new();
        let (service, _verifier) = authenticator(CheckResult::Success, sink.clone());
        let endpoint = Endpoint::builder().build();
        let transport = MockTransport::new_udp();

        let mut rx = rx_request(SipMethod::Invite, "cid", "f1", None, transport.handle());
        rx.peer = Some(secured_peer("alice"));

        let handled = service.on_rx_request(&endpoint, &mut rx).await.unwrap();

        assert!(!handled);
        assert_eq!(transport.sent_count(), 0);
        assert_matches!(sink.events()[..], [SecurityEvent::SuccessfulAuth { .. }]);
    }

    #[tokio::test]
    async fn failed_verdict_sends_the_401() {
        let sink = RecordingSink::new();
        let (service, _verifier) = authenticator(CheckResult::Failed, sink.clone());
        let endpoint = Endpoint::builder().build();
        let transport = MockTransport::new_udp();

        let mut rx = rx_request(SipMethod::Invite, "cid", "f1", None, transport.handle());
        rx.peer = Some(secured_peer("alice"));

        let handled = service.on_rx_request(&endpoint, &mut rx).await.unwrap();

        assert!(handled);
        assert!(transport.last_sent_text().unwrap().starts_with("SIP/2.0 401"));
        assert_matches!(sink.events()[..], [SecurityEvent::FailedChallenge { .. }]);
    }

    #[tokio::test]
    async fn error_verdict_answers_500() {
        let sink = RecordingSink::new();
        let (service, _verifier) = authenticator(CheckResult::Error, sink.clone());
        let endpoint = Endpoint::builder().build();
        let transport = MockTransport::new_udp();

        let mut rx = rx_request(SipMethod::Invite, "cid", "f1", None, transport.handle());
        rx.peer = Some(secured_peer("alice"));

        let handled = service.on_rx_request(&endpoint, &mut rx).await.unwrap();

        assert!(handled);
        let sent = transport.last_sent_text().unwrap();
        assert!(sent.starts_with("SIP/2.0 500 Server Internal Error"));
        assert!(!sent.contains("WWW-Authenticate"));
        assert_matches!(sink.events()[..], [SecurityEvent::FailedChallenge { .. }]);
    }
}
