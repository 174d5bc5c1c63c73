//! Configured SIP peers and their credential records.
//!
//! A [`Peer`] is the credential-bearing account a request is attributed to;
//! resolution itself is pluggable through [`PeerResolver`] so deployments
//! can match by user part, source address, header contents or anything
//! else the configuration store supports.

use std::sync::Arc;

use util::ArcStr;

use crate::transport::IncomingMessage;

/// The digest realm advertised when a credential record does not name one.
pub const DEFAULT_REALM: &str = "asterisk";

/// A credential record referenced from a peer's inbound auth list.
#[derive(Debug, Clone)]
pub struct AuthCred {
    /// The record name peers reference.
    pub name: ArcStr,
    /// The account username.
    pub username: ArcStr,
    /// The account password.
    pub password: ArcStr,
    /// The digest realm to challenge with.
    pub realm: ArcStr,
    artificial: bool,
}

impl AuthCred {
    /// Creates a credential record.
    pub fn new(name: &str, username: &str, password: &str, realm: &str) -> Self {
        AuthCred {
            name: name.into(),
            username: username.into(),
            password: password.into(),
            realm: realm.into(),
            artificial: false,
        }
    }

    /// The stand-in credential used to challenge unidentified traffic.
    ///
    /// Username and password are empty on purpose: no Authorization header
    /// can ever satisfy it, so the challenge can never be answered.
    pub(crate) fn artificial() -> Self {
        AuthCred {
            name: "artificial".into(),
            username: "".into(),
            password: "".into(),
            realm: DEFAULT_REALM.into(),
            artificial: true,
        }
    }

    /// Returns `true` for the artificial stand-in record.
    pub fn is_artificial(&self) -> bool {
        self.artificial
    }
}

/// A configured SIP peer.
#[derive(Debug)]
pub struct Peer {
    name: ArcStr,
    inbound_auth: Vec<ArcStr>,
    artificial: bool,
}

impl Peer {
    /// Creates a peer named `name` requiring the given credential records
    /// for inbound requests. An empty list means the peer is trusted
    /// without authentication.
    pub fn new(name: &str, inbound_auth: Vec<ArcStr>) -> Self {
        Peer {
            name: name.into(),
            inbound_auth,
            artificial: false,
        }
    }

    /// The stand-in peer attached to requests no resolver could identify.
    ///
    /// Its inbound auth list holds a single sentinel entry that is never
    /// looked up; it exists so that [`requires_authentication`] holds and
    /// every unidentified request gets challenged instead of reaching the
    /// application. Do not remove the sentinel.
    ///
    /// [`requires_authentication`]: Peer::requires_authentication
    pub(crate) fn artificial() -> Self {
        Peer {
            name: "artificial".into(),
            inbound_auth: vec!["artificial".into()],
            artificial: true,
        }
    }

    /// Returns the peer name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Returns the names of the credential records guarding this peer.
    pub fn inbound_auth(&self) -> &[ArcStr] {
        &self.inbound_auth
    }

    /// Returns `true` if inbound requests from this peer must authenticate.
    pub fn requires_authentication(&self) -> bool {
        !self.inbound_auth.is_empty()
    }

    /// Returns `true` for the artificial stand-in peer.
    pub fn is_artificial(&self) -> bool {
        self.artificial
    }
}

/// Resolves the peer an incoming request originates from.
///
/// Resolvers are consulted in registration order; the first one returning
/// a peer wins.
#[async_trait::async_trait]
pub trait PeerResolver: Sync + Send + 'static {
    /// Returns the resolver name.
    fn name(&self) -> &str;

    /// Attempts to identify the peer behind `rx`.
    async fn identify(&self, rx: &IncomingMessage) -> Option<Arc<Peer>>;
}
