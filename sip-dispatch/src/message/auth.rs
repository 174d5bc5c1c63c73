//! Digest challenge data carried by a 401 response.

use std::fmt;

use rand::Rng;
use util::ArcStr;

/// The value of a `WWW-Authenticate` header for the Digest scheme.
///
/// The distributor only ever ships a challenge out; parsing the matching
/// `Authorization` credential is the verifier's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    /// The protection realm.
    pub realm: ArcStr,
    /// The server nonce.
    pub nonce: ArcStr,
    /// The opaque value, returned unchanged by the client.
    pub opaque: Option<ArcStr>,
    /// Whether the previous nonce was stale.
    pub stale: bool,
    /// The hash algorithm, when not the default MD5.
    pub algorithm: Option<ArcStr>,
    /// The quality of protection offered.
    pub qop: Option<ArcStr>,
}

impl DigestChallenge {
    /// Creates a challenge for `realm` with a freshly generated nonce.
    pub fn new(realm: &str) -> Self {
        let mut rng = rand::rng();
        let nonce = format!("{:08x}{:08x}", rng.random::<u32>(), rng.random::<u32>());

        DigestChallenge {
            realm: realm.into(),
            nonce: nonce.into(),
            opaque: None,
            stale: false,
            algorithm: None,
            qop: None,
        }
    }
}

impl fmt::Display for DigestChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest realm=\"{}\", nonce=\"{}\"", self.realm, self.nonce)?;
        if let Some(opaque) = &self.opaque {
            write!(f, ", opaque=\"{}\"", opaque)?;
        }
        if self.stale {
            write!(f, ", stale=true")?;
        }
        if let Some(algorithm) = &self.algorithm {
            write!(f, ", algorithm={}", algorithm)?;
        }
        if let Some(qop) = &self.qop {
            write!(f, ", qop=\"{}\"", qop)?;
        }
        Ok(())
    }
}
