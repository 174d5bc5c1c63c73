//! Security event reporting.
//!
//! Authentication outcomes and identification failures are operationally
//! interesting beyond the log stream; deployments feed them into fail2ban
//! style tooling. The dispatch services report them through a
//! [`SecuritySink`] so the destination stays pluggable; [`LogSink`] is the
//! default and writes them to the log.

use std::net::{IpAddr, SocketAddr};

use util::ArcStr;

/// A security-relevant event observed on the inbound path.
#[derive(Debug, Clone)]
pub enum SecurityEvent {
    /// A request could not be attributed to any configured peer.
    InvalidPeer {
        /// The From URI the request carried.
        from: ArcStr,
        /// The Call-ID of the request.
        call_id: ArcStr,
        /// Where the request came from.
        addr: SocketAddr,
    },
    /// One source keeps sending unidentifiable requests.
    RequestFlood {
        /// The offending source address.
        addr: IpAddr,
        /// Unidentified requests seen within the observation period.
        count: u32,
    },
    /// A challenge was sent to a peer that must authenticate.
    ChallengeSent {
        /// The challenged peer.
        peer: ArcStr,
        /// Where the request came from.
        addr: SocketAddr,
    },
    /// A challenge response verified successfully.
    SuccessfulAuth {
        /// The authenticated peer.
        peer: ArcStr,
        /// Where the request came from.
        addr: SocketAddr,
    },
    /// A challenge response failed verification.
    FailedChallenge {
        /// The peer that failed.
        peer: ArcStr,
        /// Where the request came from.
        addr: SocketAddr,
    },
}

/// Destination for [`SecurityEvent`]s.
pub trait SecuritySink: Sync + Send + 'static {
    /// Reports one event. Must not block.
    fn report(&self, event: SecurityEvent);
}

/// The default sink: events become log records.
pub struct LogSink;

impl SecuritySink for LogSink {
    fn report(&self, event: SecurityEvent) {
        match event {
            SecurityEvent::InvalidPeer { from, call_id, addr } => {
                log::debug!(
                    "Security event: invalid peer, from='{}' addr={} callid={}",
                    from,
                    addr,
                    call_id
                );
            }
            SecurityEvent::RequestFlood { addr, count } => {
                log::warn!(
                    "Security event: {} unidentified requests from '{}' within the observation period",
                    count,
                    addr
                );
            }
            SecurityEvent::ChallengeSent { peer, addr } => {
                log::debug!("Security event: challenge sent to '{}' at {}", peer, addr);
            }
            SecurityEvent::SuccessfulAuth { peer, addr } => {
                log::debug!("Security event: successful auth for '{}' at {}", peer, addr);
            }
            SecurityEvent::FailedChallenge { peer, addr } => {
                log::debug!("Security event: failed challenge response from '{}' at {}", peer, addr);
            }
        }
    }
}
