//! The header fields every SIP message must carry.

use std::fmt;
use std::net::IpAddr;

use util::ArcStr;

use super::SipMethod;
use crate::transport::TransportKind;

/// The topmost `Via` header of a message.
#[derive(Debug, Clone)]
pub struct Via {
    /// The transport the sender used.
    pub kind: TransportKind,
    /// The sent-by host and port.
    pub sent_by: ArcStr,
    /// The branch parameter identifying the transaction.
    pub branch: ArcStr,
    /// The source address of the packet, per RFC 3581.
    pub received: Option<IpAddr>,
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {};branch={}", self.kind, self.sent_by, self.branch)?;
        if let Some(received) = self.received {
            write!(f, ";received={}", received)?;
        }
        Ok(())
    }
}

/// A `From` or `To` header: URI plus the optional tag parameter.
#[derive(Debug, Clone)]
pub struct NameAddr {
    /// The address URI.
    pub uri: ArcStr,
    /// The tag parameter, if present.
    pub tag: Option<ArcStr>,
}

impl NameAddr {
    /// Constructs a `NameAddr` without a tag.
    pub fn new(uri: &str) -> Self {
        NameAddr {
            uri: uri.into(),
            tag: None,
        }
    }

    /// Constructs a `NameAddr` carrying a tag.
    pub fn with_tag(uri: &str, tag: &str) -> Self {
        NameAddr {
            uri: uri.into(),
            tag: Some(tag.into()),
        }
    }
}

impl fmt::Display for NameAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.uri)?;
        if let Some(tag) = &self.tag {
            write!(f, ";tag={}", tag)?;
        }
        Ok(())
    }
}

/// The `CSeq` header.
#[derive(Debug, Clone, Copy)]
pub struct CSeq {
    /// The sequence number.
    pub seq: u32,
    /// The method the sequence number counts.
    pub method: SipMethod,
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

/// The headers every incoming message is guaranteed to carry once the
/// parser accepted it: topmost `Via`, `From`, `To`, `Call-ID` and `CSeq`.
#[derive(Debug, Clone)]
pub struct MandatoryHeaders {
    /// The topmost Via header as found in the message.
    pub via: Via,
    /// The From header found in the message.
    pub from: NameAddr,
    /// The To header found in the message.
    pub to: NameAddr,
    /// The Call-ID header found in the message.
    pub call_id: ArcStr,
    /// The CSeq header as found in the message.
    pub cseq: CSeq,
}

impl MandatoryHeaders {
    /// Returns the From tag, if present.
    pub fn from_tag(&self) -> Option<&ArcStr> {
        self.from.tag.as_ref()
    }

    /// Returns the To tag, if present.
    pub fn to_tag(&self) -> Option<&ArcStr> {
        self.to.tag.as_ref()
    }
}
