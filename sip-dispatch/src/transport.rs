//! Transport-facing message containers.
//!
//! The actual sockets live upstream; this module defines the abstraction the
//! dispatch stage sees: a [`Transport`] to send responses through, the
//! [`Packet`] a message arrived in, and the incoming/outgoing containers
//! that carry a message plus its routing annotations.

use std::fmt;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};
use util::ArcStr;

use crate::error::Result;
use crate::message::{DigestChallenge, MandatoryHeaders, Request, SipMethod, SipMsg, StatusCode};
use crate::peer::Peer;

/// This trait represents a abstraction over a SIP transport implementation.
#[async_trait::async_trait]
pub trait Transport: Sync + Send + 'static {
    /// Sends a buffer to the specified remote socket address.
    ///
    /// Returns the number of bytes sent or an I/O error.
    async fn send(&self, buf: &[u8], addr: &SocketAddr) -> Result<usize>;

    /// Returns the transport kind (e.g., UDP, TCP, TLS).
    fn kind(&self) -> TransportKind;

    /// Returns the local socket address bound to this transport.
    fn addr(&self) -> SocketAddr;

    /// Returns `true` if the transport is reliable (e.g., TCP or TLS).
    fn reliable(&self) -> bool {
        false
    }
}

/// The transport protocol a message travelled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Plain UDP datagrams.
    Udp,
    /// A TCP stream.
    Tcp,
    /// TLS over TCP.
    Tls,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::Udp => "UDP",
            TransportKind::Tcp => "TCP",
            TransportKind::Tls => "TLS",
        };
        write!(f, "{}", s)
    }
}

/// This type represents a SIP packet.
#[derive(Clone)]
pub struct Packet {
    /// The packet payload.
    pub payload: Bytes,
    /// The address of the sender.
    pub addr: SocketAddr,
    /// The time the packet was received.
    pub time: SystemTime,
}

impl Packet {
    /// Creates a new `Packet` received now.
    pub fn new(payload: Bytes, addr: SocketAddr) -> Self {
        Packet {
            payload,
            addr,
            time: SystemTime::now(),
        }
    }
}

/// This trait is used to convert a type into a byte buffer.
pub trait ToBytes: Sized {
    /// Converts the type into a byte buffer.
    fn to_bytes(&self) -> Result<Bytes>;
}

/// An received SIP message on its way through the inbound pipeline.
///
/// Beyond the parsed message itself this carries the annotations the
/// pipeline accumulates: the identified [`Peer`] is attached before the
/// message is handed to a serializer and dropped with the message once the
/// consuming task finishes.
#[derive(Clone)]
pub struct IncomingMessage {
    /// The parsed message.
    pub msg: SipMsg,
    /// The headers extracted from the message.
    pub headers: MandatoryHeaders,
    /// The packet that contained the message.
    pub packet: Packet,
    /// The transport used to receive the message.
    pub transport: Arc<dyn Transport>,
    /// The peer this message was identified as coming from, if any.
    pub peer: Option<Arc<Peer>>,
}

impl IncomingMessage {
    /// Returns `true` if this message is a request.
    pub fn is_request(&self) -> bool {
        self.msg.is_request()
    }

    /// Returns the request method, or the CSeq method for a response.
    pub fn method(&self) -> SipMethod {
        match &self.msg {
            SipMsg::Request(request) => request.method,
            SipMsg::Response(_) => self.headers.cseq.method,
        }
    }

    /// Returns the `Call-ID` of the message.
    pub fn call_id(&self) -> &ArcStr {
        &self.headers.call_id
    }

    /// Returns the From tag, if present.
    pub fn from_tag(&self) -> Option<&ArcStr> {
        self.headers.from_tag()
    }

    /// Returns the To tag, if present.
    pub fn to_tag(&self) -> Option<&ArcStr> {
        self.headers.to_tag()
    }

    /// Returns the topmost Via branch.
    pub fn branch(&self) -> &ArcStr {
        &self.headers.via.branch
    }

    /// Gets the source socket address of the packet.
    pub fn addr(&self) -> &SocketAddr {
        &self.packet.addr
    }

    /// A short human-readable description for log lines.
    pub fn describe(&self) -> String {
        match &self.msg {
            SipMsg::Request(request) => format!("Request {}", request.method),
            SipMsg::Response(response) => format!("Response ({})", response.status),
        }
    }
}

/// This type represents an outgoing SIP response.
pub struct OutgoingResponse {
    /// The response status.
    pub status: StatusCode,
    /// The headers mirrored from the request being answered.
    pub headers: MandatoryHeaders,
    /// An authentication challenge to ship in the response, if any.
    pub challenge: Option<DigestChallenge>,
    /// The address to send the response to.
    pub addr: SocketAddr,
    /// The transport to send the response through.
    pub transport: Arc<dyn Transport>,
}

impl ToBytes for OutgoingResponse {
    fn to_bytes(&self) -> Result<Bytes> {
        let buf = BytesMut::with_capacity(800);
        let mut buf_writer = buf.writer();

        // Status line.
        write!(buf_writer, "SIP/2.0 {}\r\n", self.status)?;

        // Headers.
        write!(buf_writer, "Via: {}\r\n", self.headers.via)?;
        write!(buf_writer, "From: {}\r\n", self.headers.from)?;
        write!(buf_writer, "To: {}\r\n", self.headers.to)?;
        write!(buf_writer, "Call-ID: {}\r\n", self.headers.call_id)?;
        write!(buf_writer, "CSeq: {}\r\n", self.headers.cseq)?;
        if let Some(challenge) = &self.challenge {
            write!(buf_writer, "WWW-Authenticate: {}\r\n", challenge)?;
        }
        write!(buf_writer, "Content-Length: 0\r\n")?;
        write!(buf_writer, "\r\n")?;

        Ok(buf_writer.into_inner().freeze())
    }
}

/// This type represents an outbound SIP request.
pub struct OutgoingRequest {
    /// The request line.
    pub msg: Request,
    /// The headers of the request.
    pub headers: MandatoryHeaders,
    /// The address to send the request to.
    pub addr: SocketAddr,
    /// The transport to use for sending the request.
    pub transport: Arc<dyn Transport>,
    /// The name of the serializer whose task produced this request.
    ///
    /// Only the name is kept, never the serializer itself, so the serializer
    /// can be released while the transaction that retains this request
    /// lingers. An incoming response looks the name up again and falls back
    /// to bucket dispatch when no serializer by that name exists anymore.
    pub serializer_name: Option<ArcStr>,
}

impl OutgoingRequest {
    /// Records the name of the serializer sending this request.
    ///
    /// Re-recording the name already stored is a no-op and does not
    /// allocate.
    pub fn record_serializer(&mut self, name: &ArcStr) {
        if self.serializer_name.as_ref() != Some(name) {
            self.serializer_name = Some(name.clone());
        }
    }
}

impl ToBytes for OutgoingRequest {
    fn to_bytes(&self) -> Result<Bytes> {
        let buf = BytesMut::with_capacity(800);
        let mut buf_writer = buf.writer();

        // Request line.
        write!(buf_writer, "{} {} SIP/2.0\r\n", self.msg.method, self.msg.target)?;

        // Headers.
        write!(buf_writer, "Via: {}\r\n", self.headers.via)?;
        write!(buf_writer, "From: {}\r\n", self.headers.from)?;
        write!(buf_writer, "To: {}\r\n", self.headers.to)?;
        write!(buf_writer, "Call-ID: {}\r\n", self.headers.call_id)?;
        write!(buf_writer, "CSeq: {}\r\n", self.headers.cseq)?;
        write!(buf_writer, "Content-Length: 0\r\n")?;
        write!(buf_writer, "\r\n")?;

        Ok(buf_writer.into_inner().freeze())
    }
}
