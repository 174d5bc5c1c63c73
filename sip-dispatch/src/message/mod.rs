//! SIP message model.
//!
//! Only the slice of a parsed message that the dispatch stage inspects is
//! modeled here. The wire parser lives upstream and hands over owned data;
//! nothing in this module touches raw packet bytes.

mod auth;
mod headers;

pub use auth::DigestChallenge;
pub use headers::{CSeq, MandatoryHeaders, NameAddr, Via};

use std::fmt;

use enum_as_inner::EnumAsInner;
use util::ArcStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// An SIP Method.
pub enum SipMethod {
    /// SIP INVITE Method.
    Invite,
    /// SIP ACK Method.
    Ack,
    /// SIP BYE Method.
    Bye,
    /// SIP CANCEL Method.
    Cancel,
    /// SIP REGISTER Method.
    Register,
    /// SIP OPTIONS Method.
    Options,
    /// SIP INFO Method.
    Info,
    /// SIP NOTIFY Method.
    Notify,
    /// SIP SUBSCRIBE Method.
    Subscribe,
    /// SIP UPDATE Method.
    Update,
    /// SIP REFER Method.
    Refer,
    /// SIP MESSAGE Method.
    Message,
    /// An unknown SIP method.
    Unknown,
}

impl SipMethod {
    /// Returns the string representation of a method.
    #[inline(always)]
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Bye => "BYE",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Register => "REGISTER",
            SipMethod::Options => "OPTIONS",
            SipMethod::Info => "INFO",
            SipMethod::Notify => "NOTIFY",
            SipMethod::Subscribe => "SUBSCRIBE",
            SipMethod::Update => "UPDATE",
            SipMethod::Refer => "REFER",
            SipMethod::Message => "MESSAGE",
            SipMethod::Unknown => "UNKNOWN-SipMethod",
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The subset of SIP status codes this stage emits or routes on.
pub enum StatusCode {
    /// 100 Trying.
    Trying,
    /// 180 Ringing.
    Ringing,
    /// 200 OK.
    Ok,
    /// 401 Unauthorized.
    Unauthorized,
    /// 481 Call/Transaction Does Not Exist.
    CallOrTransactionDoesNotExist,
    /// 500 Server Internal Error.
    ServerInternalError,
    /// 501 Not Implemented.
    NotImplemented,
}

impl StatusCode {
    /// Returns the numeric status code.
    pub fn into_i32(self) -> i32 {
        match self {
            StatusCode::Trying => 100,
            StatusCode::Ringing => 180,
            StatusCode::Ok => 200,
            StatusCode::Unauthorized => 401,
            StatusCode::CallOrTransactionDoesNotExist => 481,
            StatusCode::ServerInternalError => 500,
            StatusCode::NotImplemented => 501,
        }
    }

    /// Returns the canonical reason phrase.
    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Trying => "Trying",
            StatusCode::Ringing => "Ringing",
            StatusCode::Ok => "OK",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::CallOrTransactionDoesNotExist => "Call/Transaction Does Not Exist",
            StatusCode::ServerInternalError => "Server Internal Error",
            StatusCode::NotImplemented => "Not Implemented",
        }
    }

    /// Returns `true` for 1xx codes.
    pub fn is_provisional(self) -> bool {
        self.into_i32() < 200
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.into_i32(), self.reason())
    }
}

/// A parsed request line.
#[derive(Debug, Clone)]
pub struct Request {
    /// The request method.
    pub method: SipMethod,
    /// The request target URI.
    pub target: ArcStr,
}

/// A parsed status line.
#[derive(Debug, Clone)]
pub struct Response {
    /// The response status.
    pub status: StatusCode,
}

/// A parsed SIP message, request or response.
#[derive(Debug, Clone, EnumAsInner)]
pub enum SipMsg {
    /// A SIP request.
    Request(Request),
    /// A SIP response.
    Response(Response),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_rfc_values() {
        assert_eq!(StatusCode::Unauthorized.into_i32(), 401);
        assert_eq!(StatusCode::CallOrTransactionDoesNotExist.into_i32(), 481);
        assert_eq!(StatusCode::ServerInternalError.into_i32(), 500);
        assert_eq!(StatusCode::NotImplemented.into_i32(), 501);
        assert_eq!(
            StatusCode::CallOrTransactionDoesNotExist.reason(),
            "Call/Transaction Does Not Exist"
        );
    }

    #[test]
    fn provisional_detection() {
        assert!(StatusCode::Trying.is_provisional());
        assert!(StatusCode::Ringing.is_provisional());
        assert!(!StatusCode::Ok.is_provisional());
    }
}
