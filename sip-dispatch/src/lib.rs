//! # sip-dispatch
//!
//! The inbound dispatch stage of a SIP stack.
//!
//! The transport layer fans parsed messages in from many sockets at once;
//! what applications want is an ordered, per-conversation stream of work.
//! This crate sits in between: the [`distributor`] pins every message to a
//! named serializer (the one its dialog or transaction already lives on,
//! or a hashed pool bucket), the [`identify`] service attributes the
//! message to a configured peer, and the [`auth`] service challenges
//! whatever must authenticate — all running serialized, so application
//! services need no further synchronization.

pub mod auth;
pub mod dialog;
pub mod distributor;
pub mod endpoint;
pub mod events;
pub mod identify;
pub mod message;
pub mod peer;
pub mod serializer;
pub mod service;
pub mod transaction;
pub mod transport;

pub(crate) mod error;

pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use service::SipService;
pub use util::ArcStr;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[cfg(test)]
pub(crate) mod test_utils;

/// Generates a new Via branch parameter bearing the RFC 3261 magic cookie.
pub fn generate_branch() -> ArcStr {
    use rand::Rng;

    let mut rng = rand::rng();
    format!("z9hG4bK{:08x}{:08x}", rng.random::<u32>(), rng.random::<u32>()).into()
}
