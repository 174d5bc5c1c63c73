#![deny(missing_docs)]
//! SIP Endpoint
//!

pub mod builder;

pub use builder::Builder;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::dialog::DialogSet;
use crate::message::StatusCode;
use crate::transaction::{Role, Transaction, TransactionSet, TsxKey};
use crate::transport::{IncomingMessage, OutgoingRequest, OutgoingResponse, ToBytes};
use crate::{Result, SipService};

struct Inner {
    /// The name of the endpoint.
    name: String,
    /// The list of services registered, sorted by ascending priority.
    services: Box<[Box<dyn SipService>]>,
    /// The set of live dialogs.
    dialogs: DialogSet,
    /// The set of live transactions.
    transactions: TransactionSet,
    /// Whether startup has finished and dispatch may begin.
    booted: AtomicBool,
}

#[derive(Clone)]
/// The SIP endpoint.
///
/// An endpoint is the logical entity the transport layer feeds parsed
/// messages into. It owns the registered services and runs them over each
/// message in priority order, keeps the dialog and transaction sets the
/// services consult, and sends the responses they produce.
pub struct Endpoint(Arc<Inner>);

impl Endpoint {
    /// Returns a builder to create an `Endpoint`.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Get the endpoint name.
    pub fn get_name(&self) -> &str {
        &self.0.name
    }

    /// Returns the set of live dialogs.
    pub fn dialogs(&self) -> &DialogSet {
        &self.0.dialogs
    }

    /// Returns the set of live transactions.
    pub fn transactions(&self) -> &TransactionSet {
        &self.0.transactions
    }

    /// Marks startup as finished.
    ///
    /// Until this is called the inbound path drops everything and relies on
    /// peer retransmission, so half-initialized services never see traffic.
    pub fn set_fully_booted(&self) {
        self.0.booted.store(true, Ordering::SeqCst);
        log::debug!("Endpoint '{}' fully booted", self.0.name);
    }

    /// Returns `true` once [`set_fully_booted`] has been called.
    ///
    /// [`set_fully_booted`]: Endpoint::set_fully_booted
    pub fn is_fully_booted(&self) -> bool {
        self.0.booted.load(Ordering::SeqCst)
    }

    /// Feeds one parsed incoming message into the service pipeline.
    ///
    /// This is the transport layer's entry point.
    pub async fn receive(&self, mut rx: IncomingMessage) -> Result<()> {
        log::debug!("<= {} from /{}", rx.describe(), rx.addr());

        let handled = self.process_rx_data(&mut rx, None).await?;
        if !handled {
            log::debug!("{} from /{} was unhandled by any service", rx.describe(), rx.addr());
        }

        Ok(())
    }

    /// Runs the service pipeline over `rx`, starting after the service
    /// named `start_after`, or from the top when `None`.
    ///
    /// Returns `true` if some service consumed the message.
    pub async fn process_rx_data(&self, rx: &mut IncomingMessage, start_after: Option<&str>) -> Result<bool> {
        let services = &self.0.services;

        let start = match start_after {
            Some(name) => match services.iter().position(|service| service.name() == name) {
                Some(idx) => idx + 1,
                None => {
                    log::warn!("Service '{}' is not registered; processing from the top", name);
                    0
                }
            },
            None => 0,
        };

        for service in &services[start..] {
            let handled = if rx.is_request() {
                service.on_rx_request(self, rx).await?
            } else {
                service.on_rx_response(self, rx).await?
            };

            if handled {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Creates a new SIP response based on an incoming request.
    ///
    /// The mandatory headers are mirrored from the request; a To tag is
    /// added for final responses that do not carry one yet.
    pub fn create_response(&self, rx: &IncomingMessage, status: StatusCode) -> OutgoingResponse {
        let mut headers = rx.headers.clone();

        // 8.2.6.2 Headers and Tags
        // The UAS MUST add a tag to the To header field in the response
        // (with the exception of the 100 (Trying) response, in which a tag
        // MAY be present).
        if headers.to.tag.is_none() && !status.is_provisional() {
            headers.to.tag = Some(headers.via.branch.clone());
        }

        OutgoingResponse {
            status,
            headers,
            challenge: None,
            addr: *rx.addr(),
            transport: rx.transport.clone(),
        }
    }

    /// Respond statelessly to a request.
    ///
    /// The response is created from the incoming request and sent without
    /// creating any transaction state.
    pub async fn respond_stateless(&self, rx: &IncomingMessage, status: StatusCode) -> Result<()> {
        let response = self.create_response(rx, status);
        self.send_response(&response).await
    }

    /// Sends a SIP response through the transport it was created for.
    pub async fn send_response(&self, response: &OutgoingResponse) -> Result<()> {
        log::debug!("=> Response {}", response.status);

        let encoded_buf = response.to_bytes()?;
        response.transport.send(&encoded_buf, &response.addr).await?;

        Ok(())
    }

    /// Sends a SIP request and registers the client transaction for it.
    ///
    /// Every registered service sees the request through its tx hook before
    /// encoding, which is where the sending serializer's name gets recorded
    /// for response affinity.
    pub async fn send_request(&self, mut request: OutgoingRequest) -> Result<Transaction> {
        for service in self.0.services.iter() {
            service.on_tx_request(self, &mut request).await?;
        }

        let key = TsxKey {
            role: Role::Uac,
            method: request.msg.method,
            branch: request.headers.via.branch.clone(),
        };
        let tsx = self.0.transactions.create(key);
        tsx.set_last_serializer(request.serializer_name.clone());

        log::debug!("=> Request {} to /{}", request.msg.method, request.addr);

        let encoded_buf = request.to_bytes()?;
        request.transport.send(&encoded_buf, &request.addr).await?;

        Ok(tsx)
    }
}
