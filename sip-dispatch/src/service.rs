use crate::{
    transport::{IncomingMessage, OutgoingRequest},
    Endpoint, Result,
};

/// Priority of the transaction layer on the inbound path.
pub const PRIORITY_TSX_LAYER: u32 = 16;
/// Priority of dialog usages on the inbound path.
pub const PRIORITY_DIALOG_USAGE: u32 = 48;
/// Priority of application services; the default.
pub const PRIORITY_APPLICATION: u32 = 64;

/// A trait which provides a way to extend the SIP endpoint functionalities.
///
/// Services run on the inbound path in ascending [`priority`] order; the
/// first service returning `Ok(true)` from an rx hook consumes the message
/// and ends the pipeline. Outbound requests pass every service's
/// [`on_tx_request`] hook before they are handed to the transport.
///
/// [`priority`]: SipService::priority
/// [`on_tx_request`]: SipService::on_tx_request
#[async_trait::async_trait]
#[allow(unused_variables)]
pub trait SipService: Sync + Send + 'static {
    /// Returns the service name.
    fn name(&self) -> &str;

    /// Returns the service priority. Lower values run earlier.
    fn priority(&self) -> u32 {
        PRIORITY_APPLICATION
    }

    /// Called when an inbound SIP request is received.
    async fn on_rx_request(&self, endpoint: &Endpoint, rx: &mut IncomingMessage) -> Result<bool> {
        Ok(false)
    }

    /// Called when an inbound SIP response is received.
    async fn on_rx_response(&self, endpoint: &Endpoint, rx: &mut IncomingMessage) -> Result<bool> {
        Ok(false)
    }

    /// Called for every outbound request before it hits the wire.
    async fn on_tx_request(&self, endpoint: &Endpoint, tx: &mut OutgoingRequest) -> Result<()> {
        Ok(())
    }
}
