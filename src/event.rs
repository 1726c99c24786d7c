//! Gateway event system.

use tokio::sync::broadcast;

/// Events emitted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Gateway is listening.
    Started {
        /// Bound address.
        address: String,
    },

    /// Gateway is shutting down.
    ShuttingDown,

    /// A paid request was committed and its claim recorded.
    ClaimRecorded {
        /// Contract claimed against.
        contract_id: u64,
        /// Nonce now on record.
        nonce: i64,
    },

    /// Error occurred.
    Error {
        /// Error message.
        message: String,
    },
}

/// Channel for receiving gateway events.
pub type GatewayEventsChannel = broadcast::Receiver<GatewayEvent>;

/// Sender for gateway events.
pub type GatewayEventsSender = broadcast::Sender<GatewayEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (GatewayEventsSender, GatewayEventsChannel) {
    broadcast::channel(256)
}
