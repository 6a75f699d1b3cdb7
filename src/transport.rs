//! GATT transport abstraction.
//!
//! The BLE stack itself — discovery, connection establishment, service
//! discovery, the actual reads/writes/subscriptions — lives outside this
//! crate. Platforms implement [`GattTransport`] and the controller drives
//! it. Notification and indication streams are plain byte channels; the
//! controller decodes them.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::protocol::uuid::CharacteristicId;

/// Link state as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Failure reported by the transport backend.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("characteristic {0:?} not available")]
    CharacteristicNotFound(CharacteristicId),

    /// Platform-specific failure, wrapped as-is.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Operations this crate needs from a connected GATT client.
#[async_trait]
pub trait GattTransport: Send + Sync {
    /// Read the current value of a characteristic.
    async fn read(&self, characteristic: CharacteristicId) -> Result<Vec<u8>, TransportError>;

    /// Write a value to a characteristic and wait for the ACK.
    async fn write(
        &self,
        characteristic: CharacteristicId,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Subscribe to notifications or indications. Dropping the receiver
    /// unsubscribes.
    async fn subscribe(
        &self,
        characteristic: CharacteristicId,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, TransportError>;

    /// Watchable link state.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}
