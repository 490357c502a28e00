use crate::common::{Address, Error};
use crate::mode::Mode;

/// User-facing pairing/authorization agent. Each request method either
/// rejects synchronously or starts a confirmation dialog whose outcome is
/// delivered back to the adapter (`Adapter::agent_confirm_complete`,
/// `Adapter::agent_authorize_complete`) by the transport layer.
pub trait PairingAgent {
    /// Ask the user to allow raising the adapter visibility to `mode`.
    fn confirm_mode_change(&mut self, mode: Mode) -> Result<(), Error>;

    /// Ask the user to authorize `peer` for `service`.
    fn authorize_service(&mut self, peer: Address, service: &str) -> Result<(), Error>;

    /// Abort whatever confirmation is on screen.
    fn cancel(&mut self);
}

/// Narrow view of the per-peer-device objects owned by the transport
/// layer. Only what the arbitration core needs: trust and pairing state,
/// and the authorizing flag maintained during an agent confirmation.
pub trait DeviceRegistry {
    fn is_paired(&self, address: Address) -> bool;
    fn is_trusted(&self, address: Address) -> bool;
    fn set_authorizing(&mut self, address: Address, authorizing: bool);
}
