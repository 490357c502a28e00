//! Traits implemented by the adapter's external collaborators: the
//! hardware command backend, persistent storage, the pairing agent and the
//! peer-device registry.

mod agent;
mod hardware;
mod storage;

pub use agent::{DeviceRegistry, PairingAgent};
pub use hardware::{DeviceSighting, HardwareEvent, HardwareOps, HwStatus, InquiryKind, ScanMode};
pub use storage::Storage;
