//! Control-plane state machine for a Bluetooth adapter.
//!
//! The crate arbitrates what clients ask of the radio (visibility modes,
//! discovery, service authorization) against what the controller confirms
//! back, on a single event-driven task. Hardware access, persistence and
//! the user-facing agent are traits in [`api`], implemented by platform
//! glue; [`engine`] provides the event loop and the channel-based handle
//! the transport layer talks to.

pub mod adapter;
pub mod api;
pub mod authorization;
pub mod cod;
pub mod common;
pub mod discovery;
pub mod engine;
pub mod events;
pub mod found;
pub mod mode;
pub mod session;
pub mod timers;

pub use adapter::{Adapter, AdapterProperties, Capabilities, Config, Ctx, Reply};
pub use api::{
    DeviceRegistry, DeviceSighting, HardwareEvent, HardwareOps, HwStatus, InquiryKind,
    PairingAgent, ScanMode, Storage,
};
pub use common::{Address, ClassOfDevice, Error};
pub use engine::{AdapterEngine, AdapterEvent, AdapterHandle, Request};
pub use events::{EventSink, Notification, Property};
pub use mode::Mode;
pub use session::OwnerId;
