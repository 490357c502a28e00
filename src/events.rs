use crate::common::{Address, ClassOfDevice};

/// One adapter property, carried with its new value. Each notification
/// kind has a statically-typed payload; there is no generic key/variant
/// packing.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Name(String),
    Class(u32),
    Powered(bool),
    Discoverable(bool),
    Pairable(bool),
    DiscoverableTimeout(u32),
    PairableTimeout(u32),
    Discovering(bool),
    ServiceIds(Vec<String>),
}

/// Property map reported with a device sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFoundProps {
    pub address: Address,
    pub class: ClassOfDevice,
    pub icon: &'static str,
    pub rssi: i8,
    pub name: Option<String>,
    pub alias: String,
    pub legacy_pairing: bool,
    pub paired: bool,
    pub services: Vec<String>,
}

/// Notifications raised toward the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PropertyChanged(Property),
    DeviceFound(DeviceFoundProps),
    DeviceDisappeared(Address),
    DeviceCreated(Address),
    DeviceRemoved(Address),
}

/// Outbound notification sink, implemented by the transport layer.
pub trait EventSink {
    fn notify(&self, notification: Notification);
}
