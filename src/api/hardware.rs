use crate::common::{Address, ClassOfDevice, Error};
use crate::discovery::DiscoveryPhase;

/// Visibility bitmask as last confirmed by the controller.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ScanMode {
    Disabled,
    /// Page scan only: connectable, not discoverable.
    Page,
    /// Inquiry scan only. Controllers are not expected to report this
    /// combination; it is handled defensively.
    Inquiry,
    PageInquiry,
}

impl ScanMode {
    pub fn page(self) -> bool {
        matches!(self, ScanMode::Page | ScanMode::PageInquiry)
    }

    pub fn inquiry(self) -> bool {
        matches!(self, ScanMode::Inquiry | ScanMode::PageInquiry)
    }
}

/// Status code carried by an asynchronous command completion; zero is
/// success, anything else is the controller's error code.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct HwStatus(pub u8);

impl HwStatus {
    pub const SUCCESS: HwStatus = HwStatus(0);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

/// Inquiry variant requested from the controller.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum InquiryKind {
    Standard,
    Periodic,
}

/// Asynchronous radio command interface. Every method either rejects the
/// command synchronously or accepts it; accepted commands complete later
/// through a [`HardwareEvent`] on the adapter's event queue. The adapter
/// guarantees at most one outstanding command per category (mode change,
/// class write, name resolution); implementations never see overlapping
/// commands within a category.
pub trait HardwareOps {
    fn set_powered(&mut self, powered: bool) -> Result<(), Error>;
    fn set_connectable(&mut self) -> Result<(), Error>;
    fn set_discoverable(&mut self) -> Result<(), Error>;
    fn set_limited_discoverable(&mut self, class: ClassOfDevice, limited: bool)
        -> Result<(), Error>;
    fn set_class(&mut self, class: ClassOfDevice) -> Result<(), Error>;
    fn set_name(&mut self, name: &str) -> Result<(), Error>;
    fn read_name(&mut self) -> Result<(), Error>;
    fn start_inquiry(&mut self, length: u8, kind: InquiryKind) -> Result<(), Error>;
    fn stop_inquiry(&mut self) -> Result<(), Error>;
    fn start_scanning(&mut self) -> Result<(), Error>;
    fn stop_scanning(&mut self) -> Result<(), Error>;
    fn resolve_name(&mut self, address: Address) -> Result<(), Error>;
    fn cancel_resolve_name(&mut self, address: Address) -> Result<(), Error>;
    fn write_advertising_payload(&mut self, data: &[u8; 240]) -> Result<(), Error>;

    // Capability surface consumed by collaborators outside this crate's
    // state machines (pairing, link management, controller bring-up).
    // Backends override what they support.
    fn set_fast_connectable(&mut self, _enable: bool) -> Result<(), Error> {
        Ok(())
    }
    fn block_device(&mut self, _address: Address) -> Result<(), Error> {
        Ok(())
    }
    fn unblock_device(&mut self, _address: Address) -> Result<(), Error> {
        Ok(())
    }
    fn disconnect(&mut self, _handle: u16) -> Result<(), Error> {
        Ok(())
    }
    fn remove_bonding(&mut self, _address: Address) -> Result<(), Error> {
        Ok(())
    }
    fn request_authentication(&mut self, _handle: u16) -> Result<(), Error> {
        Ok(())
    }
    fn pincode_reply(&mut self, _address: Address, _pin: Option<&str>) -> Result<(), Error> {
        Ok(())
    }
    fn confirm_reply(&mut self, _address: Address, _accept: bool) -> Result<(), Error> {
        Ok(())
    }
    fn passkey_reply(&mut self, _address: Address, _passkey: Option<u32>) -> Result<(), Error> {
        Ok(())
    }
    fn read_clock(&mut self, _handle: u16) -> Result<(), Error> {
        Ok(())
    }
    fn get_conn_handle(&mut self, _address: Address) -> Result<u16, Error> {
        Err(Error::DoesNotExist)
    }
    fn get_conn_list(&mut self) -> Result<Vec<(Address, u16)>, Error> {
        Ok(Vec::new())
    }
    fn read_local_version(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn read_local_features(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn read_local_ext_features(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn init_ssp_mode(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn read_link_policy(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn set_event_mask(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn encrypt_link(&mut self, _handle: u16) -> Result<(), Error> {
        Ok(())
    }
}

/// One peer sighting, assembled by the backend from inquiry results,
/// advertising reports or an extended inquiry response.
#[derive(Debug, Clone)]
pub struct DeviceSighting {
    pub address: Address,
    pub rssi: i8,
    pub class: ClassOfDevice,
    /// Name carried in the sighting itself (EIR or advertising data).
    pub name: Option<String>,
    pub legacy_pairing: bool,
    pub eir: Option<Vec<u8>>,
}

/// Completions and controller-sourced state changes, delivered by the
/// hardware backend onto the adapter's single-threaded event queue.
#[derive(Debug)]
pub enum HardwareEvent {
    /// The controller's visibility state changed, whether we asked for it
    /// or not. Authoritative over locally tracked mode.
    ScanModeChanged(ScanMode),
    /// A power command finished; the radio is now up or down.
    PowerComplete { powered: bool },
    ClassWriteComplete(HwStatus),
    NameWriteComplete(HwStatus),
    LocalNameRead(HwStatus, String),
    TxPowerRead(HwStatus, i8),
    /// The discovery procedure moved between phases (inquiry started,
    /// inquiry complete, scan enabled, ...).
    DiscoveryPhaseChanged(DiscoveryPhase),
    NameResolveComplete {
        address: Address,
        status: HwStatus,
        name: Option<String>,
    },
    DeviceFound(DeviceSighting),
    SspModeChanged(bool),
}
