use crate::common::ClassOfDevice;
use crate::mode::Mode;

/// Persistent configuration consumed by the adapter. Reads return `None`
/// when nothing was stored; writes are best-effort and implementations log
/// their own failures. The adapter never blocks on storage.
pub trait Storage {
    /// Mode identifier to restore after a restart. Written as soon as a
    /// transition is accepted, before the hardware confirms it, so restart
    /// behavior reflects intent.
    fn read_mode(&self) -> Option<Mode>;
    fn write_mode(&mut self, mode: Mode);

    /// Mode to bring the radio up in when powered on after an off period.
    fn read_on_mode(&self) -> Option<Mode>;

    fn read_pairable(&self) -> Option<bool>;
    fn write_pairable(&mut self, pairable: bool);

    fn read_discoverable_timeout(&self) -> Option<u32>;
    fn write_discoverable_timeout(&mut self, seconds: u32);

    fn read_pairable_timeout(&self) -> Option<u32>;
    fn write_pairable_timeout(&mut self, seconds: u32);

    fn read_local_class(&self) -> Option<ClassOfDevice>;
    fn write_local_class(&mut self, class: ClassOfDevice);

    fn read_local_name(&self) -> Option<String>;
    fn write_local_name(&mut self, name: &str);
}
