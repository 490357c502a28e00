//! Cache of peers sighted during the current discovery bout, with
//! out-of-range eviction at bout boundaries and serialized name
//! resolution.

use tracing::{debug, error};

use crate::adapter::Ctx;
use crate::common::{eir, Address, ClassOfDevice};
use crate::events::{DeviceFoundProps, Notification};

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum NameStatus {
    NotRequired,
    Required,
    /// Resolution request currently in flight for this record; at most one
    /// record carries this status.
    Requested,
}

#[derive(Debug, Clone)]
pub struct RemoteDeviceInfo {
    pub address: Address,
    pub rssi: i8,
    pub class: ClassOfDevice,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub legacy_pairing: bool,
    pub name_status: NameStatus,
    /// Service identifiers decoded from the sighting's advertising data.
    pub services: Vec<String>,
}

impl RemoteDeviceInfo {
    fn effective_alias(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.name {
            Some(name) => name.clone(),
            None => self.address.to_alias(),
        }
    }
}

/// One sighting reported by the discovery plumbing.
pub struct Sighting<'a> {
    pub address: Address,
    pub rssi: i8,
    pub class: ClassOfDevice,
    pub name: Option<&'a str>,
    pub alias: Option<&'a str>,
    pub legacy_pairing: bool,
    pub name_status: NameStatus,
    /// Advertising-payload fragment received with the sighting, if any.
    pub eir: Option<&'a [u8]>,
}

#[derive(Default)]
pub struct FoundDeviceCache {
    /// Kept ordered by descending absolute signal strength.
    found: Vec<RemoteDeviceInfo>,
    /// Snapshot taken at the last bout boundary; records still here when
    /// the next boundary arrives were not re-sighted.
    oor: Vec<Address>,
}

impl FoundDeviceCache {
    pub fn new() -> Self {
        FoundDeviceCache::default()
    }

    pub fn devices(&self) -> &[RemoteDeviceInfo] {
        &self.found
    }

    pub fn get(&self, address: Address) -> Option<&RemoteDeviceInfo> {
        self.found.iter().find(|d| d.address == address)
    }

    /// Records a sighting. Re-sighting with an unchanged signal strength
    /// is silent; any other insert/update re-sorts the set and reports the
    /// device.
    pub fn update_or_insert(&mut self, ctx: &mut Ctx<'_>, sighting: Sighting<'_>) {
        let services = sighting.eir.map(eir::decode_services).unwrap_or_default();

        if let Some(pos) = self
            .found
            .iter()
            .position(|d| d.address == sighting.address)
        {
            // Re-sighted before the boundary sweep: no longer out of range.
            self.oor.retain(|a| *a != sighting.address);

            if self.found[pos].rssi == sighting.rssi {
                return;
            }
            self.found[pos].rssi = sighting.rssi;
            if sighting.eir.is_some() {
                self.found[pos].services = services;
            }
        } else {
            self.found.push(RemoteDeviceInfo {
                address: sighting.address,
                rssi: sighting.rssi,
                class: sighting.class,
                name: sighting.name.map(str::to_owned),
                alias: sighting.alias.map(str::to_owned),
                legacy_pairing: sighting.legacy_pairing,
                name_status: sighting.name_status,
                services,
            });
        }

        self.sort_by_strength();
        self.emit_found(ctx, sighting.address);
    }

    /// Boundary sweep: every record from the previous snapshot that was
    /// not re-sighted disappears; the surviving set becomes the next
    /// snapshot.
    pub fn sweep_out_of_range(&mut self, ctx: &mut Ctx<'_>) {
        for address in std::mem::take(&mut self.oor) {
            if let Some(pos) = self.found.iter().position(|d| d.address == address) {
                ctx.sink.notify(Notification::DeviceDisappeared(address));
                self.found.remove(pos);
            }
        }

        self.oor = self.found.iter().map(|d| d.address).collect();
    }

    /// Issues the next name-resolution request. Records whose request is
    /// rejected synchronously are skipped permanently and the next pending
    /// record is tried, until one is accepted or none remain. Returns
    /// whether a request is now in flight.
    pub fn resolve_pending(&mut self, ctx: &mut Ctx<'_>) -> bool {
        loop {
            let Some(pos) = self
                .found
                .iter()
                .position(|d| d.name_status == NameStatus::Required)
            else {
                return false;
            };

            self.found[pos].name_status = NameStatus::Requested;
            let address = self.found[pos].address;

            match ctx.hw.resolve_name(address) {
                Ok(()) => return true,
                Err(e) => {
                    error!(%address, error = %e, "unable to send remote name request");
                    self.found[pos].name_status = NameStatus::NotRequired;
                }
            }
        }
    }

    /// Cancels the in-flight resolution request, if any. The record goes
    /// back to pending so a later pass can retry it.
    pub fn cancel_pending_resolve(&mut self, ctx: &mut Ctx<'_>) {
        let Some(record) = self
            .found
            .iter_mut()
            .find(|d| d.name_status == NameStatus::Requested)
        else {
            return;
        };

        if let Err(e) = ctx.hw.cancel_resolve_name(record.address) {
            error!(address = %record.address, error = %e, "remote name cancel failed");
        }
        record.name_status = NameStatus::Required;
    }

    /// Marks a record so later resolution passes skip it without deleting
    /// the sighting.
    pub fn mark_skip(&mut self, address: Address) {
        if let Some(record) = self.found.iter_mut().find(|d| d.address == address) {
            record.name_status = NameStatus::NotRequired;
        }
    }

    /// Resolution completion for `address`. A resolved name updates the
    /// record and re-reports the device; failure skips the record.
    pub fn on_resolve_complete(
        &mut self,
        ctx: &mut Ctx<'_>,
        address: Address,
        name: Option<String>,
    ) {
        match name {
            Some(name) => {
                let Some(record) = self.found.iter_mut().find(|d| d.address == address) else {
                    return;
                };
                debug!(%address, name, "remote name resolved");
                record.name = Some(name);
                record.name_status = NameStatus::NotRequired;
                self.emit_found(ctx, address);
            }
            None => self.mark_skip(address),
        }
    }

    pub fn has_pending_names(&self) -> bool {
        self.found
            .iter()
            .any(|d| matches!(d.name_status, NameStatus::Required | NameStatus::Requested))
    }

    pub fn clear(&mut self) {
        self.found.clear();
    }

    pub fn clear_out_of_range(&mut self) {
        self.oor.clear();
    }

    fn sort_by_strength(&mut self) {
        self.found
            .sort_by_key(|d| std::cmp::Reverse(i16::from(d.rssi).abs()));
    }

    fn emit_found(&self, ctx: &mut Ctx<'_>, address: Address) {
        let Some(record) = self.get(address) else {
            return;
        };

        ctx.sink.notify(Notification::DeviceFound(DeviceFoundProps {
            address,
            class: record.class,
            icon: record.class.icon(),
            rssi: record.rssi,
            name: record.name.clone(),
            alias: record.effective_alias(),
            legacy_pairing: record.legacy_pairing,
            paired: ctx.registry.is_paired(address),
            services: record.services.clone(),
        }));
    }
}
