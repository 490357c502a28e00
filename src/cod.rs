//! Class-of-device convergence and advertising-payload upkeep.
//!
//! The hardware accepts one class write at a time, so the adapter tracks
//! three values: `current` (confirmed by the controller), `pending` (write
//! in flight) and `wanted` (what the service/mode layers last asked for).
//! Rapid changes coalesce into `wanted`; each completion issues at most one
//! follow-up write until the two converge.

use tracing::{debug, error};

use crate::adapter::Ctx;
use crate::common::{eir, ClassOfDevice, Error};
use crate::events::{Notification, Property};
use crate::HwStatus;

const MAX_NAME_LENGTH: usize = 248;

pub struct ClassOfDeviceSync {
    current: ClassOfDevice,
    pending: Option<ClassOfDevice>,
    wanted: ClassOfDevice,
    /// While enabled (during adapter bring-up) class changes only update
    /// `wanted`; nothing is written until the cache is flushed.
    cache_enabled: bool,
    tx_power: i8,
    ssp_mode: bool,
    local_name: String,
    /// Set between a local name write and its read-back, to avoid
    /// re-persisting a name we stored ourselves.
    name_written: bool,
    services: Vec<String>,
}

impl ClassOfDeviceSync {
    pub fn new(stored_class: Option<ClassOfDevice>, stored_name: Option<String>) -> Self {
        ClassOfDeviceSync {
            current: ClassOfDevice::default(),
            pending: None,
            wanted: stored_class.unwrap_or_default(),
            cache_enabled: true,
            tx_power: 0,
            ssp_mode: false,
            local_name: stored_name.unwrap_or_default(),
            name_written: false,
            services: Vec::new(),
        }
    }

    pub fn current(&self) -> ClassOfDevice {
        self.current
    }

    pub fn wanted(&self) -> ClassOfDevice {
        self.wanted
    }

    pub fn write_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Updates only the service-class byte of the wanted class.
    pub fn set_service_classes(&mut self, ctx: &mut Ctx<'_>, value: u8) {
        self.wanted = self.wanted.with_service_classes(value);

        if self.cache_enabled || self.pending.is_some() {
            return;
        }

        // Already have the class we want, keep the payload fresh and bail.
        if self.current == self.wanted {
            self.update_advertising(ctx);
            return;
        }

        debug!(class = ?self.wanted, "changing service classes");
        self.write_wanted(ctx);
    }

    /// Updates only the major/minor device class bits of the wanted class.
    pub fn set_major_minor(&mut self, ctx: &mut Ctx<'_>, major: u8, minor: u8) {
        self.wanted = self.wanted.with_major_minor(major, minor);

        if self.wanted == self.current || self.cache_enabled || self.pending.is_some() {
            return;
        }

        debug!(class = ?self.wanted, "changing major/minor class");
        self.write_wanted(ctx);
    }

    /// Sets or clears the limited-discoverable bit, writing through the
    /// dedicated toggle command when a write is possible right now.
    pub fn set_limited(&mut self, ctx: &mut Ctx<'_>, limited: bool) {
        self.wanted = self.wanted.with_limited(limited);

        // Save an unnecessary write when nothing would change.
        if self.pending.is_some() || self.wanted == self.current {
            return;
        }

        match ctx.hw.set_limited_discoverable(self.wanted, limited) {
            Ok(()) => self.pending = Some(self.wanted),
            Err(e) => error!(error = %e, "limited discoverable update failed"),
        }
    }

    /// Completion of an outstanding class write. Commits and persists the
    /// new class, refreshes the advertising payload, then chases `wanted`
    /// if it moved while the write was in flight.
    pub fn on_write_complete(&mut self, ctx: &mut Ctx<'_>, status: HwStatus) {
        if !status.is_success() {
            error!(status = status.0, "class write failed");
            self.pending = None;
            return;
        }

        let Some(pending) = self.pending.take() else {
            return;
        };

        self.current = pending;
        ctx.storage.write_local_class(self.current);
        ctx.sink
            .notify(Notification::PropertyChanged(Property::Class(
                self.current.raw(),
            )));
        self.update_advertising(ctx);

        if self.wanted == self.current {
            return;
        }

        let result = if self.wanted.limited() != self.current.limited() {
            ctx.hw
                .set_limited_discoverable(self.wanted, self.wanted.limited())
        } else {
            ctx.hw.set_class(self.wanted)
        };

        match result {
            Ok(()) => self.pending = Some(self.wanted),
            Err(e) => error!(error = %e, "follow-up class write failed"),
        }
    }

    /// Disables the bring-up cache and flushes any difference accumulated
    /// while it was on.
    pub fn disable_cache(&mut self, ctx: &mut Ctx<'_>) {
        if !self.cache_enabled {
            return;
        }

        self.cache_enabled = false;

        if self.current == self.wanted {
            return;
        }

        self.write_wanted(ctx);
    }

    /// Power-down reset: drop the in-flight write and buffer changes again
    /// until the next bring-up settles.
    pub fn reset_for_power_down(&mut self) {
        self.pending = None;
        self.cache_enabled = true;
        self.name_written = false;
    }

    fn write_wanted(&mut self, ctx: &mut Ctx<'_>) {
        match ctx.hw.set_class(self.wanted) {
            Ok(()) => self.pending = Some(self.wanted),
            Err(e) => error!(error = %e, "adapter class update failed"),
        }
    }

    /// Regenerates the extended-inquiry payload from the local name, tx
    /// power and supported services. Written as all zeroes while simple
    /// pairing is off.
    pub fn update_advertising(&mut self, ctx: &mut Ctx<'_>) {
        if !ctx.caps.ext_inquiry {
            return;
        }

        let data = if self.ssp_mode {
            eir::build_payload(&self.local_name, self.tx_power, &self.services)
        } else {
            [0u8; eir::EIR_DATA_LENGTH]
        };

        if let Err(e) = ctx.hw.write_advertising_payload(&data) {
            error!(error = %e, "can't write advertising payload");
        }
    }

    pub fn on_tx_power_read(&mut self, ctx: &mut Ctx<'_>, status: HwStatus, dbm: i8) {
        if !status.is_success() {
            return;
        }

        self.tx_power = dbm;
        debug!(tx_power = dbm, "inquiry response tx power level updated");
        self.update_advertising(ctx);
    }

    pub fn on_ssp_mode_changed(&mut self, ctx: &mut Ctx<'_>, enabled: bool) {
        self.ssp_mode = enabled;
        self.update_advertising(ctx);
    }

    /// Local name change requested by a client. Persists and notifies
    /// immediately; pushes to the controller only while powered.
    pub fn set_local_name(
        &mut self,
        ctx: &mut Ctx<'_>,
        name: &str,
        powered: bool,
    ) -> Result<(), Error> {
        if name.len() > MAX_NAME_LENGTH {
            return Err(Error::InvalidArguments(format!(
                "name exceeds {MAX_NAME_LENGTH} bytes"
            )));
        }

        if name == self.local_name {
            return Ok(());
        }

        self.local_name = name.to_owned();
        ctx.storage.write_local_name(name);
        ctx.sink
            .notify(Notification::PropertyChanged(Property::Name(
                name.to_owned(),
            )));

        if powered {
            ctx.hw.set_name(name)?;
            self.name_written = true;
            self.update_advertising(ctx);
        }

        Ok(())
    }

    /// The controller acknowledged a name write; read it back so the
    /// cached copy matches what the hardware will report to peers.
    pub fn on_name_write_complete(&mut self, ctx: &mut Ctx<'_>, status: HwStatus) {
        if !status.is_success() {
            return;
        }

        if let Err(e) = ctx.hw.read_name() {
            error!(error = %e, "local name read-back failed");
        }
    }

    pub fn on_local_name_read(&mut self, ctx: &mut Ctx<'_>, status: HwStatus, name: String) {
        if !status.is_success() {
            return;
        }

        if name == self.local_name {
            self.name_written = false;
            return;
        }

        self.local_name = name.clone();

        // A name we did not write ourselves (changed out-of-band) still
        // needs persisting and announcing.
        if !self.name_written {
            ctx.storage.write_local_name(&name);
            ctx.sink
                .notify(Notification::PropertyChanged(Property::Name(name)));
        }
        self.name_written = false;

        self.update_advertising(ctx);
    }

    pub fn insert_service(&mut self, ctx: &mut Ctx<'_>, uuid: String) {
        if self.services.contains(&uuid) {
            return;
        }

        self.services.push(uuid);
        self.services.sort();
        ctx.sink
            .notify(Notification::PropertyChanged(Property::ServiceIds(
                self.services.clone(),
            )));
        self.update_advertising(ctx);
    }

    pub fn remove_service(&mut self, ctx: &mut Ctx<'_>, uuid: &str) {
        let before = self.services.len();
        self.services.retain(|s| s != uuid);
        if self.services.len() == before {
            return;
        }

        ctx.sink
            .notify(Notification::PropertyChanged(Property::ServiceIds(
                self.services.clone(),
            )));
        self.update_advertising(ctx);
    }
}
