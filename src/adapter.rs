//! Adapter state arbitration core.
//!
//! Owns the component state machines and routes transport requests,
//! hardware completions and timer expiries between them. Everything runs
//! on one task; a borrowed [`Ctx`] hands each component the shared
//! collaborators without reference cycles.

use std::collections::BTreeSet;
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::api::{
    DeviceRegistry, DeviceSighting, HardwareEvent, HardwareOps, PairingAgent, ScanMode, Storage,
};
use crate::authorization::{AuthCallback, AuthorizationBroker};
use crate::cod::ClassOfDeviceSync;
use crate::common::{Address, Error};
use crate::discovery::DiscoveryEngine;
use crate::events::{EventSink, Notification, Property};
use crate::found::{FoundDeviceCache, NameStatus, Sighting};
use crate::mode::{Mode, ModeController};
use crate::session::{OwnerId, SessionManager};
use crate::timers::{TimerKind, Timers};

/// Completion channel for a request whose outcome arrives only after a
/// hardware confirmation.
pub type Reply = oneshot::Sender<Result<(), Error>>;

/// Static adapter configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Seconds of general discoverability before falling back to
    /// connectable; zero disables the fallback.
    pub discoverable_timeout: u32,
    /// Seconds of pairability before the flag clears; zero keeps it.
    pub pairable_timeout: u32,
    /// When set, inquiry bouts are rescheduled in software at this
    /// interval instead of using periodic inquiry.
    pub rescan_interval: Option<std::time::Duration>,
    /// Resolve names of sighted peers between discovery bouts.
    pub name_resolution: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            discoverable_timeout: 180,
            pairable_timeout: 0,
            rescan_interval: None,
            name_resolution: true,
        }
    }
}

/// Controller capabilities, probed once at bring-up.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub bredr: bool,
    pub le: bool,
    /// Extended inquiry response supported.
    pub ext_inquiry: bool,
}

/// Shared collaborators lent to component methods for one call. Fields
/// borrow disjoint parts of the [`Adapter`], so components can hold the
/// context while the adapter passes them to each other mutably.
pub struct Ctx<'a> {
    pub hw: &'a mut dyn HardwareOps,
    pub storage: &'a mut dyn Storage,
    pub sink: &'a dyn EventSink,
    pub registry: &'a mut dyn DeviceRegistry,
    pub agent: Option<&'a mut (dyn PairingAgent + 'static)>,
    pub timers: &'a mut Timers,
    pub config: &'a Config,
    pub caps: &'a Capabilities,
}

impl Ctx<'_> {
    pub(crate) fn agent_confirm(&mut self, mode: Mode) -> Result<(), Error> {
        match self.agent.as_deref_mut() {
            Some(agent) => agent.confirm_mode_change(mode),
            None => Err(Error::NotAuthorized),
        }
    }

    pub(crate) fn agent_authorize(&mut self, peer: Address, service: &str) -> Result<(), Error> {
        match self.agent.as_deref_mut() {
            Some(agent) => agent.authorize_service(peer, service),
            None => Err(Error::NotAuthorized),
        }
    }

    pub(crate) fn agent_cancel(&mut self) {
        if let Some(agent) = self.agent.as_deref_mut() {
            agent.cancel();
        }
    }
}

macro_rules! ctx {
    ($self:ident) => {
        Ctx {
            hw: $self.hw.as_mut(),
            storage: $self.storage.as_mut(),
            sink: $self.sink.as_ref(),
            registry: $self.registry.as_mut(),
            agent: $self.agent.as_deref_mut(),
            timers: &mut $self.timers,
            config: &$self.config,
            caps: &$self.caps,
        }
    };
}

/// Property snapshot returned to the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterProperties {
    pub address: Address,
    pub name: String,
    pub class: u32,
    pub powered: bool,
    pub discoverable: bool,
    pub pairable: bool,
    pub discoverable_timeout: u32,
    pub pairable_timeout: u32,
    pub discovering: bool,
    pub peers: Vec<Address>,
    pub services: Vec<String>,
}

pub struct Adapter {
    index: u16,
    address: Address,
    hw: Box<dyn HardwareOps>,
    storage: Box<dyn Storage>,
    sink: Box<dyn EventSink>,
    registry: Box<dyn DeviceRegistry>,
    agent: Option<Box<dyn PairingAgent>>,
    config: Config,
    caps: Capabilities,
    timers: Timers,
    modes: ModeController,
    discovery: DiscoveryEngine,
    cache: FoundDeviceCache,
    cod: ClassOfDeviceSync,
    sessions: SessionManager,
    auth: AuthorizationBroker,
    connections: BTreeSet<Address>,
    known_peers: BTreeSet<Address>,
}

impl Adapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u16,
        address: Address,
        hw: Box<dyn HardwareOps>,
        storage: Box<dyn Storage>,
        sink: Box<dyn EventSink>,
        registry: Box<dyn DeviceRegistry>,
        config: Config,
        caps: Capabilities,
    ) -> Self {
        let stored_class = storage.read_local_class();
        let stored_name = storage.read_local_name();
        let modes = ModeController::new(config.discoverable_timeout, config.pairable_timeout);

        Adapter {
            index,
            address,
            hw,
            storage,
            sink,
            registry,
            agent: None,
            config,
            caps,
            timers: Timers::new(),
            modes,
            discovery: DiscoveryEngine::new(),
            cache: FoundDeviceCache::new(),
            cod: ClassOfDeviceSync::new(stored_class, stored_name),
            sessions: SessionManager::new(),
            auth: AuthorizationBroker::new(),
            connections: BTreeSet::new(),
            known_peers: BTreeSet::new(),
        }
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn powered(&self) -> bool {
        self.modes.powered() && !self.modes.off_requested()
    }

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    pub fn get_properties(&self) -> AdapterProperties {
        AdapterProperties {
            address: self.address,
            name: self.cod.local_name().to_owned(),
            class: self.cod.current().raw(),
            powered: self.powered(),
            discoverable: self.modes.scan_mode().inquiry(),
            pairable: self.modes.pairable(),
            discoverable_timeout: self.modes.discoverable_timeout(),
            pairable_timeout: self.modes.pairable_timeout(),
            discovering: self.discovery.discovering(),
            peers: self.known_peers.iter().copied().collect(),
            services: self.cod.services().to_vec(),
        }
    }

    // ---- transport request surface -------------------------------------

    pub fn set_name(&mut self, name: &str) -> Result<(), Error> {
        let powered = self.modes.powered();
        let mut ctx = ctx!(self);
        self.cod.set_local_name(&mut ctx, name, powered)
    }

    pub fn set_powered(&mut self, powered: bool) -> Result<(), Error> {
        if powered {
            let mode = self.storage.read_on_mode().unwrap_or(Mode::Connectable);
            self.request_mode(mode.max(Mode::Connectable), None)
        } else {
            self.request_mode(Mode::Off, None)
        }
    }

    /// Requests a mode transition. When `reply` is given the outcome is
    /// delivered once the controller confirms; errors are also delivered
    /// through it.
    pub fn request_mode(&mut self, mode: Mode, mut reply: Option<Reply>) -> Result<(), Error> {
        let mut ctx = ctx!(self);
        let result = self.modes.set_mode(&mut ctx, &mut self.cod, mode, &mut reply);
        if let Err(e) = &result {
            if let Some(reply) = reply.take() {
                let _ = reply.send(Err(e.clone()));
            }
        }
        result
    }

    pub fn set_discoverable(&mut self, discoverable: bool, reply: Option<Reply>) -> Result<(), Error> {
        let target = if !discoverable {
            Mode::Connectable
        } else if self.modes.limited_eligible() {
            Mode::Limited
        } else {
            Mode::Discoverable
        };
        self.request_mode(target, reply)
    }

    pub fn set_pairable(&mut self, pairable: bool) -> Result<(), Error> {
        let mut ctx = ctx!(self);
        self.modes.set_pairable(&mut ctx, &mut self.cod, pairable)
    }

    pub fn set_discoverable_timeout(&mut self, seconds: u32) -> Result<(), Error> {
        let mut ctx = ctx!(self);
        self.modes.set_discoverable_timeout(&mut ctx, seconds)
    }

    pub fn set_pairable_timeout(&mut self, seconds: u32) -> Result<(), Error> {
        let mut ctx = ctx!(self);
        self.modes.set_pairable_timeout(&mut ctx, seconds)
    }

    pub fn set_class(&mut self, major: u8, minor: u8) -> Result<(), Error> {
        if !self.modes.powered() {
            return Err(Error::NotReady);
        }
        let mut ctx = ctx!(self);
        self.cod.set_major_minor(&mut ctx, major, minor);
        Ok(())
    }

    pub fn set_service_classes(&mut self, value: u8) {
        let mut ctx = ctx!(self);
        self.cod.set_service_classes(&mut ctx, value);
    }

    pub fn add_service_id(&mut self, uuid: String) {
        let mut ctx = ctx!(self);
        self.cod.insert_service(&mut ctx, uuid);
    }

    pub fn remove_service_id(&mut self, uuid: &str) {
        let mut ctx = ctx!(self);
        self.cod.remove_service(&mut ctx, uuid);
    }

    // ---- sessions ------------------------------------------------------

    pub fn request_mode_session(&mut self, owner: OwnerId, mode: Mode, reply: Reply) {
        let mut ctx = ctx!(self);
        self.sessions
            .request_mode_session(&mut ctx, &mut self.modes, owner, mode, reply);
    }

    pub fn release_mode_session(&mut self, owner: &OwnerId) -> Result<(), Error> {
        let mut ctx = ctx!(self);
        self.sessions
            .release_mode_session(&mut ctx, &mut self.modes, &mut self.cod, owner)
    }

    pub fn start_discovery(&mut self, owner: OwnerId) -> Result<(), Error> {
        let powered = self.powered();
        let mut ctx = ctx!(self);
        self.sessions.request_discovery_session(
            &mut ctx,
            &mut self.discovery,
            &mut self.cache,
            powered,
            owner,
        )
    }

    pub fn stop_discovery(&mut self, owner: &OwnerId) -> Result<(), Error> {
        let mut ctx = ctx!(self);
        self.sessions
            .release_discovery_session(&mut ctx, &mut self.discovery, &mut self.cache, owner)
    }

    /// Pauses discovery around a latency-sensitive operation such as
    /// pairing. No-op without live discovery sessions.
    pub fn suspend_discovery(&mut self) {
        let sessions = self.sessions.has_discovery_sessions();
        let mut ctx = ctx!(self);
        self.discovery.suspend(&mut ctx, &mut self.cache, sessions);
    }

    pub fn resume_discovery(&mut self) {
        let sessions = self.sessions.has_discovery_sessions();
        let mut ctx = ctx!(self);
        self.discovery.resume(&mut ctx, &mut self.cache, sessions);
    }

    /// Transport-level client went away: all of its claims are dropped.
    pub fn owner_disconnected(&mut self, owner: &OwnerId) {
        let mut ctx = ctx!(self);
        self.sessions.owner_disconnected(
            &mut ctx,
            &mut self.modes,
            &mut self.cod,
            &mut self.discovery,
            &mut self.cache,
            owner,
        );
    }

    // ---- agent and authorization ---------------------------------------

    pub fn register_agent(&mut self, agent: Box<dyn PairingAgent>) -> Result<(), Error> {
        if self.agent.is_some() {
            return Err(Error::AlreadyExists);
        }
        debug!("pairing agent registered");
        self.agent = Some(agent);
        Ok(())
    }

    pub fn unregister_agent(&mut self) -> Result<(), Error> {
        if self.agent.take().is_none() {
            return Err(Error::DoesNotExist);
        }
        debug!("pairing agent unregistered");
        Ok(())
    }

    /// Agent outcome for a pending mode-upgrade confirmation.
    pub fn agent_confirm_complete(&mut self, owner: &OwnerId, accepted: bool) {
        let mut ctx = ctx!(self);
        self.sessions
            .confirm_mode_reply(&mut ctx, &mut self.modes, &mut self.cod, owner, accepted);
    }

    pub fn authorize(
        &mut self,
        peer: Address,
        service: &str,
        cb: AuthCallback,
    ) -> Result<(), Error> {
        let connected = self.connections.contains(&peer);
        let mut ctx = ctx!(self);
        self.auth.authorize(&mut ctx, connected, peer, service, cb)
    }

    /// Agent outcome for a forwarded authorization request.
    pub fn agent_authorize_complete(&mut self, peer: Address, result: Result<(), Error>) {
        let mut ctx = ctx!(self);
        self.auth.on_agent_reply(&mut ctx, peer, result);
    }

    pub fn cancel_authorize(&mut self, peer: Address) -> Result<(), Error> {
        let mut ctx = ctx!(self);
        self.auth.cancel(&mut ctx, peer)
    }

    /// Delivers deferred work queued during request processing. The engine
    /// runs this once per loop iteration.
    pub fn run_deferred(&mut self) {
        self.auth.run_deferred();
    }

    // ---- peer objects and connections ----------------------------------

    pub fn create_peer(&mut self, address: Address) -> Result<(), Error> {
        if !self.known_peers.insert(address) {
            return Err(Error::AlreadyExists);
        }
        self.sink.notify(Notification::DeviceCreated(address));
        Ok(())
    }

    pub fn remove_peer(&mut self, address: Address) -> Result<(), Error> {
        if !self.known_peers.remove(&address) {
            return Err(Error::DoesNotExist);
        }
        // An outstanding authorization for the peer dies with it.
        let _ = self.cancel_authorize(address);
        self.sink.notify(Notification::DeviceRemoved(address));
        Ok(())
    }

    pub fn has_peer(&self, address: Address) -> bool {
        self.known_peers.contains(&address)
    }

    pub fn list_peers(&self) -> Vec<Address> {
        self.known_peers.iter().copied().collect()
    }

    pub fn add_connection(&mut self, address: Address) {
        self.connections.insert(address);
    }

    pub fn remove_connection(&mut self, address: Address) {
        if self.connections.remove(&address) {
            let _ = self.cancel_authorize(address);
        }
    }

    // ---- hardware events -----------------------------------------------

    pub fn handle_hardware_event(&mut self, event: HardwareEvent) {
        match event {
            HardwareEvent::PowerComplete { powered: true } => self.power_up(),
            HardwareEvent::PowerComplete { powered: false } => self.power_down(),
            HardwareEvent::ScanModeChanged(scan) => {
                let mut ctx = ctx!(self);
                self.modes.reconcile_scan_mode(&mut ctx, &mut self.cod, scan);
            }
            HardwareEvent::ClassWriteComplete(status) => {
                let mut ctx = ctx!(self);
                self.cod.on_write_complete(&mut ctx, status);
            }
            HardwareEvent::NameWriteComplete(status) => {
                let mut ctx = ctx!(self);
                self.cod.on_name_write_complete(&mut ctx, status);
            }
            HardwareEvent::LocalNameRead(status, name) => {
                let mut ctx = ctx!(self);
                self.cod.on_local_name_read(&mut ctx, status, name);
            }
            HardwareEvent::TxPowerRead(status, dbm) => {
                let mut ctx = ctx!(self);
                self.cod.on_tx_power_read(&mut ctx, status, dbm);
            }
            HardwareEvent::DiscoveryPhaseChanged(phase) => {
                let sessions = self.sessions.has_discovery_sessions();
                let mut ctx = ctx!(self);
                self.discovery
                    .on_phase_changed(&mut ctx, &mut self.cache, phase, sessions);
            }
            HardwareEvent::NameResolveComplete {
                address,
                status,
                name,
            } => {
                let resolved = if status.is_success() { name } else { None };
                let mut ctx = ctx!(self);
                self.cache.on_resolve_complete(&mut ctx, address, resolved);
                if self.discovery.resolving_names() && !self.cache.resolve_pending(&mut ctx) {
                    let sessions = self.sessions.has_discovery_sessions();
                    self.discovery
                        .on_resolution_drained(&mut ctx, &mut self.cache, sessions);
                }
            }
            HardwareEvent::DeviceFound(sighting) => self.report_sighting(sighting),
            HardwareEvent::SspModeChanged(enabled) => {
                let mut ctx = ctx!(self);
                self.cod.on_ssp_mode_changed(&mut ctx, enabled);
            }
        }
    }

    fn report_sighting(&mut self, sighting: DeviceSighting) {
        let name_status = if sighting.name.is_some() || !self.config.name_resolution {
            NameStatus::NotRequired
        } else {
            NameStatus::Required
        };

        let mut ctx = ctx!(self);
        self.cache.update_or_insert(
            &mut ctx,
            Sighting {
                address: sighting.address,
                rssi: sighting.rssi,
                class: sighting.class,
                name: sighting.name.as_deref(),
                alias: None,
                legacy_pairing: sighting.legacy_pairing,
                name_status,
                eir: sighting.eir.as_deref(),
            },
        );
    }

    // ---- power lifecycle -----------------------------------------------

    fn power_up(&mut self) {
        info!(index = self.index, address = %self.address, "adapter up");

        self.modes.set_off_requested(false);
        self.modes.set_powered_flag(true);
        self.discovery.reset();

        let discoverable_timeout = self
            .storage
            .read_discoverable_timeout()
            .unwrap_or(self.config.discoverable_timeout);
        let pairable_timeout = self
            .storage
            .read_pairable_timeout()
            .unwrap_or(self.config.pairable_timeout);
        self.modes
            .load_timeouts(discoverable_timeout, pairable_timeout);

        let pairable = self.storage.read_pairable().unwrap_or(true);
        self.modes.set_pairable_flag(pairable);

        let stored = self
            .storage
            .read_mode()
            .unwrap_or(Mode::Connectable)
            .max(Mode::Connectable);
        self.modes.set_mode_state(stored);

        let ctx = ctx!(self);
        let visibility = match stored {
            Mode::Off | Mode::Connectable => ctx.hw.set_connectable(),
            Mode::Limited | Mode::Discoverable => ctx.hw.set_discoverable(),
        };
        if let Err(e) = visibility {
            error!(error = %e, "visibility restore failed");
        }

        // Controller bring-up probes; backends answer what they support.
        let _ = ctx.hw.read_local_version();
        let _ = ctx.hw.read_local_features();
        if ctx.caps.ext_inquiry {
            let _ = ctx.hw.read_local_ext_features();
        }
        let _ = ctx.hw.init_ssp_mode();
        let _ = ctx.hw.set_event_mask();
        let _ = ctx.hw.read_link_policy();

        self.sink
            .notify(Notification::PropertyChanged(Property::Powered(true)));
        self.sink
            .notify(Notification::PropertyChanged(Property::Pairable(pairable)));

        let mut ctx = ctx!(self);
        self.cod.disable_cache(&mut ctx);
    }

    fn power_down(&mut self) {
        info!(index = self.index, address = %self.address, "adapter down");

        self.timers.disarm(TimerKind::Discoverable);
        self.timers.disarm(TimerKind::Pairable);
        self.timers.disarm(TimerKind::LeScanStop);
        self.timers.disarm(TimerKind::PeriodicRescan);

        let mut ctx = ctx!(self);
        self.sessions.clear_all(&mut ctx);

        self.discovery.reset();
        self.cache.clear();
        self.cache.clear_out_of_range();
        self.connections.clear();

        if self.modes.scan_mode().inquiry() {
            self.sink
                .notify(Notification::PropertyChanged(Property::Discoverable(false)));
        }
        self.sink
            .notify(Notification::PropertyChanged(Property::Powered(false)));

        self.modes.set_scan_mode_state(ScanMode::Disabled);
        self.modes.set_mode_state(Mode::Off);
        self.modes.set_powered_flag(false);
        self.modes.set_off_requested(false);
        self.cod.reset_for_power_down();

        // An off request lands here; any other pending target fails.
        let mut ctx = ctx!(self);
        self.modes.complete_pending(&mut ctx);
    }

    // ---- timers --------------------------------------------------------

    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Fires every timer due at `now`, in kind order.
    pub fn fire_due_timers(&mut self, now: Instant) {
        while let Some(kind) = self.timers.take_due(now) {
            self.handle_timer(kind);
        }
    }

    fn handle_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Discoverable => {
                debug!("discoverable window expired");
                if let Err(e) = self.request_mode(Mode::Connectable, None) {
                    error!(error = %e, "discoverable timeout fallback failed");
                }
            }
            TimerKind::Pairable => {
                debug!("pairable window expired");
                if let Err(e) = self.set_pairable(false) {
                    warn!(error = %e, "pairable timeout had no effect");
                }
            }
            TimerKind::LeScanStop => {
                if let Err(e) = self.hw.stop_scanning() {
                    error!(error = %e, "scheduled scan stop failed");
                }
            }
            TimerKind::PeriodicRescan => {
                let mut ctx = ctx!(self);
                if let Err(e) = self.discovery.start(&mut ctx, &mut self.cache) {
                    error!(error = %e, "scheduled rescan failed");
                }
            }
        }
    }
}
