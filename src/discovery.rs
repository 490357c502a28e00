//! Discovery life-cycle state machine: inquiry/scan phase tracking,
//! interleaving on dual-mode controllers, name-resolution overlay and
//! suspend/resume.

use std::time::Duration;

use tracing::{debug, error};

use crate::adapter::Ctx;
use crate::api::InquiryKind;
use crate::events::{Notification, Property};
use crate::found::FoundDeviceCache;
use crate::timers::TimerKind;

/// Inquiry window handed to the controller, in 1.28s units.
const INQUIRY_LENGTH: u8 = 0x08;

/// An LE scan phase is force-stopped after this long.
const LE_SCAN_DURATION: Duration = Duration::from_millis(5120);

/// Base discovery state. The name-resolution and suspension overlays are
/// tracked separately since they combine with any base state.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DiscoveryPhase {
    Idle,
    StandardInquiry,
    PeriodicInquiry,
    LeScan,
}

/// Discovery procedure selected from controller capability and
/// configuration.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DiscoverType {
    StandardInquiry,
    PeriodicInquiry,
    LeScan,
    Interleaved,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum StartOutcome {
    Started,
    /// Name resolution from the previous bout is still running; discovery
    /// restarts by itself once it drains.
    Postponed,
}

#[derive(Default)]
pub struct DiscoveryEngine {
    phase: DiscoveryPhase,
    resolving_names: bool,
    suspended: bool,
    /// A postponed start waiting for name resolution to drain.
    pending_start: bool,
}

impl Default for DiscoveryPhase {
    fn default() -> Self {
        DiscoveryPhase::Idle
    }
}

impl DiscoveryEngine {
    pub fn new() -> Self {
        DiscoveryEngine::default()
    }

    pub fn phase(&self) -> DiscoveryPhase {
        self.phase
    }

    pub fn resolving_names(&self) -> bool {
        self.resolving_names
    }

    pub fn suspended(&self) -> bool {
        self.suspended
    }

    /// User-visible discovering flag: any active base phase counts.
    pub fn discovering(&self) -> bool {
        self.phase != DiscoveryPhase::Idle
    }

    pub fn discover_type(&self, ctx: &Ctx<'_>) -> DiscoverType {
        if ctx.caps.le {
            if ctx.caps.bredr {
                DiscoverType::Interleaved
            } else {
                DiscoverType::LeScan
            }
        } else if ctx.config.rescan_interval.is_some() {
            DiscoverType::StandardInquiry
        } else {
            DiscoverType::PeriodicInquiry
        }
    }

    /// Kicks off the discovery procedure appropriate for this controller.
    pub fn start(
        &mut self,
        ctx: &mut Ctx<'_>,
        cache: &mut FoundDeviceCache,
    ) -> Result<StartOutcome, crate::common::Error> {
        if self.suspended {
            return Ok(StartOutcome::Started);
        }

        if self.resolving_names {
            self.pending_start = true;
            return Ok(StartOutcome::Postponed);
        }

        cache.cancel_pending_resolve(ctx);

        match self.discover_type(ctx) {
            DiscoverType::StandardInquiry | DiscoverType::Interleaved => {
                ctx.hw.start_inquiry(INQUIRY_LENGTH, InquiryKind::Standard)?
            }
            DiscoverType::PeriodicInquiry => {
                ctx.hw.start_inquiry(INQUIRY_LENGTH, InquiryKind::Periodic)?
            }
            DiscoverType::LeScan => ctx.hw.start_scanning()?,
        }

        Ok(StartOutcome::Started)
    }

    /// Stops discovery at the hardware level, unless only a software
    /// rescan timer or a suspension is holding it.
    pub fn stop(&mut self, ctx: &mut Ctx<'_>, cache: &mut FoundDeviceCache, retain_cache: bool) {
        cache.cancel_pending_resolve(ctx);
        self.resolving_names = false;
        self.pending_start = false;

        if !retain_cache {
            cache.clear();
        }
        cache.clear_out_of_range();

        if self.suspended {
            self.suspended = false;
            return;
        }

        if ctx.timers.is_armed(TimerKind::PeriodicRescan) {
            ctx.timers.disarm(TimerKind::PeriodicRescan);
            return;
        }

        let result = if self.phase == DiscoveryPhase::LeScan {
            ctx.hw.stop_scanning()
        } else {
            ctx.hw.stop_inquiry()
        };

        if let Err(e) = result {
            error!(error = %e, "discovery stop failed");
        }
    }

    /// Halts discovery while keeping the found-device cache, so a resumed
    /// bout continues where it left off.
    pub fn suspend(&mut self, ctx: &mut Ctx<'_>, cache: &mut FoundDeviceCache, sessions: bool) {
        if !sessions || self.suspended {
            return;
        }

        debug!("suspending discovery");
        self.stop(ctx, cache, true);
        self.suspended = true;
    }

    pub fn resume(&mut self, ctx: &mut Ctx<'_>, cache: &mut FoundDeviceCache, sessions: bool) {
        if !sessions {
            return;
        }

        debug!("resuming discovery");
        self.suspended = false;
        if let Err(e) = self.start(ctx, cache) {
            error!(error = %e, "discovery resume failed");
        }
    }

    /// Hardware-event plumbing reported a phase change. Runs interleaving,
    /// the out-of-range sweep, name resolution and the rescan timer, and
    /// raises the Discovering property except where a transition is
    /// suppressed.
    pub fn on_phase_changed(
        &mut self,
        ctx: &mut Ctx<'_>,
        cache: &mut FoundDeviceCache,
        new_phase: DiscoveryPhase,
        sessions: bool,
    ) {
        if self.phase == new_phase {
            return;
        }

        let previous = self.phase;
        let was_resolving = self.resolving_names;
        self.phase = new_phase;

        let discovering = match new_phase {
            DiscoveryPhase::StandardInquiry | DiscoveryPhase::PeriodicInquiry => {
                // Inquiry restarted while names were still resolving:
                // resolution continues, nothing user-visible changes.
                if was_resolving {
                    return;
                }
                true
            }
            DiscoveryPhase::LeScan => {
                ctx.timers.arm(TimerKind::LeScanStop, LE_SCAN_DURATION);

                // On dual-mode controllers only the inquiry phases are
                // user-visible discovery.
                if ctx.caps.bredr {
                    return;
                }
                true
            }
            DiscoveryPhase::Idle => {
                if sessions
                    && self.discover_type(ctx) == DiscoverType::Interleaved
                    && previous == DiscoveryPhase::StandardInquiry
                {
                    // Interleave: chain from inquiry straight into the LE
                    // phase instead of going idle.
                    if let Err(e) = ctx.hw.start_scanning() {
                        error!(error = %e, "interleaved scan start failed");
                    }
                    return;
                }
                false
            }
        };

        if !discovering {
            cache.sweep_out_of_range(ctx);

            if ctx.config.name_resolution && cache.resolve_pending(ctx) {
                // Idle-visible transition is deferred until the pending
                // names drain.
                self.resolving_names = true;
                return;
            }
            self.resolving_names = false;

            if sessions {
                if let Some(interval) = ctx.config.rescan_interval {
                    ctx.timers.arm(TimerKind::PeriodicRescan, interval);
                }
            }
        }

        ctx.sink
            .notify(Notification::PropertyChanged(Property::Discovering(
                discovering,
            )));
    }

    /// The last pending name finished resolving. Either restarts a
    /// postponed discovery bout or finally surfaces the idle transition.
    pub fn on_resolution_drained(
        &mut self,
        ctx: &mut Ctx<'_>,
        cache: &mut FoundDeviceCache,
        sessions: bool,
    ) {
        if !self.resolving_names {
            return;
        }
        self.resolving_names = false;

        if self.pending_start {
            self.pending_start = false;
            if sessions {
                if let Err(e) = self.start(ctx, cache) {
                    error!(error = %e, "postponed discovery start failed");
                }
            }
            return;
        }

        if sessions {
            if let Some(interval) = ctx.config.rescan_interval {
                ctx.timers.arm(TimerKind::PeriodicRescan, interval);
            }
        }

        ctx.sink
            .notify(Notification::PropertyChanged(Property::Discovering(false)));
    }

    /// Power-down reset.
    pub fn reset(&mut self) {
        self.phase = DiscoveryPhase::Idle;
        self.resolving_names = false;
        self.suspended = false;
        self.pending_start = false;
    }
}
