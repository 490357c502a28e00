//! Connectable/discoverable mode state machine.
//!
//! A mode change is one in-flight visibility command plus a pending reply;
//! the change commits when the controller reports the resulting scan
//! settings back. Intent is persisted before the hardware confirms, so a
//! crash mid-change restores the requested mode on the next bring-up.

use tracing::{debug, error, warn};

use crate::adapter::{Ctx, Reply};
use crate::api::ScanMode;
use crate::cod::ClassOfDeviceSync;
use crate::common::Error;
use crate::events::{Notification, Property};
use crate::timers::TimerKind;

/// Limited discoverability is only advertised for bounded windows.
const LIMITED_TIMEOUT_MAX: u32 = 60;

/// Adapter mode, ordered by visibility. Arbitration across sessions takes
/// the maximum ordinal.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub enum Mode {
    Off = 0,
    Connectable = 1,
    Limited = 2,
    Discoverable = 3,
}

impl Mode {
    /// Scan-settings footprint of the mode. Limited and Discoverable share
    /// one, which is why switching between them needs no hardware command.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Connectable => "connectable",
            Mode::Limited | Mode::Discoverable => "discoverable",
        }
    }
}

struct PendingMode {
    target: Mode,
    reply: Option<Reply>,
}

pub struct ModeController {
    mode: Mode,
    scan_mode: ScanMode,
    /// Baseline the adapter returns to when the last mode session ends.
    global_mode: Mode,
    powered: bool,
    /// Power-off requested but not yet confirmed by the controller.
    off_requested: bool,
    pairable: bool,
    discoverable_timeout: u32,
    pairable_timeout: u32,
    pending: Option<PendingMode>,
}

impl ModeController {
    pub fn new(discoverable_timeout: u32, pairable_timeout: u32) -> Self {
        ModeController {
            mode: Mode::Off,
            scan_mode: ScanMode::Disabled,
            global_mode: Mode::Off,
            powered: false,
            off_requested: false,
            pairable: false,
            discoverable_timeout,
            pairable_timeout,
            pending: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn scan_mode(&self) -> ScanMode {
        self.scan_mode
    }

    pub fn global_mode(&self) -> Mode {
        self.global_mode
    }

    pub fn powered(&self) -> bool {
        self.powered
    }

    pub fn off_requested(&self) -> bool {
        self.off_requested
    }

    pub fn pairable(&self) -> bool {
        self.pairable
    }

    pub fn discoverable_timeout(&self) -> u32 {
        self.discoverable_timeout
    }

    pub fn pairable_timeout(&self) -> u32 {
        self.pairable_timeout
    }

    pub fn change_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn set_powered_flag(&mut self, powered: bool) {
        self.powered = powered;
    }

    pub fn set_off_requested(&mut self, off: bool) {
        self.off_requested = off;
    }

    pub fn set_pairable_flag(&mut self, pairable: bool) {
        self.pairable = pairable;
    }

    pub fn set_mode_state(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn set_scan_mode_state(&mut self, scan_mode: ScanMode) {
        self.scan_mode = scan_mode;
    }

    /// Reloads the timeout settings at bring-up.
    pub fn load_timeouts(&mut self, discoverable: u32, pairable: u32) {
        self.discoverable_timeout = discoverable;
        self.pairable_timeout = pairable;
    }

    /// Remembers the currently requested mode as the sessionless baseline.
    pub fn snapshot_global(&mut self) {
        self.global_mode = self.mode;
    }

    /// Whether the in-flight change, or the current mode when none is in
    /// flight, asked for limited discoverability.
    fn limited_requested(&self) -> bool {
        match &self.pending {
            Some(pending) => pending.target == Mode::Limited,
            None => self.mode == Mode::Limited,
        }
    }

    /// Limited discoverability requires pairability and a short bounded
    /// discoverable window.
    pub fn limited_eligible(&self) -> bool {
        self.pairable
            && self.discoverable_timeout > 0
            && self.discoverable_timeout <= LIMITED_TIMEOUT_MAX
    }

    /// Requests a mode change. The intent is persisted immediately; the
    /// reply (when given) is completed once the controller confirms, except
    /// for changes with no hardware footprint, which complete at once.
    ///
    /// On error the reply is left in place so the caller can deliver the
    /// failure itself.
    pub fn set_mode(
        &mut self,
        ctx: &mut Ctx<'_>,
        cod: &mut ClassOfDeviceSync,
        target: Mode,
        reply: &mut Option<Reply>,
    ) -> Result<(), Error> {
        if self.pending.is_some() {
            return Err(Error::Busy);
        }

        // Limited discoverability outside its eligibility window degrades
        // to general discoverability.
        let target = if target == Mode::Limited && !self.limited_eligible() {
            Mode::Discoverable
        } else {
            target
        };

        if !self.powered && target != Mode::Off {
            ctx.hw.set_powered(true)?;
        } else if self.powered && target == Mode::Off {
            ctx.hw.set_powered(false)?;
            self.off_requested = true;
        } else if target == self.mode {
            if let Some(reply) = reply.take() {
                let _ = reply.send(Ok(()));
            }
            return Ok(());
        } else {
            let want_inquiry = matches!(target, Mode::Limited | Mode::Discoverable);

            // A command is only needed when the scan settings actually
            // change; Limited and Discoverable share theirs.
            if want_inquiry != self.scan_mode.inquiry() {
                if want_inquiry {
                    ctx.hw.set_discoverable()?;
                } else {
                    ctx.hw.set_connectable()?;
                }
            }

            if want_inquiry {
                ctx.timers.disarm(TimerKind::Discoverable);
                if self.discoverable_timeout > 0 {
                    ctx.timers.arm(
                        TimerKind::Discoverable,
                        std::time::Duration::from_secs(self.discoverable_timeout.into()),
                    );
                }
            }

            if target == Mode::Limited {
                cod.set_limited(ctx, true);
            } else if self.mode == Mode::Limited {
                cod.set_limited(ctx, false);
            }
        }

        ctx.storage.write_mode(target);

        if target.label() == self.mode.label() {
            // Same scan settings (Limited vs Discoverable), so no hardware
            // confirmation will arrive.
            self.mode = target;
            if let Some(reply) = reply.take() {
                let _ = reply.send(Ok(()));
            }
            return Ok(());
        }

        self.pending = Some(PendingMode {
            target,
            reply: reply.take(),
        });

        Ok(())
    }

    /// Completes the pending change against the mode the controller
    /// actually landed in. A mismatch fails the requester; the adapter
    /// keeps the observed mode with no retry.
    pub fn complete_pending(&mut self, ctx: &mut Ctx<'_>) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        if pending.target == self.mode {
            if let Some(reply) = pending.reply {
                let _ = reply.send(Ok(()));
            }
            return;
        }

        error!(
            requested = ?pending.target,
            actual = ?self.mode,
            "mode change did not land as requested"
        );
        ctx.storage.write_mode(self.mode);
        if let Some(reply) = pending.reply {
            let _ = reply.send(Err(Error::Failed("mode change failed".into())));
        }
    }

    /// The controller reported new scan settings. Derives the resulting
    /// mode, emits the property deltas, and completes any pending change.
    pub fn reconcile_scan_mode(
        &mut self,
        ctx: &mut Ctx<'_>,
        cod: &mut ClassOfDeviceSync,
        new: ScanMode,
    ) {
        if new == self.scan_mode {
            return;
        }

        debug!(?new, previous = ?self.scan_mode, "scan settings changed");
        ctx.timers.disarm(TimerKind::Discoverable);

        let (mode, discoverable, pairable) = match new {
            ScanMode::Disabled => (Mode::Off, false, false),
            ScanMode::Page => (Mode::Connectable, false, self.pairable),
            ScanMode::PageInquiry => {
                if self.discoverable_timeout > 0 {
                    ctx.timers.arm(
                        TimerKind::Discoverable,
                        std::time::Duration::from_secs(self.discoverable_timeout.into()),
                    );
                }
                (Mode::Discoverable, true, self.pairable)
            }
            ScanMode::Inquiry => {
                // Inquiry-only scan is never requested by this adapter.
                // Keep the timeout honest and wait for a settings report
                // that matches something we asked for.
                warn!("inquiry scan without page scan reported");
                if self.discoverable_timeout > 0 {
                    ctx.timers.arm(
                        TimerKind::Discoverable,
                        std::time::Duration::from_secs(self.discoverable_timeout.into()),
                    );
                }
                return;
            }
        };

        if new.page() != self.scan_mode.page() {
            ctx.sink
                .notify(Notification::PropertyChanged(Property::Pairable(pairable)));
        }

        // Both discoverable modes share one scan footprint, so the
        // controller report alone cannot distinguish them; which one we
        // landed in follows the requested target.
        let mode = if mode == Mode::Discoverable
            && self.limited_requested()
            && self.limited_eligible()
        {
            Mode::Limited
        } else {
            mode
        };
        cod.set_limited(ctx, mode == Mode::Limited);

        ctx.sink
            .notify(Notification::PropertyChanged(Property::Discoverable(
                discoverable,
            )));

        self.scan_mode = new;
        self.mode = mode;

        self.complete_pending(ctx);
    }

    /// Toggles pairability. While discoverable, this can flip the adapter
    /// between limited and general discoverability.
    pub fn set_pairable(
        &mut self,
        ctx: &mut Ctx<'_>,
        cod: &mut ClassOfDeviceSync,
        pairable: bool,
    ) -> Result<(), Error> {
        if self.scan_mode == ScanMode::Disabled {
            return Err(Error::NotReady);
        }

        if pairable == self.pairable {
            return Ok(());
        }

        self.pairable = pairable;
        ctx.storage.write_pairable(pairable);
        ctx.sink
            .notify(Notification::PropertyChanged(Property::Pairable(pairable)));

        ctx.timers.disarm(TimerKind::Pairable);
        if pairable && self.pairable_timeout > 0 {
            ctx.timers.arm(
                TimerKind::Pairable,
                std::time::Duration::from_secs(self.pairable_timeout.into()),
            );
        }

        if self.scan_mode.inquiry() {
            let target = if self.limited_eligible() {
                Mode::Limited
            } else {
                Mode::Discoverable
            };
            self.set_mode(ctx, cod, target, &mut None)?;
        }

        Ok(())
    }

    pub fn set_discoverable_timeout(
        &mut self,
        ctx: &mut Ctx<'_>,
        timeout: u32,
    ) -> Result<(), Error> {
        if timeout == self.discoverable_timeout {
            return Ok(());
        }

        ctx.timers.disarm(TimerKind::Discoverable);
        if timeout > 0 && self.scan_mode.inquiry() {
            ctx.timers.arm(
                TimerKind::Discoverable,
                std::time::Duration::from_secs(timeout.into()),
            );
        }

        self.discoverable_timeout = timeout;
        ctx.storage.write_discoverable_timeout(timeout);
        ctx.sink
            .notify(Notification::PropertyChanged(Property::DiscoverableTimeout(
                timeout,
            )));

        Ok(())
    }

    pub fn set_pairable_timeout(&mut self, ctx: &mut Ctx<'_>, timeout: u32) -> Result<(), Error> {
        if timeout == self.pairable_timeout {
            return Ok(());
        }

        ctx.timers.disarm(TimerKind::Pairable);
        if timeout > 0 && self.pairable {
            ctx.timers.arm(
                TimerKind::Pairable,
                std::time::Duration::from_secs(timeout.into()),
            );
        }

        self.pairable_timeout = timeout;
        ctx.storage.write_pairable_timeout(timeout);
        ctx.sink
            .notify(Notification::PropertyChanged(Property::PairableTimeout(
                timeout,
            )));

        Ok(())
    }
}
