//! Session admission and refcounting for mode requests and discovery.
//!
//! Sessions are owned by transport clients and identified by owner id and
//! kind; a forced cleanup on owner disconnect releases every claim the
//! owner held, regardless of refcount.

use tracing::{debug, error, info};

use crate::adapter::{Ctx, Reply};
use crate::cod::ClassOfDeviceSync;
use crate::common::Error;
use crate::discovery::DiscoveryEngine;
use crate::found::FoundDeviceCache;
use crate::mode::{Mode, ModeController};

/// Transport-level client identity, e.g. a bus connection name.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug, Hash)]
pub struct OwnerId(pub String);

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

struct ModeSession {
    owner: OwnerId,
    mode: Mode,
    refcount: u32,
    /// Reply held while the pairing agent confirms the change; exactly one
    /// session can be in this state.
    reply: Option<Reply>,
}

struct DiscoverySession {
    owner: OwnerId,
    refcount: u32,
}

#[derive(Default)]
pub struct SessionManager {
    mode_sessions: Vec<ModeSession>,
    disc_sessions: Vec<DiscoverySession>,
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager::default()
    }

    pub fn has_discovery_sessions(&self) -> bool {
        !self.disc_sessions.is_empty()
    }

    /// Mode every live session needs satisfied, folded with the baseline.
    fn needed_mode(&self, modes: &ModeController) -> Mode {
        self.mode_sessions
            .iter()
            .map(|s| s.mode)
            .fold(modes.global_mode(), Mode::max)
    }

    /// Claims a mode session. Every outcome is delivered through `reply`;
    /// when an upgrade needs the user's blessing the reply is parked until
    /// the agent answers.
    pub fn request_mode_session(
        &mut self,
        ctx: &mut Ctx<'_>,
        modes: &mut ModeController,
        owner: OwnerId,
        mode: Mode,
        reply: Reply,
    ) {
        if self.mode_sessions.is_empty() {
            modes.snapshot_global();
        }

        if let Some(session) = self.mode_sessions.iter_mut().find(|s| s.owner == owner) {
            session.refcount += 1;
            let _ = reply.send(Ok(()));
            return;
        }

        debug!(%owner, ?mode, "session requested");
        self.mode_sessions.push(ModeSession {
            owner: owner.clone(),
            mode,
            refcount: 1,
            reply: None,
        });

        let needed = self.needed_mode(modes);
        if modes.mode() >= needed {
            let _ = reply.send(Ok(()));
            return;
        }

        // Ask the user before raising visibility on a session's behalf.
        match ctx.agent_confirm(needed) {
            Ok(()) => {
                if let Some(session) = self.mode_sessions.iter_mut().find(|s| s.owner == owner) {
                    session.reply = Some(reply);
                }
            }
            Err(e) => {
                self.remove_mode_session(&owner);
                let _ = reply.send(Err(e));
            }
        }
    }

    /// The pairing agent answered a mode-upgrade confirmation.
    pub fn confirm_mode_reply(
        &mut self,
        ctx: &mut Ctx<'_>,
        modes: &mut ModeController,
        cod: &mut ClassOfDeviceSync,
        owner: &OwnerId,
        accepted: bool,
    ) {
        let Some(pos) = self
            .mode_sessions
            .iter()
            .position(|s| s.owner == *owner && s.reply.is_some())
        else {
            return;
        };

        let Some(reply) = self.mode_sessions[pos].reply.take() else {
            return;
        };

        if !accepted {
            info!(%owner, "mode upgrade rejected by the user");
            self.mode_sessions.remove(pos);
            let _ = reply.send(Err(Error::NotAuthorized));
            return;
        }

        let needed = self.needed_mode(modes);
        match modes.set_mode(ctx, cod, needed, &mut None) {
            Ok(()) => {
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                self.mode_sessions.remove(pos);
                let _ = reply.send(Err(e));
            }
        }
    }

    pub fn release_mode_session(
        &mut self,
        ctx: &mut Ctx<'_>,
        modes: &mut ModeController,
        cod: &mut ClassOfDeviceSync,
        owner: &OwnerId,
    ) -> Result<(), Error> {
        let Some(pos) = self.mode_sessions.iter().position(|s| s.owner == *owner) else {
            return Err(Error::NotInProgress);
        };

        self.mode_sessions[pos].refcount -= 1;
        if self.mode_sessions[pos].refcount > 0 {
            return Ok(());
        }

        let session = self.mode_sessions.remove(pos);
        if let Some(reply) = session.reply {
            // Released before the agent answered.
            ctx.agent_cancel();
            let _ = reply.send(Err(Error::NotAuthorized));
        }
        self.settle_mode(ctx, modes, cod);
        Ok(())
    }

    /// Claims a discovery session; the first claim starts discovery.
    pub fn request_discovery_session(
        &mut self,
        ctx: &mut Ctx<'_>,
        discovery: &mut DiscoveryEngine,
        cache: &mut FoundDeviceCache,
        powered: bool,
        owner: OwnerId,
    ) -> Result<(), Error> {
        if !powered {
            return Err(Error::NotReady);
        }

        if let Some(session) = self.disc_sessions.iter_mut().find(|s| s.owner == owner) {
            session.refcount += 1;
            return Ok(());
        }

        if self.disc_sessions.is_empty() {
            discovery
                .start(ctx, cache)
                .map_err(|e| Error::Failed(e.to_string()))?;
        }

        debug!(%owner, "discovery session added");
        self.disc_sessions.push(DiscoverySession {
            owner,
            refcount: 1,
        });
        Ok(())
    }

    pub fn release_discovery_session(
        &mut self,
        ctx: &mut Ctx<'_>,
        discovery: &mut DiscoveryEngine,
        cache: &mut FoundDeviceCache,
        owner: &OwnerId,
    ) -> Result<(), Error> {
        let Some(pos) = self.disc_sessions.iter().position(|s| s.owner == *owner) else {
            return Err(Error::NotInProgress);
        };

        self.disc_sessions[pos].refcount -= 1;
        if self.disc_sessions[pos].refcount > 0 {
            return Ok(());
        }

        self.disc_sessions.remove(pos);
        if self.disc_sessions.is_empty() {
            discovery.stop(ctx, cache, false);
        }
        Ok(())
    }

    /// Drops every claim `owner` held, regardless of refcount. Parked mode
    /// replies are cancelled through the agent.
    pub fn owner_disconnected(
        &mut self,
        ctx: &mut Ctx<'_>,
        modes: &mut ModeController,
        cod: &mut ClassOfDeviceSync,
        discovery: &mut DiscoveryEngine,
        cache: &mut FoundDeviceCache,
        owner: &OwnerId,
    ) {
        if let Some(pos) = self.mode_sessions.iter().position(|s| s.owner == *owner) {
            let session = self.mode_sessions.remove(pos);
            if let Some(reply) = session.reply {
                ctx.agent_cancel();
                let _ = reply.send(Err(Error::NotAuthorized));
            }
            info!(%owner, "session owner exited");
            self.settle_mode(ctx, modes, cod);
        }

        if let Some(pos) = self.disc_sessions.iter().position(|s| s.owner == *owner) {
            self.disc_sessions.remove(pos);
            info!(%owner, "discovery session owner exited");
            if self.disc_sessions.is_empty() {
                discovery.stop(ctx, cache, false);
            }
        }
    }

    /// Force-drops every session during power-down. No hardware commands
    /// are issued; the caller tears the radio state down itself.
    pub fn clear_all(&mut self, ctx: &mut Ctx<'_>) {
        for session in self.mode_sessions.drain(..) {
            if let Some(reply) = session.reply {
                ctx.agent_cancel();
                let _ = reply.send(Err(Error::NotReady));
            }
        }
        self.disc_sessions.clear();
    }

    fn remove_mode_session(&mut self, owner: &OwnerId) {
        self.mode_sessions.retain(|s| s.owner != *owner);
    }

    /// Re-arbitrates after a release; a lowered requirement is applied
    /// best-effort.
    fn settle_mode(
        &mut self,
        ctx: &mut Ctx<'_>,
        modes: &mut ModeController,
        cod: &mut ClassOfDeviceSync,
    ) {
        let needed = self.needed_mode(modes);
        if needed == modes.mode() {
            return;
        }

        if let Err(e) = modes.set_mode(ctx, cod, needed, &mut None) {
            error!(?needed, error = %e, "mode restore failed");
        }
    }
}
