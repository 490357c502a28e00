//! Service-authorization arbitration: one outstanding request per adapter,
//! answered either by the trusted-device bypass or by the pairing agent.

use tracing::debug;

use crate::adapter::Ctx;
use crate::common::{Address, Error};

pub type AuthCallback = Box<dyn FnOnce(Result<(), Error>) + Send>;

struct PendingAuth {
    peer: Address,
    cb: AuthCallback,
}

#[derive(Default)]
pub struct AuthorizationBroker {
    /// Trusted-device grant waiting to be delivered off the request path.
    deferred: Option<PendingAuth>,
    /// Request forwarded to the agent, keyed by peer.
    agent_pending: Option<PendingAuth>,
}

impl AuthorizationBroker {
    pub fn new() -> Self {
        AuthorizationBroker::default()
    }

    pub fn busy(&self) -> bool {
        self.deferred.is_some() || self.agent_pending.is_some()
    }

    /// Requests authorization for `peer` to use `service`. Trusted peers
    /// are granted without involving the agent; the grant is still
    /// delivered asynchronously so callers observe one code path.
    pub fn authorize(
        &mut self,
        ctx: &mut Ctx<'_>,
        connected: bool,
        peer: Address,
        service: &str,
        cb: AuthCallback,
    ) -> Result<(), Error> {
        if !connected {
            return Err(Error::NotConnected);
        }

        if self.busy() {
            return Err(Error::Busy);
        }

        if ctx.registry.is_trusted(peer) {
            debug!(%peer, service, "trusted device, authorization granted");
            self.deferred = Some(PendingAuth { peer, cb });
            return Ok(());
        }

        ctx.agent_authorize(peer, service)?;
        ctx.registry.set_authorizing(peer, true);
        self.agent_pending = Some(PendingAuth { peer, cb });
        Ok(())
    }

    /// The agent answered an authorization request.
    pub fn on_agent_reply(&mut self, ctx: &mut Ctx<'_>, peer: Address, result: Result<(), Error>) {
        let Some(pending) = self.agent_pending.take() else {
            return;
        };

        if pending.peer != peer {
            self.agent_pending = Some(pending);
            return;
        }

        ctx.registry.set_authorizing(peer, false);
        (pending.cb)(result);
    }

    /// Withdraws the outstanding request for `peer`, if any. The callback
    /// is dropped without being called.
    pub fn cancel(&mut self, ctx: &mut Ctx<'_>, peer: Address) -> Result<(), Error> {
        if self.deferred.as_ref().is_some_and(|p| p.peer == peer) {
            self.deferred = None;
            return Ok(());
        }

        if self.agent_pending.as_ref().is_some_and(|p| p.peer == peer) {
            self.agent_pending = None;
            ctx.agent_cancel();
            ctx.registry.set_authorizing(peer, false);
            return Ok(());
        }

        Err(Error::DoesNotExist)
    }

    /// Delivers the trusted-device grant queued by `authorize`. Run once
    /// per engine iteration, after request processing.
    pub fn run_deferred(&mut self) {
        if let Some(pending) = self.deferred.take() {
            (pending.cb)(Ok(()));
        }
    }
}
