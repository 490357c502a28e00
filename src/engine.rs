//! Single-threaded event loop driving one [`Adapter`].
//!
//! Transport requests, hardware completions and timer expiries all funnel
//! through one mpsc channel, so component code never needs interior
//! mutability or locking. The [`AdapterHandle`] is the cloneable sending
//! side used by transport and backend glue.

use std::time::Instant;

use tokio::runtime::Builder;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::adapter::{Adapter, AdapterProperties, Reply};
use crate::api::HardwareEvent;
use crate::authorization::AuthCallback;
use crate::common::{Address, Error};
use crate::mode::Mode;
use crate::session::OwnerId;

const EVENT_CHANNEL_BUF_SIZE: usize = 100;

/// Requests accepted from the transport layer. Variants that finish
/// asynchronously carry a reply channel completed by the adapter.
pub enum Request {
    GetProperties {
        reply: oneshot::Sender<AdapterProperties>,
    },
    SetName {
        name: String,
        reply: Reply,
    },
    SetPowered {
        powered: bool,
        reply: Reply,
    },
    SetDiscoverable {
        discoverable: bool,
        reply: Reply,
    },
    SetPairable {
        pairable: bool,
        reply: Reply,
    },
    SetDiscoverableTimeout {
        seconds: u32,
        reply: Reply,
    },
    SetPairableTimeout {
        seconds: u32,
        reply: Reply,
    },
    RequestSession {
        owner: OwnerId,
        mode: Mode,
        reply: Reply,
    },
    ReleaseSession {
        owner: OwnerId,
        reply: Reply,
    },
    StartDiscovery {
        owner: OwnerId,
        reply: Reply,
    },
    StopDiscovery {
        owner: OwnerId,
        reply: Reply,
    },
    ConfirmModeChange {
        owner: OwnerId,
        accepted: bool,
    },
    RegisterAgent {
        agent: Box<dyn crate::api::PairingAgent + Send>,
        reply: Reply,
    },
    UnregisterAgent {
        reply: Reply,
    },
    Authorize {
        peer: Address,
        service: String,
        cb: AuthCallback,
        reply: Reply,
    },
    AuthorizeComplete {
        peer: Address,
        result: Result<(), Error>,
    },
    CancelAuthorize {
        peer: Address,
        reply: Reply,
    },
}

pub enum AdapterEvent {
    Request(Request),
    Hardware(HardwareEvent),
    OwnerDisconnected(OwnerId),
    Shutdown,
}

/// Sending side handed to the transport layer and the hardware backend.
#[derive(Clone)]
pub struct AdapterHandle {
    tx: mpsc::Sender<AdapterEvent>,
}

impl AdapterHandle {
    pub async fn request(&self, request: Request) -> Result<(), Error> {
        self.tx
            .send(AdapterEvent::Request(request))
            .await
            .map_err(|_| Error::Failed("adapter engine stopped".into()))
    }

    pub async fn hardware_event(&self, event: HardwareEvent) -> Result<(), Error> {
        self.tx
            .send(AdapterEvent::Hardware(event))
            .await
            .map_err(|_| Error::Failed("adapter engine stopped".into()))
    }

    pub async fn owner_disconnected(&self, owner: OwnerId) -> Result<(), Error> {
        self.tx
            .send(AdapterEvent::OwnerDisconnected(owner))
            .await
            .map_err(|_| Error::Failed("adapter engine stopped".into()))
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(AdapterEvent::Shutdown).await;
    }

    /// Blocking variant for backend callbacks arriving off-runtime.
    pub fn blocking_hardware_event(&self, event: HardwareEvent) -> Result<(), Error> {
        self.tx
            .blocking_send(AdapterEvent::Hardware(event))
            .map_err(|_| Error::Failed("adapter engine stopped".into()))
    }
}

pub struct AdapterEngine {
    adapter: Adapter,
    rx: mpsc::Receiver<AdapterEvent>,
}

impl AdapterEngine {
    pub fn new(adapter: Adapter) -> (Self, AdapterHandle) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUF_SIZE);
        (AdapterEngine { adapter, rx }, AdapterHandle { tx })
    }

    /// Runs the event loop to completion on a dedicated current-thread
    /// runtime.
    pub fn run(mut self) {
        info!(index = self.adapter.index(), "adapter engine starting");
        let runtime = match Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "adapter engine runtime unavailable");
                return;
            }
        };

        runtime.block_on(self.poll_events());
    }

    /// Event loop body, also usable from an existing runtime.
    pub async fn poll_events(&mut self) {
        loop {
            let event = match self.adapter.next_timer_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        event = self.rx.recv() => event,
                        _ = tokio::time::sleep_until(deadline.into()) => {
                            self.adapter.fire_due_timers(Instant::now());
                            self.adapter.run_deferred();
                            continue;
                        }
                    }
                }
                None => self.rx.recv().await,
            };

            let Some(event) = event else {
                debug!("all adapter handles dropped");
                break;
            };

            match event {
                AdapterEvent::Request(request) => self.process_request(request),
                AdapterEvent::Hardware(event) => self.adapter.handle_hardware_event(event),
                AdapterEvent::OwnerDisconnected(owner) => {
                    self.adapter.owner_disconnected(&owner)
                }
                AdapterEvent::Shutdown => {
                    info!("adapter engine stopped");
                    break;
                }
            }

            self.adapter.run_deferred();
        }
    }

    fn process_request(&mut self, request: Request) {
        match request {
            Request::GetProperties { reply } => {
                let _ = reply.send(self.adapter.get_properties());
            }
            Request::SetName { name, reply } => {
                let _ = reply.send(self.adapter.set_name(&name));
            }
            Request::SetPowered { powered, reply } => {
                let _ = reply.send(self.adapter.set_powered(powered));
            }
            Request::SetDiscoverable {
                discoverable,
                reply,
            } => {
                // Deferred: the reply completes when the controller
                // confirms the new scan settings.
                let _ = self.adapter.set_discoverable(discoverable, Some(reply));
            }
            Request::SetPairable { pairable, reply } => {
                let _ = reply.send(self.adapter.set_pairable(pairable));
            }
            Request::SetDiscoverableTimeout { seconds, reply } => {
                let _ = reply.send(self.adapter.set_discoverable_timeout(seconds));
            }
            Request::SetPairableTimeout { seconds, reply } => {
                let _ = reply.send(self.adapter.set_pairable_timeout(seconds));
            }
            Request::RequestSession { owner, mode, reply } => {
                self.adapter.request_mode_session(owner, mode, reply);
            }
            Request::ReleaseSession { owner, reply } => {
                let _ = reply.send(self.adapter.release_mode_session(&owner));
            }
            Request::StartDiscovery { owner, reply } => {
                let _ = reply.send(self.adapter.start_discovery(owner));
            }
            Request::StopDiscovery { owner, reply } => {
                let _ = reply.send(self.adapter.stop_discovery(&owner));
            }
            Request::ConfirmModeChange { owner, accepted } => {
                self.adapter.agent_confirm_complete(&owner, accepted);
            }
            Request::RegisterAgent { agent, reply } => {
                let _ = reply.send(self.adapter.register_agent(agent));
            }
            Request::UnregisterAgent { reply } => {
                let _ = reply.send(self.adapter.unregister_agent());
            }
            Request::Authorize {
                peer,
                service,
                cb,
                reply,
            } => {
                let _ = reply.send(self.adapter.authorize(peer, &service, cb));
            }
            Request::AuthorizeComplete { peer, result } => {
                self.adapter.agent_authorize_complete(peer, result);
            }
            Request::CancelAuthorize { peer, reply } => {
                let _ = reply.send(self.adapter.cancel_authorize(peer));
            }
        }
    }
}
