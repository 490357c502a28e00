//! Engine loop integration test: requests in through the handle, hardware
//! commands and notifications observed over channels from another thread.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;

use adapter_core::adapter::{Adapter, Capabilities, Config};
use adapter_core::api::{
    DeviceRegistry, HardwareEvent, HardwareOps, InquiryKind, ScanMode, Storage,
};
use adapter_core::common::{Address, ClassOfDevice, Error};
use adapter_core::engine::{AdapterEngine, Request};
use adapter_core::events::{EventSink, Notification, Property};
use adapter_core::mode::Mode;

#[derive(Debug, PartialEq)]
enum HwCmd {
    SetPowered(bool),
    SetConnectable,
    SetDiscoverable,
    Other,
}

struct ChannelHardware {
    cmd_tx: mpsc::Sender<HwCmd>,
}

impl ChannelHardware {
    fn send(&self, cmd: HwCmd) -> Result<(), Error> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::Failed("test observer gone".into()))
    }
}

impl HardwareOps for ChannelHardware {
    fn set_powered(&mut self, powered: bool) -> Result<(), Error> {
        self.send(HwCmd::SetPowered(powered))
    }

    fn set_connectable(&mut self) -> Result<(), Error> {
        self.send(HwCmd::SetConnectable)
    }

    fn set_discoverable(&mut self) -> Result<(), Error> {
        self.send(HwCmd::SetDiscoverable)
    }

    fn set_limited_discoverable(
        &mut self,
        _class: ClassOfDevice,
        _limited: bool,
    ) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }

    fn set_class(&mut self, _class: ClassOfDevice) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }

    fn set_name(&mut self, _name: &str) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }

    fn read_name(&mut self) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }

    fn start_inquiry(&mut self, _length: u8, _kind: InquiryKind) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }

    fn stop_inquiry(&mut self) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }

    fn start_scanning(&mut self) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }

    fn stop_scanning(&mut self) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }

    fn resolve_name(&mut self, _address: Address) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }

    fn cancel_resolve_name(&mut self, _address: Address) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }

    fn write_advertising_payload(&mut self, _data: &[u8; 240]) -> Result<(), Error> {
        self.send(HwCmd::Other)
    }
}

#[derive(Default)]
struct EmptyStorage;

impl Storage for EmptyStorage {
    fn read_mode(&self) -> Option<Mode> {
        None
    }
    fn write_mode(&mut self, _mode: Mode) {}
    fn read_on_mode(&self) -> Option<Mode> {
        None
    }
    fn read_pairable(&self) -> Option<bool> {
        None
    }
    fn write_pairable(&mut self, _pairable: bool) {}
    fn read_discoverable_timeout(&self) -> Option<u32> {
        None
    }
    fn write_discoverable_timeout(&mut self, _seconds: u32) {}
    fn read_pairable_timeout(&self) -> Option<u32> {
        None
    }
    fn write_pairable_timeout(&mut self, _seconds: u32) {}
    fn read_local_class(&self) -> Option<ClassOfDevice> {
        None
    }
    fn write_local_class(&mut self, _class: ClassOfDevice) {}
    fn read_local_name(&self) -> Option<String> {
        None
    }
    fn write_local_name(&mut self, _name: &str) {}
}

struct ChannelSink {
    event_tx: mpsc::Sender<Notification>,
}

impl EventSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        let _ = self.event_tx.send(notification);
    }
}

struct EmptyRegistry;

impl DeviceRegistry for EmptyRegistry {
    fn is_paired(&self, _address: Address) -> bool {
        false
    }
    fn is_trusted(&self, _address: Address) -> bool {
        false
    }
    fn set_authorizing(&mut self, _address: Address, _authorizing: bool) {}
}

fn wait_for(event_rx: &mpsc::Receiver<Notification>, wanted: &Notification) {
    loop {
        let event = event_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("expected notification never arrived");
        if event == *wanted {
            return;
        }
    }
}

#[test]
fn engine_round_trip() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();
    let (handle_tx, handle_rx) = mpsc::channel();

    thread::scope(|scope| {
        let engine_thread = scope.spawn(move || {
            let adapter = Adapter::new(
                0,
                "00:11:22:33:44:55".parse().unwrap(),
                Box::new(ChannelHardware { cmd_tx }),
                Box::new(EmptyStorage),
                Box::new(ChannelSink { event_tx }),
                Box::new(EmptyRegistry),
                Config::default(),
                Capabilities {
                    bredr: true,
                    le: false,
                    ext_inquiry: false,
                },
            );
            let (engine, handle) = AdapterEngine::new(adapter);
            handle_tx.send(handle).unwrap();
            engine.run();
        });

        let handle = handle_rx.recv().unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        // Power on through the request surface.
        runtime.block_on(async {
            let (tx, rx) = oneshot::channel();
            handle
                .request(Request::SetPowered {
                    powered: true,
                    reply: tx,
                })
                .await
                .unwrap();
            assert_eq!(rx.await.unwrap(), Ok(()));
        });
        assert_eq!(
            cmd_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            HwCmd::SetPowered(true)
        );

        // Hardware confirms; the powered property surfaces.
        handle
            .blocking_hardware_event(HardwareEvent::PowerComplete { powered: true })
            .unwrap();
        wait_for(
            &event_rx,
            &Notification::PropertyChanged(Property::Powered(true)),
        );
        handle
            .blocking_hardware_event(HardwareEvent::ScanModeChanged(ScanMode::Page))
            .unwrap();

        // A property snapshot reflects the new state.
        runtime.block_on(async {
            let (tx, rx) = oneshot::channel();
            handle
                .request(Request::GetProperties { reply: tx })
                .await
                .unwrap();
            let props = rx.await.unwrap();
            assert!(props.powered);
            assert!(!props.discoverable);
        });

        runtime.block_on(handle.shutdown());
        engine_thread.join().expect("engine thread crashed");
    });
}
