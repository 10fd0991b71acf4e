//! A `socketcan`-backed implementation of `bootloader_core::can::CanInterface`.
//!
//! `send` writes a frame through the socket; `add_filter` spawns the
//! interface's own delivery thread, which blocks on `read_frame` and invokes
//! matching filters inline, exactly as `CanInterface` requires.

use std::sync::{Arc, Mutex};
use std::thread;

use bootloader_core::can::{CanInterface, Filter, Frame as CoreFrame};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId};

/// Opens a SocketCAN interface (e.g. `"can0"`, `"vcan0"`) and exposes it
/// through the core's [`CanInterface`] trait.
pub struct SocketCanInterface {
    socket: Arc<CanSocket>,
    filters: Arc<Mutex<Vec<Filter>>>,
}

impl SocketCanInterface {
    pub fn open(ifname: &str) -> Result<Self, socketcan::Error> {
        let socket = CanSocket::open(ifname)?;
        let interface = SocketCanInterface {
            socket: Arc::new(socket),
            filters: Arc::new(Mutex::new(Vec::new())),
        };
        interface.spawn_delivery_thread();
        Ok(interface)
    }

    fn spawn_delivery_thread(&self) {
        let socket = Arc::clone(&self.socket);
        let filters = Arc::clone(&self.filters);

        thread::spawn(move || loop {
            let frame = match socket.read_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("CAN read error: {}", err);
                    continue;
                }
            };

            let core_frame = to_core_frame(&frame);

            let guard = filters.lock().unwrap();
            for filter in guard.iter() {
                if (filter.predicate)(&core_frame) {
                    (filter.callback)(core_frame.clone());
                }
            }
        });
    }
}

fn to_core_frame(frame: &CanFrame) -> CoreFrame {
    let (id, extended) = match frame.id() {
        Id::Standard(id) => (id.as_raw() as u32, false),
        Id::Extended(id) => (id.as_raw(), true),
    };

    CoreFrame::new(id, frame.data().to_vec(), extended, frame.is_remote_frame())
}

impl CanInterface for SocketCanInterface {
    fn send(&self, frame: &CoreFrame) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let id: Id = if frame.extended {
            ExtendedId::new(frame.id)
                .ok_or("CAN identifier does not fit in 29 bits")?
                .into()
        } else {
            StandardId::new(frame.id as u16)
                .ok_or("CAN identifier does not fit in 11 bits")?
                .into()
        };

        let can_frame = if frame.rtr {
            CanFrame::new_remote(id, frame.data.len()).ok_or("invalid remote frame")?
        } else {
            CanFrame::new(id, &frame.data).ok_or("invalid data frame")?
        };

        self.socket.write_frame(&can_frame).map_err(|e| Box::new(e) as _)
    }

    fn add_filter(&self, filter: Filter) {
        self.filters.lock().unwrap().push(filter);
    }
}

/// Composes the 29-bit RCCP reset-into-bootloader frame id directly, rather
/// than formatting and reparsing a hex string.
pub fn rccp_reset_frame(board_id: u8) -> CoreFrame {
    const SOURCE: u32 = 0xff;
    let id = (0x18 << 24) | ((board_id as u32) << 16) | (SOURCE << 8) | 0x01;
    CoreFrame::new(id, Vec::new(), true, false)
}
