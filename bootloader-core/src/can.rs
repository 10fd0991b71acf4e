//! The CAN transport contract the core programs against.
//!
//! The core never talks to a bus directly. It is handed something that
//! implements [`CanInterface`] and drives it through [`CanInterface::send`]
//! and [`CanInterface::add_filter`]. The `bootloader-can` crate provides a
//! concrete implementation on top of `socketcan`; tests use an in-memory one.

/// A single CAN frame, independent of any particular bus driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub data: Vec<u8>,
    pub extended: bool,
    pub rtr: bool,
}

impl Frame {
    pub fn new(id: u32, data: Vec<u8>, extended: bool, rtr: bool) -> Self {
        Frame {
            id,
            data,
            extended,
            rtr,
        }
    }
}

/// A predicate + callback pair registered with a [`CanInterface`].
///
/// The interface invokes `callback` with every inbound frame for which
/// `predicate` returns true, on its own delivery thread. The Dispatcher
/// builds one of these and hands it to the interface, rather than the
/// interface reaching back into the Dispatcher through a captured closure.
pub struct Filter {
    pub predicate: Box<dyn Fn(&Frame) -> bool + Send>,
    pub callback: Box<dyn Fn(Frame) + Send>,
}

/// External collaborator: raw CAN send/receive, bus arbitration, driver.
pub trait CanInterface {
    fn send(&self, frame: &Frame) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Register a filter. The interface must invoke the callback on its
    /// delivery thread for every inbound frame matching the predicate, and
    /// must not let a slow callback stall the thread beyond that one call.
    fn add_filter(&self, filter: Filter);
}
