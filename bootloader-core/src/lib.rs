//! Host-side protocol engine for flashing AVR targets over a CAN-bus
//! resident bootloader.
//!
//! Frame codec, inbound dispatcher, request/response session, adaptive
//! page programmer, and the driver that strings them together. It never
//! touches a bus directly -- callers supply a [`can::CanInterface`]
//! implementation (see the `bootloader-can` crate for a `socketcan`-backed
//! one).

pub mod board;
pub mod can;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod image;
pub mod message;
pub mod page_programmer;
pub mod progress;
pub mod session;

pub use board::Board;
pub use can::{CanInterface, Frame};
pub use error::BootloaderError;
pub use message::BootloaderMessage;
pub use progress::{ProgressSink, ProgressState};
pub use session::Session;
