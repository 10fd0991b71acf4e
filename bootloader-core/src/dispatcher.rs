//! Filters target->host frames onto the Session's inbox.

use std::sync::mpsc::SyncSender;

use crate::can::{CanInterface, Filter, Frame};
use crate::message::{BootloaderMessage, BOOTLOADER_RESPONSE_IDENTIFIER};

/// Attaches the bootloader's inbound filter to `interface`.
///
/// Decoded, board-matched messages are pushed onto `inbox`. Anything that
/// doesn't parse, or that is addressed to a different board, is dropped
/// silently -- it indicates a malformed or unrelated bus peer, not a bug here.
pub fn attach<C: CanInterface>(interface: &C, board_id: u8, inbox: SyncSender<BootloaderMessage>) {
    let predicate = Box::new(|frame: &Frame| {
        !frame.extended && !frame.rtr && frame.id == BOOTLOADER_RESPONSE_IDENTIFIER
    });

    let callback = Box::new(move |frame: Frame| {
        let message = match BootloaderMessage::decode(&frame) {
            Ok(message) => message,
            Err(err) => {
                log::trace!("dropping malformed frame: {}", err);
                return;
            }
        };

        if message.board_id != board_id {
            log::trace!(
                "dropping frame for board 0x{:02x}, we are 0x{:02x}",
                message.board_id,
                board_id
            );
            return;
        }

        // A full inbox means the Session has fallen badly behind; drop
        // rather than block the delivery thread indefinitely.
        if inbox.try_send(message).is_err() {
            log::warn!("inbox full, dropping inbound message");
        }
    });

    interface.add_filter(Filter { predicate, callback });
}
