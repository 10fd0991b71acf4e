//! Adaptive block-streaming for filling one flash page.

use std::thread;
use std::time::Duration;

use crate::can::CanInterface;
use crate::error::BootloaderError;
use crate::message::{MessageSubject, START_OF_MESSAGE_MASK};
use crate::session::Session;

const INITIAL_BLOCKSIZE: u32 = 64;
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_ATTEMPTS: u32 = 2;
const BACKOFF_SLEEP: Duration = Duration::from_millis(300);

/// Fill flash page `page` with `data` (padded up to `pagesize` bytes with
/// `0xff`), skipping the SET_ADDRESS request when `address_already_set` is
/// true (the previous page completed and the target's address auto-advanced).
pub fn program_page<C: CanInterface>(
    session: &mut Session<'_, C>,
    page: u16,
    data: &[u8],
    pagesize: u16,
    mut address_already_set: bool,
) -> Result<(), BootloaderError> {
    let mut padded = data.to_vec();
    padded.resize(pagesize as usize, 0xff);

    let mut remaining: u32 = pagesize as u32 / 4;
    let mut offset: u32 = 0;
    let mut blocksize: u32 = INITIAL_BLOCKSIZE;
    let mut last_response_data: Vec<u8> = Vec::new();

    while remaining > 0 {
        let attempt = (|| -> Result<(), BootloaderError> {
            if !address_already_set {
                let addr_data = vec![(page >> 8) as u8, (page & 0xff) as u8, 0, offset as u8];
                session.send(
                    MessageSubject::SetAddress as u8,
                    addr_data,
                    START_OF_MESSAGE_MASK,
                    true,
                    DEFAULT_TIMEOUT,
                    DEFAULT_ATTEMPTS,
                )?;
            }

            let block = blocksize.min(remaining);

            if block == 1 {
                let chunk = unit(&padded, offset);
                let response = session.send(
                    MessageSubject::Data as u8,
                    chunk,
                    START_OF_MESSAGE_MASK,
                    true,
                    DEFAULT_TIMEOUT,
                    DEFAULT_ATTEMPTS,
                )?;
                last_response_data = response.map(|m| m.data).unwrap_or_default();
            } else {
                let mut i = offset;

                session.send(
                    MessageSubject::Data as u8,
                    unit(&padded, i),
                    START_OF_MESSAGE_MASK | (block - 1) as u8,
                    false,
                    DEFAULT_TIMEOUT,
                    DEFAULT_ATTEMPTS,
                )?;

                for k in (1..=block.saturating_sub(2)).rev() {
                    i += 1;
                    session.send(
                        MessageSubject::Data as u8,
                        unit(&padded, i),
                        k as u8,
                        false,
                        DEFAULT_TIMEOUT,
                        DEFAULT_ATTEMPTS,
                    )?;
                }

                i += 1;
                let response = session.send(
                    MessageSubject::Data as u8,
                    unit(&padded, i),
                    0,
                    true,
                    DEFAULT_TIMEOUT,
                    DEFAULT_ATTEMPTS,
                )?;
                last_response_data = response.map(|m| m.data).unwrap_or_default();
            }

            remaining -= block;
            offset += block;
            address_already_set = true;
            Ok(())
        })();

        if let Err(err) = attempt {
            if blocksize > 1 {
                blocksize /= 2;
                address_already_set = false;
                log::debug!("block failed ({}), halving block size to {}", err, blocksize);
                thread::sleep(BACKOFF_SLEEP);
                continue;
            } else {
                return Err(err);
            }
        }
    }

    let written_page = if last_response_data.len() >= 2 {
        ((last_response_data[0] as u16) << 8) | last_response_data[1] as u16
    } else {
        return Err(BootloaderError::PageMismatch { requested: page, written: u16::MAX });
    };

    if written_page != page {
        return Err(BootloaderError::PageMismatch { requested: page, written: written_page });
    }

    Ok(())
}

fn unit(data: &[u8], offset: u32) -> Vec<u8> {
    let start = (offset * 4) as usize;
    data[start..start + 4].to_vec()
}
