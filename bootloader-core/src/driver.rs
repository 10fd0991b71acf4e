//! Orchestrates identify -> per-page loop -> start-application.

use std::time::Duration;

use crate::board::{pagesize_from_code, Board};
use crate::can::CanInterface;
use crate::error::BootloaderError;
use crate::message::MessageSubject;
use crate::page_programmer::program_page;
use crate::progress::{ProgressSink, ProgressState};
use crate::session::{Session, DEFAULT_COUNTER};

/// Default per-attempt timeout while waiting for IDENTIFY.
pub const DEFAULT_IDENTIFY_TIMEOUT: Duration = Duration::from_millis(100);
/// Default number of IDENTIFY attempts before retrying the bootloader-entry hook.
pub const DEFAULT_IDENTIFY_ATTEMPTS: u32 = 10;

/// Coaxes the target into bootloader mode. External collaborator: the
/// reference CLI sends an RCCP reset frame; tests can pass a no-op.
pub trait BootloaderEntryHook {
    fn invoke(&self) -> Result<(), BootloaderError>;
}

pub struct NoopEntryHook;

impl BootloaderEntryHook for NoopEntryHook {
    fn invoke(&self) -> Result<(), BootloaderError> {
        Ok(())
    }
}

/// Discover the target and populate `board`.
///
/// Retries indefinitely: after any `BootloaderError` from the IDENTIFY
/// request, the entry hook is re-invoked and IDENTIFY tried again, since the
/// target may simply not be in bootloader mode yet.
pub fn identify<C: CanInterface, H: BootloaderEntryHook>(
    session: &mut Session<'_, C>,
    board: &mut Board,
    hook: &H,
    timeout: Duration,
    attempts: u32,
) -> Result<(), BootloaderError> {
    loop {
        if let Err(err) = hook.invoke() {
            log::debug!("bootloader entry failed ({}), retrying", err);
            continue;
        }

        let response = session.send(
            MessageSubject::Identify as u8,
            Vec::new(),
            DEFAULT_COUNTER,
            true,
            timeout,
            attempts,
        );

        match response {
            Ok(Some(message)) => {
                let d = &message.data;
                if d.len() < 4 {
                    return Err(BootloaderError::BadFormat(format!(
                        "short IDENTIFY response: {} bytes",
                        d.len()
                    )));
                }
                board.bootloader_type = d[0] >> 4;
                board.version = d[0] & 0x0f;
                board.pagesize = pagesize_from_code(d[1]).ok_or_else(|| {
                    BootloaderError::BadFormat(format!("unknown pagesize code {}", d[1]))
                })?;
                board.pages = ((d[2] as u16) << 8) | d[3] as u16;
                board.connected = true;
                return Ok(());
            }
            Ok(None) => unreachable!("identify always awaits a response"),
            Err(err) => {
                log::debug!("identify failed ({}), retrying bootloader entry", err);
                continue;
            }
        }
    }
}

/// Program `segments` (ordered, contiguous binary runs) onto `board` and
/// start the resulting application. `board` must already be identified.
pub fn program<C: CanInterface, S: ProgressSink>(
    session: &mut Session<'_, C>,
    board: &Board,
    segments: &[Vec<u8>],
    progress: &S,
) -> Result<(), BootloaderError> {
    let total: usize = segments.iter().map(|s| s.len()).sum();
    let pagesize = board.pagesize as usize;
    let pages = (total + pagesize - 1) / pagesize.max(1);

    if pages > board.pages as usize {
        progress.report(ProgressState::Error, 0.0);
        return Err(BootloaderError::ImageTooLarge {
            needed: pages as u32,
            available: board.pages as u32,
        });
    }

    progress.report(ProgressState::Start, 0.0);

    let mut segment_index = 0usize;
    let mut offset = 0usize;

    for page in 0..pages {
        let segment = &segments[segment_index];
        let end = (offset + pagesize).min(segment.len());
        let chunk = &segment[offset..end];

        let result = program_page(session, page as u16, chunk, board.pagesize, page > 0);
        if let Err(err) = result {
            progress.report(ProgressState::Error, page as f32 / pages as f32);
            return Err(err);
        }

        offset += pagesize;
        if offset >= segment.len() {
            offset = 0;
            segment_index += 1;
        }

        progress.report(ProgressState::InProgress, page as f32 / pages as f32);
    }

    progress.report(ProgressState::End, 1.0);

    session.send(
        MessageSubject::StartApplication as u8,
        Vec::new(),
        DEFAULT_COUNTER,
        true,
        DEFAULT_IDENTIFY_TIMEOUT,
        DEFAULT_IDENTIFY_ATTEMPTS,
    )?;

    Ok(())
}

/// Runs the full sequence: report WAITING, identify, program, start.
#[allow(clippy::too_many_arguments)]
pub fn run<C: CanInterface, H: BootloaderEntryHook, S: ProgressSink>(
    session: &mut Session<'_, C>,
    board: &mut Board,
    hook: &H,
    segments: &[Vec<u8>],
    progress: &S,
    identify_timeout: Duration,
    identify_attempts: u32,
) -> Result<(), BootloaderError> {
    progress.report(ProgressState::Waiting, 0.0);
    identify(session, board, hook, identify_timeout, identify_attempts)?;
    log::info!("connected to {}", board);
    program(session, board, segments, progress)
}
