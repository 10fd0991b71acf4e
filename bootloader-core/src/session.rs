//! Numbered request/response engine: retries, timeouts, and sequence
//! resynchronization on top of the raw frame codec.

use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;

use crate::can::CanInterface;
use crate::error::BootloaderError;
use crate::message::{BootloaderMessage, MessageType, START_OF_MESSAGE_MASK};

/// Default `counter` value: a single, self-contained request.
pub const DEFAULT_COUNTER: u8 = START_OF_MESSAGE_MASK;

/// One host-side programming run against one board.
///
/// Owns the message numbering and the inbox the Dispatcher feeds. There is
/// never more than one outstanding request: `send` is not reentrant and is
/// always called from the driver thread.
pub struct Session<'a, C: CanInterface> {
    board_id: u8,
    msg_number: u8,
    inbox: Receiver<BootloaderMessage>,
    interface: &'a C,
}

impl<'a, C: CanInterface> Session<'a, C> {
    pub fn new(board_id: u8, interface: &'a C, inbox: Receiver<BootloaderMessage>) -> Self {
        Session {
            board_id,
            msg_number: 0,
            inbox,
            interface,
        }
    }

    pub fn msg_number(&self) -> u8 {
        self.msg_number
    }

    fn drain_inbox(&self) {
        while self.inbox.try_recv().is_ok() {}
    }

    fn transmit(&self, message: &BootloaderMessage) -> Result<(), BootloaderError> {
        log::trace!("> {:?}", message);
        self.interface.send(&message.encode()).map_err(BootloaderError::Transport)
    }

    /// Issue one request, subject to the `response`/`timeout`/`attempts`
    /// contract described in the request engine's public operation.
    ///
    /// Default payload is empty, built fresh on every call -- no shared
    /// mutable default hiding state across invocations.
    #[allow(clippy::too_many_arguments)]
    pub fn send(
        &mut self,
        subject: u8,
        data: Vec<u8>,
        counter: u8,
        response: bool,
        timeout: Duration,
        attempts: u32,
    ) -> Result<Option<BootloaderMessage>, BootloaderError> {
        let mut message = BootloaderMessage::request(self.board_id, subject, self.msg_number, counter, data);

        if !response {
            self.transmit(&message)?;
            self.msg_number = self.msg_number.wrapping_add(1);
            return Ok(None);
        }

        self.drain_inbox();

        let mut repeats: u32 = 0;

        'retransmit: loop {
            self.transmit(&message)?;

            // Inner loop: keep waiting (without resending) as long as what
            // arrives is for some other, stale request.
            loop {
                match self.inbox.recv_timeout(timeout) {
                    Err(_elapsed) => {
                        repeats += 1;
                        if attempts > 0 && repeats >= attempts {
                            return Err(BootloaderError::NoResponse { attempts: repeats, subject });
                        }
                        log::debug!("timeout waiting for subject {}, retry {}", subject, repeats);
                        continue 'retransmit;
                    }
                    Ok(incoming) => {
                        if incoming.subject != message.subject {
                            log::debug!(
                                "discarding stale message (subject {}, number {:#x}), expecting subject {}",
                                incoming.subject,
                                incoming.number,
                                message.subject
                            );
                            continue;
                        }

                        match incoming.message_type {
                            MessageType::Success => {
                                self.drain_inbox();
                                self.msg_number = self.msg_number.wrapping_add(1);
                                return Ok(Some(incoming));
                            }
                            MessageType::WrongNumber => {
                                log::warn!(
                                    "wrong message number (board expects {:#x}, we sent {:#x})",
                                    incoming.number,
                                    message.number
                                );

                                if message.number == 0 {
                                    self.msg_number = incoming.number;
                                    message.number = self.msg_number;
                                    thread::sleep(Duration::from_millis(100));
                                    self.drain_inbox();
                                }

                                repeats += 1;
                                if attempts > 0 && repeats >= attempts {
                                    return Err(BootloaderError::NoResponse { attempts: repeats, subject });
                                }
                                continue 'retransmit;
                            }
                            MessageType::Error | MessageType::Request => {
                                return Err(BootloaderError::ProtocolError(incoming.message_type as u8));
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::Frame;
    use std::sync::mpsc::{sync_channel, SyncSender};
    use std::sync::Mutex;

    struct MockInterface {
        sent: Mutex<Vec<Frame>>,
    }

    impl MockInterface {
        fn new() -> Self {
            MockInterface {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl CanInterface for MockInterface {
        fn send(&self, frame: &Frame) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.sent.lock().unwrap().push(frame.clone());
            Ok(())
        }

        fn add_filter(&self, _filter: crate::can::Filter) {}
    }

    fn success(board_id: u8, subject: u8, number: u8, data: Vec<u8>) -> BootloaderMessage {
        BootloaderMessage {
            board_id,
            message_type: MessageType::Success,
            subject,
            number,
            data_counter: 0x80,
            data,
        }
    }

    fn session_with_inbox(iface: &MockInterface) -> (Session<'_, MockInterface>, SyncSender<BootloaderMessage>) {
        let (tx, rx) = sync_channel(16);
        (Session::new(0x05, iface, rx), tx)
    }

    /// Delivers `msg` shortly after this call returns, emulating the
    /// Dispatcher, which only enqueues a reply after the request has
    /// actually been transmitted. Queuing synchronously before `send` is
    /// called would just have `drain_inbox` discard it.
    fn reply_after(tx: &SyncSender<BootloaderMessage>, delay: Duration, msg: BootloaderMessage) {
        let tx = tx.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = tx.send(msg);
        });
    }

    #[test]
    fn sequence_monotonicity() {
        let iface = MockInterface::new();
        let (mut session, tx) = session_with_inbox(&iface);

        for n in 0..5u8 {
            reply_after(&tx, Duration::from_millis(5), success(0x05, 3, n, vec![]));
            session
                .send(3, vec![], DEFAULT_COUNTER, true, Duration::from_millis(50), 2)
                .unwrap();
        }

        assert_eq!(session.msg_number(), 5);
    }

    #[test]
    fn fire_and_forget_advances_number_and_returns_none() {
        let iface = MockInterface::new();
        let (mut session, _tx) = session_with_inbox(&iface);

        let result = session
            .send(3, vec![1, 2, 3, 4], 0x3e, false, Duration::from_millis(50), 1)
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(session.msg_number(), 1);
    }

    #[test]
    fn resync_only_at_session_start() {
        let iface = MockInterface::new();
        let (mut session, tx) = session_with_inbox(&iface);

        reply_after(
            &tx,
            Duration::from_millis(20),
            BootloaderMessage {
                board_id: 0x05,
                message_type: MessageType::WrongNumber,
                subject: 1,
                number: 0x42,
                data_counter: 0,
                data: vec![],
            },
        );
        // Resync sleeps 100ms and drains before retransmitting, so this must
        // land comfortably after that to avoid being drained itself.
        reply_after(
            &tx,
            Duration::from_millis(300),
            success(0x05, 1, 0x42, vec![0x12, 0x02, 0x00, 0x80]),
        );

        session
            .send(1, vec![], DEFAULT_COUNTER, true, Duration::from_millis(400), 3)
            .unwrap();

        assert_eq!(session.msg_number(), 0x43);
    }

    #[test]
    fn no_response_fails_after_attempts_exhausted() {
        let iface = MockInterface::new();
        let (mut session, _tx) = session_with_inbox(&iface);

        let err = session
            .send(1, vec![], DEFAULT_COUNTER, true, Duration::from_millis(10), 2)
            .unwrap_err();

        assert!(matches!(err, BootloaderError::NoResponse { attempts: 2, .. }));
        assert_eq!(session.msg_number(), 0);
    }

    #[test]
    fn protocol_error_surfaces_and_leaves_number_unchanged() {
        let iface = MockInterface::new();
        let (mut session, tx) = session_with_inbox(&iface);

        reply_after(
            &tx,
            Duration::from_millis(5),
            BootloaderMessage {
                board_id: 0x05,
                message_type: MessageType::Error,
                subject: 1,
                number: 0,
                data_counter: 0,
                data: vec![],
            },
        );

        let err = session
            .send(1, vec![], DEFAULT_COUNTER, true, Duration::from_millis(50), 2)
            .unwrap_err();

        assert!(matches!(err, BootloaderError::ProtocolError(_)));
        assert_eq!(session.msg_number(), 0);
    }

    #[test]
    fn stale_subject_is_discarded() {
        let iface = MockInterface::new();
        let (mut session, tx) = session_with_inbox(&iface);

        reply_after(&tx, Duration::from_millis(5), success(0x05, 2, 0, vec![])); // stale: different subject
        reply_after(&tx, Duration::from_millis(10), success(0x05, 1, 0, vec![0xaa]));

        let result = session
            .send(1, vec![], DEFAULT_COUNTER, true, Duration::from_millis(200), 3)
            .unwrap();

        assert_eq!(result.unwrap().data, vec![0xaa]);
    }
}
