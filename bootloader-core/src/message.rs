//! Wire framing: a fixed 4-byte header plus up to 4 bytes of payload, carried
//! in the 8-byte data field of a standard CAN frame.

use crate::can::Frame;
use crate::error::BootloaderError;

/// 11-bit id used for every host->target frame.
pub const BOOTLOADER_CAN_IDENTIFIER: u32 = 0x7ff;
/// 11-bit id used for every target->host frame.
pub const BOOTLOADER_RESPONSE_IDENTIFIER: u32 = 0x7fe;

/// High bit of `data_counter` for DATA frames: marks the first frame of a block.
pub const START_OF_MESSAGE_MASK: u8 = 0x80;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Success = 1,
    Error = 2,
    WrongNumber = 3,
}

impl MessageType {
    fn from_bits(bits: u8) -> MessageType {
        match bits & 0x3 {
            0 => MessageType::Request,
            1 => MessageType::Success,
            2 => MessageType::Error,
            _ => MessageType::WrongNumber,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageSubject {
    Identify = 1,
    SetAddress = 2,
    Data = 3,
    StartApplication = 4,
    GetFusebits = 5,
    ChipErase = 6,
}

impl MessageSubject {
    fn from_bits(bits: u8) -> Option<MessageSubject> {
        Some(match bits {
            1 => MessageSubject::Identify,
            2 => MessageSubject::SetAddress,
            3 => MessageSubject::Data,
            4 => MessageSubject::StartApplication,
            5 => MessageSubject::GetFusebits,
            6 => MessageSubject::ChipErase,
            _ => return None,
        })
    }
}

/// In-memory representation of a bootloader protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderMessage {
    pub board_id: u8,
    pub message_type: MessageType,
    /// Raw subject byte. Kept raw (rather than `MessageSubject`) because the
    /// codec must never fail on an unrecognized subject -- interpreting it is
    /// the Session's job, not the codec's.
    pub subject: u8,
    pub number: u8,
    pub data_counter: u8,
    pub data: Vec<u8>,
}

impl BootloaderMessage {
    pub fn request(board_id: u8, subject: u8, number: u8, data_counter: u8, data: Vec<u8>) -> Self {
        BootloaderMessage {
            board_id,
            message_type: MessageType::Request,
            subject,
            number,
            data_counter,
            data,
        }
    }

    pub fn subject_enum(&self) -> Option<MessageSubject> {
        MessageSubject::from_bits(self.subject)
    }

    /// Encode into an outbound host->target CAN frame.
    pub fn encode(&self) -> Frame {
        let mut data = Vec::with_capacity(4 + self.data.len());
        data.push(self.board_id);
        data.push(((self.message_type as u8) << 6) | (self.subject & 0x3f));
        data.push(self.number);
        data.push(self.data_counter);
        data.extend_from_slice(&self.data);

        Frame::new(BOOTLOADER_CAN_IDENTIFIER, data, false, false)
    }

    /// Decode a target->host CAN frame.
    pub fn decode(frame: &Frame) -> Result<Self, BootloaderError> {
        if frame.extended || frame.rtr || frame.data.len() < 4 {
            return Err(BootloaderError::BadFormat(format!(
                "expected a standard, non-RTR frame with >= 4 data bytes, got {:?}",
                frame
            )));
        }

        Ok(BootloaderMessage {
            board_id: frame.data[0],
            message_type: MessageType::from_bits(frame.data[1] >> 6),
            subject: frame.data[1] & 0x3f,
            number: frame.data[2],
            data_counter: frame.data[3],
            data: frame.data[4..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let msg = BootloaderMessage {
            board_id: 0x05,
            message_type: MessageType::Success,
            subject: MessageSubject::Identify as u8,
            number: 0x2a,
            data_counter: 0x80,
            data: vec![0x12, 0x02, 0x00, 0x80],
        };

        let frame = msg.encode();
        let decoded = BootloaderMessage::decode(&frame).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn header_packing() {
        for t in 0..4u8 {
            for s in 0..64u8 {
                let header = (t << 6) | s;
                assert_eq!(header >> 6, t);
                assert_eq!(header & 0x3f, s);
            }
        }
    }

    #[test]
    fn identify_decode_matches_header_layout() {
        let frame = Frame::new(
            BOOTLOADER_RESPONSE_IDENTIFIER,
            vec![0x05, 0x41, 0x00, 0x80, 0x12, 0x02, 0x00, 0x80],
            false,
            false,
        );

        let msg = BootloaderMessage::decode(&frame).unwrap();
        assert_eq!(msg.board_id, 0x05);
        assert_eq!(msg.message_type, MessageType::Success);
        assert_eq!(msg.subject, MessageSubject::Identify as u8);
        assert_eq!(msg.data, vec![0x12, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn decode_rejects_extended() {
        let frame = Frame::new(BOOTLOADER_RESPONSE_IDENTIFIER, vec![0; 4], true, false);
        assert!(BootloaderMessage::decode(&frame).is_err());
    }

    #[test]
    fn decode_rejects_rtr() {
        let frame = Frame::new(BOOTLOADER_RESPONSE_IDENTIFIER, vec![0; 4], false, true);
        assert!(BootloaderMessage::decode(&frame).is_err());
    }

    #[test]
    fn decode_rejects_short_frame() {
        let frame = Frame::new(BOOTLOADER_RESPONSE_IDENTIFIER, vec![0; 3], false, false);
        assert!(BootloaderMessage::decode(&frame).is_err());
    }

    #[test]
    fn decode_never_fails_on_unknown_subject() {
        let frame = Frame::new(
            BOOTLOADER_RESPONSE_IDENTIFIER,
            vec![0x05, 0x3f, 0x00, 0x00],
            false,
            false,
        );
        let msg = BootloaderMessage::decode(&frame).unwrap();
        assert_eq!(msg.subject_enum(), None);
    }
}
