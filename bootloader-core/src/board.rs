//! Parameters of the attached target, populated by `identify()`.

use std::fmt;

/// Converts the `pagesize` code in IDENTIFY response byte 1 into bytes.
pub fn pagesize_from_code(code: u8) -> Option<u16> {
    match code {
        0 => Some(32),
        1 => Some(64),
        2 => Some(128),
        3 => Some(256),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Board {
    pub id: u8,
    pub connected: bool,
    pub bootloader_type: u8,
    pub version: u8,
    pub pagesize: u16,
    pub pages: u16,
}

impl Board {
    pub fn new(id: u8) -> Self {
        Board {
            id,
            connected: false,
            bootloader_type: 0,
            version: 0,
            pagesize: 0,
            pages: 0,
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.connected {
            write!(
                f,
                "board id 0x{:02x} (T{}) v{}, {} pages [{} byte]",
                self.id, self.bootloader_type, self.version, self.pages, self.pagesize
            )
        } else {
            write!(f, "board id 0x{:02x} (not connected)", self.id)
        }
    }
}
