use thiserror::Error;

/// Everything that can go wrong talking to the bootloader.
#[derive(Error, Debug)]
pub enum BootloaderError {
    #[error("malformed frame: {0}")]
    BadFormat(String),

    #[error("no response after {attempts} attempts while sending {subject:?}")]
    NoResponse { attempts: u32, subject: u8 },

    #[error("target reported failure (type {0}) while sending")]
    ProtocolError(u8),

    #[error("written page {written} does not match requested page {requested}")]
    PageMismatch { requested: u16, written: u16 },

    #[error("image requires {needed} pages but target only has {available}")]
    ImageTooLarge { needed: u32, available: u32 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("CAN transport error: {0}")]
    Transport(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("could not parse image: {0}")]
    ImageParse(String),
}
