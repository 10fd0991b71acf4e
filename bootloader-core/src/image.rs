//! Turns an Intel HEX file into the ordered sequence of binary segments the
//! Programming Driver consumes.

use ihex::{Reader, Record};

use crate::error::BootloaderError;

/// One contiguous byte run, in ascending base-address order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub base_address: u32,
    pub data: Vec<u8>,
}

/// Parse Intel HEX source text into the Image model's ordered segments.
///
/// Each maximal run of contiguous data-record bytes becomes one segment;
/// `:02` (extended segment address) and `:04` (extended linear address)
/// records relocate subsequent data records before they're appended.
pub fn parse(source: &str) -> Result<Vec<Vec<u8>>, BootloaderError> {
    let mut runs: Vec<Segment> = Vec::new();
    let mut upper_address: u32 = 0;
    let mut saw_eof = false;

    for record in Reader::new(source) {
        let record = record.map_err(|e| BootloaderError::ImageParse(e.to_string()))?;

        match record {
            Record::Data { offset, value } => {
                let address = upper_address + offset as u32;
                append(&mut runs, address, value);
            }
            Record::ExtendedSegmentAddress(segment) => {
                upper_address = (segment as u32) << 4;
            }
            Record::ExtendedLinearAddress(linear) => {
                upper_address = (linear as u32) << 16;
            }
            Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {}
            Record::EndOfFile => {
                saw_eof = true;
                break;
            }
        }
    }

    if !saw_eof {
        return Err(BootloaderError::ImageParse(
            "Intel HEX source is missing an end-of-file record".to_string(),
        ));
    }

    runs.sort_by_key(|s| s.base_address);
    Ok(runs.into_iter().map(|s| s.data).collect())
}

fn append(runs: &mut Vec<Segment>, address: u32, data: Vec<u8>) {
    if let Some(last) = runs.last_mut() {
        if last.base_address + last.data.len() as u32 == address {
            last.data.extend(data);
            return;
        }
    }
    runs.push(Segment { base_address: address, data });
}
