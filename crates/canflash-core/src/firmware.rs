//! Firmware image loading.
//!
//! Turns an Intel-HEX file into the flat byte sequence the transfer sends.
//! Data is laid out by absolute address from the lowest to the highest byte
//! written; holes are filled with `0xFF` (erased flash).

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::protocol::constants::CHUNK_SIZE;

/// Fill value for address gaps between records.
pub const GAP_FILL: u8 = 0xFF;
/// Largest address span accepted from a hex file.
pub const MAX_IMAGE_SPAN: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("Intel HEX parse error: {0}")]
    Parse(String),
    #[error("Firmware contains no data")]
    Empty,
    #[error("Image spans {span} bytes, limit is {limit}")]
    TooLarge { span: usize, limit: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable firmware bytes plus the address of the first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
    base_address: u32,
}

impl FirmwareImage {
    /// Wrap raw bytes (a `.bin` image).
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, FirmwareError> {
        if data.is_empty() {
            return Err(FirmwareError::Empty);
        }
        Ok(Self {
            data,
            base_address: 0,
        })
    }

    /// Parse Intel-HEX text.
    pub fn from_ihex(text: &str) -> Result<Self, FirmwareError> {
        let mut segments: Vec<(u32, Vec<u8>)> = Vec::new();
        let mut upper: u32 = 0;

        for record in ihex::Reader::new(text) {
            match record.map_err(|e| FirmwareError::Parse(e.to_string()))? {
                ihex::Record::Data { offset, value } => {
                    let address = upper.wrapping_add(offset as u32);
                    if !value.is_empty() {
                        segments.push((address, value));
                    }
                }
                ihex::Record::ExtendedLinearAddress(high) => {
                    upper = (high as u32) << 16;
                    debug!(base = %format!("0x{:08X}", upper), "Extended linear address");
                }
                ihex::Record::ExtendedSegmentAddress(segment) => {
                    upper = (segment as u32) << 4;
                    debug!(base = %format!("0x{:08X}", upper), "Extended segment address");
                }
                ihex::Record::EndOfFile => break,
                _ => {
                    // Start address records do not carry image data
                }
            }
        }

        let Some(low) = segments.iter().map(|(addr, _)| *addr).min() else {
            return Err(FirmwareError::Empty);
        };
        let high = segments
            .iter()
            .map(|(addr, bytes)| *addr as u64 + bytes.len() as u64)
            .max()
            .unwrap_or(low as u64);
        let span = (high - low as u64) as usize;
        if span > MAX_IMAGE_SPAN {
            return Err(FirmwareError::TooLarge {
                span,
                limit: MAX_IMAGE_SPAN,
            });
        }

        let mut data = vec![GAP_FILL; span];
        for (address, bytes) in &segments {
            let start = (address - low) as usize;
            data[start..start + bytes.len()].copy_from_slice(bytes);
        }

        Ok(Self {
            data,
            base_address: low,
        })
    }

    /// Load `path`: Intel-HEX unless the extension is `.bin`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FirmwareError> {
        let path = path.as_ref();
        let is_bin = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bin"));

        let image = if is_bin {
            Self::from_bytes(std::fs::read(path)?)?
        } else {
            Self::from_ihex(&std::fs::read_to_string(path)?)?
        };

        info!(
            bytes = image.len(),
            base = %format!("0x{:08X}", image.base_address),
            "Firmware loaded"
        );
        Ok(image)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Address of the first byte in the source file.
    pub fn base_address(&self) -> u32 {
        self.base_address
    }

    /// Number of transfer frames the image needs.
    pub fn chunk_count(&self) -> usize {
        self.data.len().div_ceil(CHUNK_SIZE)
    }
}

impl AsRef<[u8]> for FirmwareImage {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(records: &[ihex::Record]) -> String {
        ihex::create_object_file_representation(records).unwrap()
    }

    #[test]
    fn test_single_record() {
        let text = hex(&[
            ihex::Record::Data {
                offset: 0x0100,
                value: vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE],
            },
            ihex::Record::EndOfFile,
        ]);
        let image = FirmwareImage::from_ihex(&text).unwrap();
        assert_eq!(image.as_bytes(), &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        assert_eq!(image.base_address(), 0x0100);
        assert_eq!(image.chunk_count(), 2);
    }

    #[test]
    fn test_gap_filled_with_ff() {
        let text = hex(&[
            ihex::Record::Data {
                offset: 0x0000,
                value: vec![0x01, 0x02],
            },
            ihex::Record::Data {
                offset: 0x0004,
                value: vec![0x05],
            },
            ihex::Record::EndOfFile,
        ]);
        let image = FirmwareImage::from_ihex(&text).unwrap();
        assert_eq!(image.as_bytes(), &[0x01, 0x02, 0xFF, 0xFF, 0x05]);
    }

    #[test]
    fn test_extended_linear_address() {
        let text = hex(&[
            ihex::Record::ExtendedLinearAddress(0x0800),
            ihex::Record::Data {
                offset: 0x0000,
                value: vec![0x10, 0x20],
            },
            ihex::Record::StartLinearAddress(0x0800_0000),
            ihex::Record::EndOfFile,
        ]);
        let image = FirmwareImage::from_ihex(&text).unwrap();
        assert_eq!(image.base_address(), 0x0800_0000);
        assert_eq!(image.len(), 2);
    }

    #[test]
    fn test_records_out_of_order() {
        let text = hex(&[
            ihex::Record::Data {
                offset: 0x0002,
                value: vec![0x03, 0x04],
            },
            ihex::Record::Data {
                offset: 0x0000,
                value: vec![0x01, 0x02],
            },
            ihex::Record::EndOfFile,
        ]);
        let image = FirmwareImage::from_ihex(&text).unwrap();
        assert_eq!(image.as_bytes(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_empty_hex_rejected() {
        let text = hex(&[ihex::Record::EndOfFile]);
        assert!(matches!(
            FirmwareImage::from_ihex(&text),
            Err(FirmwareError::Empty)
        ));
    }

    #[test]
    fn test_malformed_hex_rejected() {
        assert!(matches!(
            FirmwareImage::from_ihex(":10000000ZZ\n"),
            Err(FirmwareError::Parse(_))
        ));
    }

    #[test]
    fn test_load_hex_and_bin_files() {
        let dir = tempfile::tempdir().unwrap();

        let hex_path = dir.path().join("app.hex");
        std::fs::write(
            &hex_path,
            hex(&[
                ihex::Record::Data {
                    offset: 0,
                    value: vec![0xDE, 0xAD],
                },
                ihex::Record::EndOfFile,
            ]),
        )
        .unwrap();
        assert_eq!(FirmwareImage::load(&hex_path).unwrap().as_bytes(), &[0xDE, 0xAD]);

        let bin_path = dir.path().join("app.BIN");
        std::fs::write(&bin_path, [1u8, 2, 3]).unwrap();
        assert_eq!(FirmwareImage::load(&bin_path).unwrap().as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_from_bytes_rejects_empty() {
        assert!(FirmwareImage::from_bytes(Vec::new()).is_err());
    }
}
