//! CRC-64-ISO checksum footer shared by the binary formats
//!
//! Files end with a 16-byte footer: the CRC of everything before it, written
//! twice (body CRC, file CRC).

use crc::{Crc, CRC_64_GO_ISO};

pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

pub const FOOTER_LEN: usize = 16;

pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Appends the footer for the bytes already in `buf`
pub fn append_footer(buf: &mut Vec<u8>) {
    let crc = checksum(buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
}

/// Outcome of checking a footer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FooterCheck {
    Valid(u64),
    Mismatch { computed: u64, stored: u64 },
    Missing,
}

/// Splits `data` into body and footer and checks the body CRC
pub fn split_footer(data: &[u8]) -> (&[u8], FooterCheck) {
    if data.len() < FOOTER_LEN {
        return (data, FooterCheck::Missing);
    }
    let (body, footer) = data.split_at(data.len() - FOOTER_LEN);
    let mut stored = [0u8; 8];
    stored.copy_from_slice(&footer[..8]);
    let stored = u64::from_le_bytes(stored);
    let computed = checksum(body);
    let check = if computed == stored {
        FooterCheck::Valid(computed)
    } else {
        FooterCheck::Mismatch { computed, stored }
    };
    (body, check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_roundtrip() {
        let mut buf = b"hello world".to_vec();
        append_footer(&mut buf);
        assert_eq!(buf.len(), 11 + FOOTER_LEN);
        let (body, check) = split_footer(&buf);
        assert_eq!(body, b"hello world");
        assert_eq!(check, FooterCheck::Valid(checksum(b"hello world")));
    }

    #[test]
    fn flipped_byte_is_detected() {
        let mut buf = b"hello world".to_vec();
        append_footer(&mut buf);
        buf[3] ^= 0xFF;
        assert!(matches!(split_footer(&buf).1, FooterCheck::Mismatch { .. }));
        assert_eq!(split_footer(&buf[..4]).1, FooterCheck::Missing);
    }
}
