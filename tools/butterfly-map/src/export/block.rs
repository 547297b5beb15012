//! Length-prefixed export blocks: `[u32 count][u32 byte_len][payload]`, big-endian

use std::io::Write;

use bytes::{Buf, BufMut, BytesMut};

use super::ExportError;

/// Size of the count + byte length prefix
pub const BLOCK_HEADER_LEN: usize = 8;

/// One block being assembled in memory
#[derive(Debug, Default)]
pub struct BlockWriter {
    count: usize,
    payload: BytesMut,
}

impl BlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer for the next record; bumps the record count
    pub fn record(&mut self) -> &mut BytesMut {
        self.count += 1;
        &mut self.payload
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Writes header and payload, returning the number of bytes written
    pub fn finish<W: Write>(self, stage: &'static str, out: &mut W) -> Result<usize, ExportError> {
        let too_large = || ExportError::BlockTooLarge { stage };
        let count = u32::try_from(self.count).map_err(|_| too_large())?;
        let len = u32::try_from(self.payload.len()).map_err(|_| too_large())?;

        let mut header = [0u8; BLOCK_HEADER_LEN];
        let mut buf = &mut header[..];
        buf.put_u32(count);
        buf.put_u32(len);
        out.write_all(&header)?;
        out.write_all(&self.payload)?;
        Ok(BLOCK_HEADER_LEN + self.payload.len())
    }
}

/// A block read back from an export stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock<'a> {
    pub count: u32,
    pub payload: &'a [u8],
}

impl RawBlock<'_> {
    /// Payload split into big-endian `u32` words
    pub fn words(&self) -> Vec<u32> {
        let mut buf = self.payload;
        let mut words = Vec::with_capacity(buf.len() / 4);
        while buf.remaining() >= 4 {
            words.push(buf.get_u32());
        }
        words
    }
}

/// Splits an export stream into its blocks
pub fn split_blocks(mut data: &[u8]) -> Result<Vec<RawBlock<'_>>, ExportError> {
    let mut blocks = Vec::new();
    while !data.is_empty() {
        if data.len() < BLOCK_HEADER_LEN {
            return Err(ExportError::Truncated);
        }
        let count = data.get_u32();
        let len = data.get_u32() as usize;
        if data.len() < len {
            return Err(ExportError::Truncated);
        }
        let (payload, rest) = data.split_at(len);
        blocks.push(RawBlock { count, payload });
        data = rest;
    }
    Ok(blocks)
}
