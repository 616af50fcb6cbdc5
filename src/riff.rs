//! There's an abomination called RMID, MIDI embedded in a RIFF file.
//! Support for these files is provided by unwrapping the input slice, stripping away the RIFF
//! wrappers around the raw SMF file.

use crate::prelude::*;

/// Walks little-endian RIFF subchunks, yielding their id, body offset and body.
struct ChunkIter<'a> {
    raw: &'a [u8],
    offset: usize,
}
impl<'a> Iterator for ChunkIter<'a> {
    type Item = ([u8; 4], usize, &'a [u8]);
    fn next(&mut self) -> Option<([u8; 4], usize, &'a [u8])> {
        if self.raw.len() < 8 {
            return None;
        }
        let mut id = [0; 4];
        let mut len = [0; 4];
        id.copy_from_slice(&self.raw[..4]);
        len.copy_from_slice(&self.raw[4..8]);
        self.raw = &self.raw[8..];
        self.offset += 8;
        let start = self.offset;
        let len = u32::from_le_bytes(len) as usize;
        let data = match self.raw.split_checked(len) {
            Some(data) => data,
            None => mem::replace(&mut self.raw, &[]),
        };
        self.offset += data.len();
        //Chunks are padded to even lengths
        if len % 2 == 1 && self.raw.split_checked(1).is_some() {
            self.offset += 1;
        }
        Some((id, start, data))
    }
}

#[inline]
pub(crate) fn is_riff(raw: &[u8]) -> bool {
    raw.starts_with(b"RIFF")
}

/// Extract the SMF data out of an RMID file.
pub(crate) fn unwrap(raw: &[u8]) -> StdResult<&[u8], FormatError> {
    let fail = |msg: &'static str, offset: usize| FormatError::new(err_invalid!(msg), offset, "RIFF");
    let (id, start, mut riff) = ChunkIter { raw, offset: 0 }
        .next()
        .ok_or_else(|| fail("truncated", 0))?;
    ensure!(&id == b"RIFF", fail("bad tag", 0));
    let formtype = riff
        .split_checked(4)
        .ok_or_else(|| fail("truncated", start))?;
    ensure!(formtype == b"RMID", fail("not an rmid riff file", start));
    let chunks = ChunkIter {
        raw: riff,
        offset: start + 4,
    };
    for (id, offset, chunk) in chunks {
        if &id == b"data" {
            log::trace!("rmid data chunk of {} bytes at {}", chunk.len(), offset);
            return Ok(chunk);
        }
    }
    bail!(fail("no rmid data chunk", raw.len()))
}
