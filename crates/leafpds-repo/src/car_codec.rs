//! CAR (Content-Addressable aRchive) v1 encode/decode.
//!
//! A CAR stream is a varint-prefixed DAG-CBOR header (`{version: 1,
//! roots: [CID, ...]}`) followed by zero or more blocks, each itself
//! varint-prefixed: `varint(len(cid) + len(data)) || cid_bytes || data`.
//! This is the wire format used by `sync.getRepo`, account export, and
//! migration import — written by hand here because the format itself,
//! not a library wrapping it, is the thing under specification.

use atrium_repo::Cid;
use leafpds_core::{PdsError, PdsResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct CarHeader {
    version: u64,
    roots: Vec<Cid>,
}

/// Write an unsigned LEB128 varint, matching the `multiformats/unsigned-varint`
/// convention CAR v1 uses for length prefixes.
fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Read an unsigned LEB128 varint from `data` starting at `offset`,
/// returning the value and the number of bytes consumed.
fn read_varint(data: &[u8], offset: usize) -> PdsResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    let mut pos = offset;
    loop {
        let byte = *data
            .get(pos)
            .ok_or_else(|| PdsError::IntegrityError("truncated varint in CAR stream".into()))?;
        value |= ((byte & 0x7f) as u64) << shift;
        pos += 1;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(PdsError::IntegrityError("varint too large".into()));
        }
    }
    Ok((value, pos - offset))
}

/// Streaming CAR v1 writer that accumulates into an in-memory buffer.
/// The repositories this server manages are small enough (one user's
/// records and blobs) that buffering the whole archive is acceptable;
/// very large exports would instead write directly to the HTTP response
/// body as each block is appended.
pub struct CarWriter {
    buf: Vec<u8>,
}

impl CarWriter {
    pub fn new(roots: Vec<Cid>) -> PdsResult<Self> {
        let header = CarHeader { version: 1, roots };
        let header_bytes = serde_ipld_dagcbor::to_vec(&header)
            .map_err(|e| PdsError::IntegrityError(format!("CAR header encode failed: {e}")))?;

        let mut buf = Vec::new();
        write_varint(header_bytes.len() as u64, &mut buf);
        buf.extend_from_slice(&header_bytes);
        Ok(Self { buf })
    }

    pub fn write_block(&mut self, cid: Cid, data: &[u8]) {
        let cid_bytes = cid.to_bytes();
        let frame_len = cid_bytes.len() + data.len();
        write_varint(frame_len as u64, &mut self.buf);
        self.buf.extend_from_slice(&cid_bytes);
        self.buf.extend_from_slice(data);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Pull-based CAR v1 reader.
pub struct CarReader<'a> {
    data: &'a [u8],
    pub roots: Vec<Cid>,
    offset: usize,
}

impl<'a> CarReader<'a> {
    pub fn new(data: &'a [u8]) -> PdsResult<Self> {
        let (header_len, varint_size) = read_varint(data, 0)?;
        let header_start = varint_size;
        let header_end = header_start + header_len as usize;
        let header_bytes = data
            .get(header_start..header_end)
            .ok_or_else(|| PdsError::IntegrityError("truncated CAR header".into()))?;
        let header: CarHeader = serde_ipld_dagcbor::from_slice(header_bytes)
            .map_err(|e| PdsError::IntegrityError(format!("bad CAR header: {e}")))?;
        if header.version != 1 {
            return Err(PdsError::IntegrityError(format!(
                "unsupported CAR version: {}",
                header.version
            )));
        }
        Ok(Self {
            data,
            roots: header.roots,
            offset: header_end,
        })
    }

    /// Read the next `(CID, bytes)` block, verifying the bytes hash to
    /// the CID. Returns `None` at end of stream.
    pub fn next_block(&mut self) -> PdsResult<Option<(Cid, &'a [u8])>> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let (frame_len, varint_size) = read_varint(self.data, self.offset)?;
        let frame_start = self.offset + varint_size;
        let frame_end = frame_start + frame_len as usize;
        let frame = self
            .data
            .get(frame_start..frame_end)
            .ok_or_else(|| PdsError::IntegrityError("truncated CAR block".into()))?;

        let mut cursor = std::io::Cursor::new(frame);
        let cid = Cid::read_bytes(&mut cursor)
            .map_err(|e| PdsError::IntegrityError(format!("bad block CID: {e}")))?;
        let cid_len = cursor.position() as usize;
        let block_data = &frame[cid_len..];

        verify_block_hash(&cid, block_data)?;

        self.offset = frame_end;
        Ok(Some((cid, block_data)))
    }
}

fn verify_block_hash(cid: &Cid, data: &[u8]) -> PdsResult<()> {
    use atrium_repo::blockstore::SHA2_256;
    use atrium_repo::Multihash;
    use sha2::{Digest, Sha256};

    let hash = cid.hash();
    if hash.code() != SHA2_256 {
        // Only SHA-256 blocks are produced by this server; anything else
        // in an imported archive is treated as untrusted and rejected.
        return Err(PdsError::IntegrityError("unsupported block hash algorithm".into()));
    }
    let digest = Sha256::digest(data);
    let expected = Multihash::wrap(SHA2_256, digest.as_slice())
        .map_err(|e| PdsError::IntegrityError(format!("hash wrap failed: {e}")))?;
    if expected.digest() != hash.digest() {
        return Err(PdsError::IntegrityError(format!(
            "block content does not match CID {cid}"
        )));
    }
    Ok(())
}
