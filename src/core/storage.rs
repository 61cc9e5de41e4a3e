// Binary primitives for network images.
//
// Image layout: MAGIC, u32 version, then chunks until EOF. Every chunk is
// `tag: [u8;4]`, `len: u32`, `uncompressed_len: u32`, LZ4 block. All integers
// and floats are little-endian.

use std::io::{self, Read, Write};

use crate::error::{NetworkError, Result};
use crate::node::{NeuronId, NodeRef, SensorId};

pub const MAGIC: &[u8; 8] = b"NWEAVE01";
pub const VERSION_V1: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_V1;

pub const CHUNK_CFG: [u8; 4] = *b"CFG0";
pub const CHUNK_PRNG: [u8; 4] = *b"PRNG";
pub const CHUNK_STAT: [u8; 4] = *b"STAT";
pub const CHUNK_SENS: [u8; 4] = *b"SENS";
pub const CHUNK_NEUR: [u8; 4] = *b"NEUR";
pub const CHUNK_CONN: [u8; 4] = *b"CONN";

pub fn compress_lz4(input: &[u8]) -> Vec<u8> {
    lz4_flex::compress(input)
}

pub fn decompress_lz4(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    // Raw LZ4 block; the size travels in the chunk header.
    lz4_flex::decompress(input, expected_size).map_err(|_| NetworkError::Decompress)
}

/// Sink that only counts bytes, for exact image sizing.
pub struct CountingWriter {
    written: usize,
}

impl CountingWriter {
    pub fn new() -> Self {
        Self { written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl Default for CountingWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written = self.written.saturating_add(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn write_u32_le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u64_le<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f64_le<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Lengths and indices are stored as u32.
pub fn write_len<W: Write>(w: &mut W, n: usize) -> io::Result<()> {
    let n = u32::try_from(n)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "length exceeds u32"))?;
    write_u32_le(w, n)
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    Ok(read_exact::<1, _>(r)?[0])
}

pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    Ok(u64::from_le_bytes(read_exact::<8, _>(r)?))
}

pub fn read_f64_le<R: Read>(r: &mut R) -> io::Result<f64> {
    Ok(f64::from_le_bytes(read_exact::<8, _>(r)?))
}

pub fn read_len<R: Read>(r: &mut R) -> io::Result<usize> {
    Ok(read_u32_le(r)? as usize)
}

/// Node handle: kind byte (0 sensor, 1 neuron) + u32 index.
pub fn write_node_ref<W: Write>(w: &mut W, node: NodeRef) -> io::Result<()> {
    match node {
        NodeRef::Sensor(id) => {
            write_u8(w, 0)?;
            write_len(w, id.0)
        }
        NodeRef::Neuron(id) => {
            write_u8(w, 1)?;
            write_len(w, id.0)
        }
    }
}

pub fn read_node_ref<R: Read>(r: &mut R, chunk: &'static str) -> Result<NodeRef> {
    let kind = read_u8(r)?;
    let index = read_len(r)?;
    match kind {
        0 => Ok(NodeRef::Sensor(SensorId(index))),
        1 => Ok(NodeRef::Neuron(NeuronId(index))),
        k => Err(NetworkError::corrupt(chunk, format!("unknown node kind {k}"))),
    }
}

/// Write a chunk whose payload is LZ4-compressed and preceded by the
/// uncompressed length.
///
/// Layout:
/// - tag: [u8;4]
/// - len: u32 (bytes following, including the 4-byte uncompressed length)
/// - uncompressed_len: u32
/// - compressed payload bytes
pub fn write_chunk_lz4<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    let compressed = compress_lz4(payload);
    let uncompressed_len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?;
    let total_len = 4u32.saturating_add(
        u32::try_from(compressed.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?,
    );

    w.write_all(&tag)?;
    write_u32_le(w, total_len)?;
    write_u32_le(w, uncompressed_len)?;
    w.write_all(&compressed)
}

pub fn read_chunk_header<R: Read>(r: &mut R) -> io::Result<([u8; 4], u32)> {
    let tag = read_exact::<4, _>(r)?;
    let len = read_u32_le(r)?;
    Ok((tag, len))
}

/// Read the body of a chunk written by [`write_chunk_lz4`] and return the
/// decompressed payload. Consumes exactly `len` bytes.
pub fn read_chunk_payload<R: Read>(r: &mut R, len: u32) -> Result<Vec<u8>> {
    let mut take = r.take(u64::from(len));
    let uncompressed_len = read_u32_le(&mut take)? as usize;
    let mut compressed = Vec::with_capacity((len as usize).saturating_sub(4));
    take.read_to_end(&mut compressed)?;
    if compressed.len() + 4 != len as usize {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunk").into());
    }
    decompress_lz4(&compressed, uncompressed_len)
}

/// Printable chunk tag for error messages.
pub fn tag_name(tag: &[u8; 4]) -> &'static str {
    match tag {
        b"CFG0" => "CFG0",
        b"PRNG" => "PRNG",
        b"STAT" => "STAT",
        b"SENS" => "SENS",
        b"NEUR" => "NEUR",
        b"CONN" => "CONN",
        _ => "unknown",
    }
}
