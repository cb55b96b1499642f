//! The length-prefixed frames exchanged between the members of a `TcpGroup`.
//!
//! Every frame starts with a big endian `u32` kind followed by a big endian
//! `u64` payload length in bytes. `Data` payloads are raw `f32`s in native
//! byte order, every worker of a run is expected to share an architecture.

use std::io::{self, Read, Write};

use crate::{CommErr, KIND_TYPE_SIZE, KindType, LEN_TYPE_SIZE, LenType, Result};

const HEADER_SIZE: usize = KIND_TYPE_SIZE + LEN_TYPE_SIZE;

/// The kind of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Hello,
    Data,
    Bye,
}

impl Kind {
    fn as_raw(self) -> KindType {
        match self {
            Kind::Hello => 0,
            Kind::Data => 1,
            Kind::Bye => 2,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Hello => "hello",
            Kind::Data => "data",
            Kind::Bye => "bye",
        }
    }
}

fn write_frame<W: Write>(tx: &mut W, kind: Kind, payload: &[u8]) -> io::Result<()> {
    let mut header = [0; HEADER_SIZE];
    header[..KIND_TYPE_SIZE].copy_from_slice(&kind.as_raw().to_be_bytes());
    header[KIND_TYPE_SIZE..].copy_from_slice(&(payload.len() as LenType).to_be_bytes());

    tx.write_all(&header)?;
    if !payload.is_empty() {
        tx.write_all(payload)?;
    }

    tx.flush()
}

/// Reads a frame header, checking its kind.
///
/// # Returns
/// The payload length in bytes.
fn read_header<R: Read>(rx: &mut R, expected: Kind) -> Result<usize> {
    let mut header = [0; HEADER_SIZE];
    rx.read_exact(&mut header)?;

    let mut kind = [0; KIND_TYPE_SIZE];
    kind.copy_from_slice(&header[..KIND_TYPE_SIZE]);
    let kind = KindType::from_be_bytes(kind);

    if kind != expected.as_raw() {
        return Err(CommErr::UnexpectedFrame {
            expected: expected.name(),
            got: kind,
        });
    }

    let mut len = [0; LEN_TYPE_SIZE];
    len.copy_from_slice(&header[KIND_TYPE_SIZE..]);
    Ok(LenType::from_be_bytes(len) as usize)
}

/// Sends the handshake of a joining worker.
pub fn send_hello<W: Write>(tx: &mut W, rank: usize, size: usize) -> Result<()> {
    let mut payload = [0; 2 * LEN_TYPE_SIZE];
    payload[..LEN_TYPE_SIZE].copy_from_slice(&(rank as LenType).to_be_bytes());
    payload[LEN_TYPE_SIZE..].copy_from_slice(&(size as LenType).to_be_bytes());
    Ok(write_frame(tx, Kind::Hello, &payload)?)
}

/// Receives the handshake of a joining worker.
///
/// # Returns
/// The announced `(rank, world size)` pair.
pub fn recv_hello<R: Read>(rx: &mut R) -> Result<(usize, usize)> {
    let len = read_header(rx, Kind::Hello)?;
    if len != 2 * LEN_TYPE_SIZE {
        return Err(CommErr::LengthMismatch {
            got: len,
            expected: 2 * LEN_TYPE_SIZE,
        });
    }

    let mut rank = [0; LEN_TYPE_SIZE];
    let mut size = [0; LEN_TYPE_SIZE];
    rx.read_exact(&mut rank)?;
    rx.read_exact(&mut size)?;

    Ok((
        LenType::from_be_bytes(rank) as usize,
        LenType::from_be_bytes(size) as usize,
    ))
}

/// Sends `data` as a `Data` frame.
pub fn send_data<W: Write>(tx: &mut W, data: &[f32]) -> Result<()> {
    Ok(write_frame(tx, Kind::Data, bytemuck::cast_slice(data))?)
}

/// Receives a `Data` frame straight into `buf`.
///
/// # Returns
/// An error if the frame does not carry exactly `buf.len()` numbers.
pub fn recv_data_into<R: Read>(rx: &mut R, buf: &mut [f32]) -> Result<()> {
    let len = read_header(rx, Kind::Data)?;
    let expected = size_of_val(buf);

    if len != expected {
        return Err(CommErr::LengthMismatch {
            got: len / size_of::<f32>(),
            expected: buf.len(),
        });
    }

    rx.read_exact(bytemuck::cast_slice_mut(buf))?;
    Ok(())
}

/// Sends the teardown notice.
pub fn send_bye<W: Write>(tx: &mut W) -> Result<()> {
    Ok(write_frame(tx, Kind::Bye, &[])?)
}

/// Waits for the teardown notice.
pub fn recv_bye<R: Read>(rx: &mut R) -> Result<()> {
    read_header(rx, Kind::Bye)?;
    Ok(())
}
