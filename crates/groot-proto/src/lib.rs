// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Wire messages exchanged between the entry coordinator and its detached
//! helpers, plus the length-prefixed framing used on the rendezvous
//! sockets. Tables travel as serialised messages, never as shared memory.

use std::io::{self, Read, Write};

use ssz::{Decode, Encode};
use ssz_derive::{Decode, Encode};

/// Upper bound on a framed message; the setup tables are tiny, anything
/// larger is a protocol violation.
pub const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// One contiguous id mapping: namespace ids `ns_start..ns_start+count` back
/// onto host ids `host_start..host_start+count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct IdRange {
    pub ns_start: u32,
    pub host_start: u32,
    pub count: u32,
}

impl IdRange {
    /// Highest namespace id covered by this range.
    pub fn ns_last(&self) -> u32 {
        self.ns_start + self.count.saturating_sub(1)
    }
}

/// Everything the privilege-map helper needs: whom to map and how.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct MapSetup {
    pub pid: u32,
    pub uid_ranges: Vec<IdRange>,
    pub gid_ranges: Vec<IdRange>,
}

/// Highest namespace id in a table; 0 for an empty table.
pub fn max_ns_id(ranges: &[IdRange]) -> u32 {
    ranges.iter().map(IdRange::ns_last).max().unwrap_or(0)
}

/// Write one length-prefixed message (little-endian u32 length, SSZ body).
pub fn write_message<W: Write, T: Encode>(writer: &mut W, message: &T) -> io::Result<()> {
    let body = message.as_ssz_bytes();
    if body.len() > MAX_MESSAGE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "message exceeds frame limit",
        ));
    }
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)?;
    Ok(())
}

/// Read one length-prefixed message. A peer closing the socket surfaces as
/// `UnexpectedEof`, which callers treat like any other short read.
pub fn read_message<R: Read, T: Decode>(reader: &mut R) -> io::Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame length exceeds limit",
        ));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    T::from_ssz_bytes(&body)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MapSetup {
        MapSetup {
            pid: 4242,
            uid_ranges: vec![
                IdRange {
                    ns_start: 0,
                    host_start: 1000,
                    count: 1,
                },
                IdRange {
                    ns_start: 1,
                    host_start: 100_000,
                    count: 65_536,
                },
            ],
            gid_ranges: vec![IdRange {
                ns_start: 0,
                host_start: 1000,
                count: 1,
            }],
        }
    }

    #[test]
    fn framed_round_trip() {
        let mut buf = Vec::new();
        let setup = sample();
        write_message(&mut buf, &setup).unwrap();

        let mut cursor = &buf[..];
        let decoded: MapSetup = read_message(&mut cursor).unwrap();
        assert_eq!(decoded, setup);
        assert!(cursor.is_empty());
    }

    #[test]
    fn short_frames_are_rejected() {
        let mut buf = Vec::new();
        write_message(&mut buf, &sample()).unwrap();
        buf.truncate(buf.len() - 1);

        let mut cursor = &buf[..];
        let err = read_message::<_, MapSetup>(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_MESSAGE_LEN as u32 + 1).to_le_bytes());
        let mut cursor = &buf[..];
        let err = read_message::<_, MapSetup>(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn max_ns_id_spans_the_table() {
        let setup = sample();
        assert_eq!(max_ns_id(&setup.uid_ranges), 65_536);
        assert_eq!(max_ns_id(&setup.gid_ranges), 0);
        assert_eq!(max_ns_id(&[]), 0);
    }
}
