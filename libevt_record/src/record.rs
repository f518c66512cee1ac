//! The record wire format: header codec, whole-record container, and the
//! time-stamped control payload carried by run-boundary records.
//!
//! Every record on the wire is a fixed 28-byte header, `extended_header_size`
//! bytes of extension data, then `data_size` bytes of payload. All multi-byte
//! header fields are big-endian except `byte_order`, which is written in the
//! producer's native order so a consumer can detect an endianness mismatch by
//! comparing it against [`BYTE_ORDER_SENTINEL`](crate::constants::BYTE_ORDER_SENTINEL).

use byteorder::{BigEndian, ByteOrder, NativeEndian};
use std::io::Write;
use time::OffsetDateTime;

use super::constants::*;
use super::error::{CodecError, WireWriteError};

/// In-memory form of the fixed record header.
///
/// Field values are host byte order; [`RecordHeader::encode`] and
/// [`RecordHeader::decode`] perform the wire conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub version: u16,
    pub record_size: u32,
    pub record_type: u32,
    pub status_code: u16,
    pub byte_order: u32,
    pub extended_header_size: u32,
    pub data_size: u32,
    pub entity_count: u32,
}

impl Default for RecordHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordHeader {
    /// Create a header with default values: current version, size of a bare
    /// header, physics type, ok status, the byte-order sentinel, and empty
    /// extension/payload. Calling this twice yields the same header.
    pub fn new() -> Self {
        Self {
            version: RECORD_FORMAT_VERSION,
            record_size: ENCODED_HEADER_SIZE as u32,
            record_type: TYPE_PHYSICS,
            status_code: STATUS_OK,
            byte_order: BYTE_ORDER_SENTINEL,
            extended_header_size: 0,
            data_size: 0,
            entity_count: 0,
        }
    }

    /// Encode this header into `buf`, returning the number of bytes written.
    ///
    /// All fields are converted to network byte order except `byte_order`,
    /// which is copied in native order. Fails without writing if `buf` is
    /// smaller than [`ENCODED_HEADER_SIZE`].
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        if buf.len() < ENCODED_HEADER_SIZE {
            return Err(CodecError::BufferTooSmall(buf.len()));
        }
        BigEndian::write_u16(&mut buf[0..2], self.version);
        BigEndian::write_u32(&mut buf[2..6], self.record_size);
        BigEndian::write_u32(&mut buf[6..10], self.record_type);
        BigEndian::write_u16(&mut buf[10..12], self.status_code);
        NativeEndian::write_u32(&mut buf[12..16], self.byte_order);
        BigEndian::write_u32(&mut buf[16..20], self.extended_header_size);
        BigEndian::write_u32(&mut buf[20..24], self.data_size);
        BigEndian::write_u32(&mut buf[24..28], self.entity_count);
        Ok(ENCODED_HEADER_SIZE)
    }

    /// Encode into a fresh fixed-size array.
    pub fn encoded(&self) -> Result<[u8; ENCODED_HEADER_SIZE], CodecError> {
        let mut buf = [0u8; ENCODED_HEADER_SIZE];
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode a header from the front of `buf`, returning it along with the
    /// number of bytes consumed.
    ///
    /// A version mismatch is fatal to the stream: it means the producer spoke
    /// an incompatible format (or the bytes are not a record header at all),
    /// and there is no local recovery.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        if buf.len() < ENCODED_HEADER_SIZE {
            return Err(CodecError::BufferTooSmall(buf.len()));
        }
        let header = Self {
            version: BigEndian::read_u16(&buf[0..2]),
            record_size: BigEndian::read_u32(&buf[2..6]),
            record_type: BigEndian::read_u32(&buf[6..10]),
            status_code: BigEndian::read_u16(&buf[10..12]),
            byte_order: NativeEndian::read_u32(&buf[12..16]),
            extended_header_size: BigEndian::read_u32(&buf[16..20]),
            data_size: BigEndian::read_u32(&buf[20..24]),
            entity_count: BigEndian::read_u32(&buf[24..28]),
        };
        if header.version != RECORD_FORMAT_VERSION {
            return Err(CodecError::VersionMismatch(header.version));
        }
        Ok((header, ENCODED_HEADER_SIZE))
    }

    /// Number of body bytes (extension plus payload) this header declares.
    pub fn body_size(&self) -> u64 {
        self.extended_header_size as u64 + self.data_size as u64
    }
}

/// A complete record: decoded header plus its body bytes (extension header
/// followed by payload, exactly as they appear on the wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: RecordHeader,
    pub body: Vec<u8>,
}

impl Record {
    /// The payload portion of the body (after any extension header).
    pub fn payload(&self) -> &[u8] {
        &self.body[self.header.extended_header_size as usize..]
    }

    /// Total encoded size of this record on the wire.
    pub fn wire_size(&self) -> u64 {
        ENCODED_HEADER_SIZE as u64 + self.body.len() as u64
    }

    /// Write this record to `out` in wire format, returning the number of
    /// bytes written. A write that ends short of the full record is reported
    /// as [`WireWriteError::Short`] so the caller can downgrade the run's
    /// status rather than leave an unreadable tail.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<u64, WireWriteError> {
        let encoded = self.header.encoded()?;
        write_fully(out, &encoded)?;
        write_fully(out, &self.body)?;
        Ok(self.wire_size())
    }
}

/// Write all of `buf`, retrying interrupted syscalls, distinguishing a short
/// write (out of space, peer gone) from other IO failure.
fn write_fully<W: Write>(out: &mut W, buf: &[u8]) -> Result<(), WireWriteError> {
    let mut written = 0;
    while written < buf.len() {
        match out.write(&buf[written..]) {
            Ok(0) => return Err(WireWriteError::Short(written, buf.len())),
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WriteZero => {
                return Err(WireWriteError::Short(written, buf.len()))
            }
            Err(e) => return Err(WireWriteError::IOError(e)),
        }
    }
    Ok(())
}

/// Build a run-boundary record: a time-stamped payload holding the wall
/// clock, the run number, and a NUL-terminated title, under a header of the
/// given type with `entity_count = 1`.
pub fn pack_timestamped(record_type: u32, run_number: u32, title: &str) -> Record {
    let stamp = OffsetDateTime::now_utc();
    pack_timestamped_at(record_type, run_number, title, stamp)
}

/// [`pack_timestamped`] with an explicit clock value.
pub fn pack_timestamped_at(
    record_type: u32,
    run_number: u32,
    title: &str,
    stamp: OffsetDateTime,
) -> Record {
    let title_bytes = title.as_bytes();
    let mut body = Vec::with_capacity(12 + title_bytes.len() + 1);
    body.extend_from_slice(&stamp.unix_timestamp().to_be_bytes());
    body.extend_from_slice(&run_number.to_be_bytes());
    body.extend_from_slice(title_bytes);
    body.push(0);

    let mut header = RecordHeader::new();
    header.record_type = record_type;
    header.data_size = body.len() as u32;
    header.entity_count = 1;
    header.record_size = ENCODED_HEADER_SIZE as u32 + body.len() as u32;
    Record { header, body }
}

/// Unpack a time-stamped control payload into (wall clock, run number,
/// title). Fails hard if the payload length disagrees with the header's
/// `data_size` or the body is too short to hold the fixed fields.
pub fn unpack_timestamped(
    header: &RecordHeader,
    payload: &[u8],
) -> Result<(OffsetDateTime, u32, String), CodecError> {
    if payload.len() != header.data_size as usize {
        return Err(CodecError::PayloadSizeMismatch(
            payload.len(),
            header.data_size,
        ));
    }
    // 8 byte stamp + 4 byte run number + at least the NUL terminator.
    if payload.len() < 13 {
        return Err(CodecError::BadTimestampedBody(payload.len()));
    }
    let seconds = BigEndian::read_i64(&payload[0..8]);
    let stamp = OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|_| CodecError::BadClockValue(seconds))?;
    let run_number = BigEndian::read_u32(&payload[8..12]);
    let title_bytes = &payload[12..];
    let end = title_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(title_bytes.len());
    let title = String::from_utf8_lossy(&title_bytes[..end]).into_owned();
    Ok((stamp, run_number, title))
}

/// Extract the run number from a run-boundary record's payload.
pub fn run_number_of(header: &RecordHeader, payload: &[u8]) -> Result<u32, CodecError> {
    let (_, run, _) = unpack_timestamped(header, payload)?;
    Ok(run)
}
