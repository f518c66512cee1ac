//! Reassembly of complete records from a byte stream with arbitrary read
//! chunking.
//!
//! The stream owes us nothing about delivery boundaries: a header can arrive
//! split across reads, one read can carry the tail of one record and the head
//! of the next. The reader accumulates raw bytes, decodes a header as soon as
//! 28 bytes are in hand, then stages body bytes until the record declared by
//! that header is complete. State machine per record:
//! no header -> have header (awaiting body) -> ready -> consumed.

use log::trace;

use super::byte_source::ByteSource;
use super::constants::*;
use super::error::ReaderError;
use super::record::{Record, RecordHeader};

/// Buffered, record-oriented wrapper over a [`ByteSource`].
///
/// The staging buffer is owned exclusively by the reader; callers receive
/// copies (or a moved-out [`Record`]), never references into reader storage.
/// Its capacity grows to the largest record seen and is retained across
/// records, bounded by the configured maximum record size.
pub struct BufferedRecordReader<S: ByteSource> {
    source: S,
    intake: [u8; INTAKE_BUFFER_SIZE],
    /// Raw bytes pulled from the source but not yet assigned to a record.
    pending: Vec<u8>,
    /// Body bytes (extension + payload) of the record being assembled.
    staging: Vec<u8>,
    header: Option<RecordHeader>,
    max_record_size: u32,
}

impl<S: ByteSource> BufferedRecordReader<S> {
    pub fn new(source: S) -> Self {
        Self::with_max_record_size(source, DEFAULT_MAX_RECORD_SIZE)
    }

    pub fn with_max_record_size(source: S, max_record_size: u32) -> Self {
        Self {
            source,
            intake: [0u8; INTAKE_BUFFER_SIZE],
            pending: Vec::new(),
            staging: Vec::new(),
            header: None,
            max_record_size,
        }
    }

    /// Non-blocking: true when a complete record is staged. Pulls bytes from
    /// the source only while it reports data immediately available.
    pub fn ready(&mut self) -> Result<bool, ReaderError> {
        self.pump_available()?;
        Ok(self.record_complete())
    }

    /// [`BufferedRecordReader::ready`] for tail-follow use: first forgets any
    /// end-of-data the source has latched, so a reader following a growing
    /// file is not permanently stuck on a transient EOF.
    pub fn tail_ready(&mut self) -> Result<bool, ReaderError> {
        self.source.clear_eof();
        self.ready()
    }

    /// True only when no staged or pending bytes remain and the source
    /// itself is at end-of-data.
    pub fn eof(&self) -> bool {
        self.header.is_none()
            && self.pending.is_empty()
            && self.staging.is_empty()
            && self.source.at_eof()
    }

    /// Blocking read of one complete record.
    ///
    /// Returns `Ok(None)` on a clean end-of-data at a record boundary. If the
    /// stream ends inside a record body, the caller receives a short but
    /// well-formed record: `status_code` is forced to error and the size
    /// fields are recomputed from the bytes actually obtained. A stream that
    /// ends inside a header is a fatal protocol error.
    pub fn read_record(
        &mut self,
        header_out: &mut RecordHeader,
        payload_out: &mut Vec<u8>,
    ) -> Result<Option<usize>, ReaderError> {
        loop {
            self.pump_available()?;
            if self.record_complete() {
                return Ok(Some(self.take_record(header_out, payload_out)));
            }
            if self.source.at_eof() {
                return self.finish_at_eof(header_out, payload_out);
            }
            self.source.wait_readable()?;
            // One read past the readiness wait guarantees progress even when
            // poll and read disagree (hangup with no data, for instance).
            let got = self.source.read_bytes(&mut self.intake)?;
            self.pending.extend_from_slice(&self.intake[..got]);
        }
    }

    /// Convenience wrapper producing an owned [`Record`].
    pub fn read_next(&mut self) -> Result<Option<Record>, ReaderError> {
        let mut header = RecordHeader::new();
        let mut body = Vec::new();
        match self.read_record(&mut header, &mut body)? {
            Some(_) => Ok(Some(Record { header, body })),
            None => Ok(None),
        }
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Pull whatever the source has buffered right now and advance the
    /// assembly state machine as far as the bytes allow.
    fn pump_available(&mut self) -> Result<(), ReaderError> {
        loop {
            self.stage_pending()?;
            if self.record_complete() {
                return Ok(());
            }
            if !self.source.poll_readable()? {
                return Ok(());
            }
            let got = self.source.read_bytes(&mut self.intake)?;
            if got == 0 {
                self.stage_pending()?;
                return Ok(());
            }
            self.pending.extend_from_slice(&self.intake[..got]);
        }
    }

    /// Move pending raw bytes through header decode and body staging.
    fn stage_pending(&mut self) -> Result<(), ReaderError> {
        if self.header.is_none() && self.pending.len() >= ENCODED_HEADER_SIZE {
            let (header, consumed) = RecordHeader::decode(&self.pending)?;
            // All framing decisions come from record_size, so the section
            // sizes must agree with it; a header where they disagree is
            // corrupt, not merely unusual.
            let declared = ENCODED_HEADER_SIZE as u64 + header.body_size();
            if u64::from(header.record_size) != declared {
                return Err(ReaderError::InconsistentSize(header.record_size, declared));
            }
            if header.record_size > self.max_record_size {
                return Err(ReaderError::RecordTooLarge(
                    header.record_size,
                    self.max_record_size,
                ));
            }
            self.pending.drain(..consumed);
            self.staging.reserve(header.body_size() as usize);
            trace!(
                "staged header: type {} ({}), {} body bytes to follow",
                header.record_type,
                record_type_name(header.record_type),
                header.body_size()
            );
            self.header = Some(header);
        }
        if let Some(header) = &self.header {
            let needed = header.body_size() as usize - self.staging.len();
            let take = needed.min(self.pending.len());
            self.staging.extend(self.pending.drain(..take));
        }
        Ok(())
    }

    fn record_complete(&self) -> bool {
        match &self.header {
            Some(header) => self.staging.len() == header.body_size() as usize,
            None => false,
        }
    }

    /// Copy the staged record out and reset to the no-header state. Returns
    /// the number of body bytes delivered.
    fn take_record(&mut self, header_out: &mut RecordHeader, payload_out: &mut Vec<u8>) -> usize {
        *header_out = self.header.take().unwrap_or_default();
        payload_out.clear();
        payload_out.extend_from_slice(&self.staging);
        self.staging.clear();
        payload_out.len()
    }

    /// End-of-data handling for the blocking read paths.
    fn finish_at_eof(
        &mut self,
        header_out: &mut RecordHeader,
        payload_out: &mut Vec<u8>,
    ) -> Result<Option<usize>, ReaderError> {
        match self.header {
            None if self.pending.is_empty() => Ok(None),
            None => Err(ReaderError::TruncatedHeader(self.pending.len())),
            Some(ref mut header) => {
                // The stream died inside a record. Hand back what arrived as
                // a well-formed short record with an error status so the
                // consumer sees the truncation in-band.
                let got = self.staging.len();
                let ext = (header.extended_header_size as usize).min(got);
                header.status_code = STATUS_ERROR;
                header.extended_header_size = ext as u32;
                header.data_size = (got - ext) as u32;
                header.record_size = (ENCODED_HEADER_SIZE + got) as u32;
                Ok(Some(self.take_record(header_out, payload_out)))
            }
        }
    }
}
