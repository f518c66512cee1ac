//! The run segmenter: splits a record stream into size-capped, numbered
//! segment files, one run at a time.
//!
//! Segments of a run are named `run%04u_%04u.evt` from (run number, sequence
//! number). Rotation is decided before each write, so a record never spans
//! two files; the old segment is closed with a synthesized continue-next-file
//! record. A stream that ends without a genuine end-run (producer died, pipe
//! broke, operator insisted on Ctrl-C) is closed with a synthesized bad-end
//! record, so every run's last segment ends in one of exactly two terminator
//! types and truncation is detectable by record type alone.

use human_bytes::human_bytes;
use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::byte_source::ByteSource;
use super::constants::*;
use super::error::SegmenterError;
use super::record::{pack_timestamped, run_number_of, Record};
use super::record_reader::BufferedRecordReader;
use super::signal;

/// How a segmenter pass over the input ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterOutcome {
    /// A genuine end-run record arrived and was written.
    CleanEnd { run: u32, segments: u32 },
    /// Input ended mid-run; a bad-end record was synthesized.
    BadEnd { run: u32, segments: u32 },
    /// The input stream carried no records at all.
    NoInput,
}

/// Segment file name for (run, sequence).
pub fn segment_file_name(run: u32, sequence: u32) -> String {
    format!("run{run:0>4}_{sequence:0>4}.evt")
}

/// Full path of a segment file in `directory`.
pub fn segment_path(directory: &Path, run: u32, sequence: u32) -> PathBuf {
    directory.join(segment_file_name(run, sequence))
}

/// The currently open segment. Owned exclusively by the segmenter, along
/// with the byte and sequence counters; reset only when a new begin-run is
/// seen on a closed handle.
struct OpenSegment {
    file: File,
    path: PathBuf,
    run: u32,
    title: String,
    sequence: u32,
    bytes_written: u64,
}

pub struct RunSegmenter {
    directory: PathBuf,
    threshold_bytes: u64,
    open: Option<OpenSegment>,
}

impl RunSegmenter {
    /// Create a segmenter writing into `directory` with segments capped at
    /// `segment_size_mb` megabytes. The directory must already exist.
    pub fn new(directory: &Path, segment_size_mb: u64) -> Result<Self, SegmenterError> {
        if !directory.is_dir() {
            return Err(SegmenterError::BadDirectory(directory.to_path_buf()));
        }
        Ok(Self {
            directory: directory.to_path_buf(),
            threshold_bytes: segment_size_mb * 1024 * 1024,
            open: None,
        })
    }

    /// Consume the record stream until it terminates, segmenting as we go.
    ///
    /// Ends cleanly on an end-run record; ends with bad-end synthesis when
    /// the input dries up mid-run or the operator interrupts repeatedly.
    /// Protocol-order violations (begin while open, anything before the
    /// first begin-run) and fatal reader errors propagate as errors after
    /// the open segment, if any, has been closed out with a bad-end record.
    pub fn process<S: ByteSource>(
        &mut self,
        reader: &mut BufferedRecordReader<S>,
    ) -> Result<SegmenterOutcome, SegmenterError> {
        let mut saw_any = false;
        loop {
            if signal::shutdown_requested() {
                warn!("Repeated interrupts received; treating input as ended");
                break;
            }
            let next = match reader.read_next() {
                Ok(next) => next,
                Err(e) => {
                    // The input is unreadable from here on, but the run
                    // still gets its in-band terminator before the error
                    // surfaces.
                    if let Some(segment) = self.open.take() {
                        self.close_with_bad_end(segment)?;
                    }
                    return Err(e.into());
                }
            };
            match next {
                Some(record) => {
                    saw_any = true;
                    if let Some(outcome) = self.handle_record(record)? {
                        return Ok(outcome);
                    }
                }
                None => break,
            }
        }

        // Input ended without a genuine end-run.
        match self.open.take() {
            Some(segment) => self.close_with_bad_end(segment),
            None => {
                if !saw_any {
                    info!("Input stream carried no records");
                }
                Ok(SegmenterOutcome::NoInput)
            }
        }
    }

    fn handle_record(
        &mut self,
        record: Record,
    ) -> Result<Option<SegmenterOutcome>, SegmenterError> {
        match record.header.record_type {
            TYPE_BEGIN_RUN => {
                if let Some(segment) = self.open.take() {
                    // Two concurrent begin-runs is an operator-facing
                    // configuration failure. Terminate the old run in-band
                    // first so its segments stay readable.
                    let old_run = segment.run;
                    let new_run =
                        run_number_of(&record.header, record.payload()).unwrap_or(old_run);
                    self.close_with_bad_end(segment)?;
                    return Err(SegmenterError::BeginWhileOpen(old_run, new_run));
                }
                let (_, run, title) =
                    super::record::unpack_timestamped(&record.header, record.payload())
                        .map_err(SegmenterError::BadBeginRun)?;
                info!("Begin run {run} ({title}); opening segment 0");
                let mut segment = self.open_segment(run, title, 0)?;
                segment.bytes_written += record.write_to(&mut segment.file)?;
                self.open = Some(segment);
                Ok(None)
            }
            TYPE_END_RUN => {
                let segment = self
                    .open
                    .take()
                    .ok_or(SegmenterError::RecordBeforeBegin(TYPE_END_RUN))?;
                let mut segment = self.write_rotating(segment, &record)?;
                segment.file.flush()?;
                let outcome = SegmenterOutcome::CleanEnd {
                    run: segment.run,
                    segments: segment.sequence + 1,
                };
                info!(
                    "End run {}: {} segment(s), final segment {:?} at {}",
                    segment.run,
                    segment.sequence + 1,
                    segment.path,
                    human_bytes(segment.bytes_written as f64)
                );
                Ok(Some(outcome))
            }
            other => {
                let segment = self
                    .open
                    .take()
                    .ok_or(SegmenterError::RecordBeforeBegin(other))?;
                let segment = self.write_rotating(segment, &record)?;
                self.open = Some(segment);
                Ok(None)
            }
        }
    }

    /// Write one record, rotating to the next sequence number first if the
    /// current segment would exceed the size threshold. The continuation
    /// record written during rotation is exempt from the threshold: it must
    /// land in the segment it terminates, so a segment can exceed the cap by
    /// at most one record plus one continuation record.
    fn write_rotating(
        &mut self,
        mut segment: OpenSegment,
        record: &Record,
    ) -> Result<OpenSegment, SegmenterError> {
        if segment.bytes_written + record.wire_size() > self.threshold_bytes {
            let marker =
                pack_timestamped(TYPE_CONTINUE_NEXT_FILE, segment.run, &segment.title);
            marker.write_to(&mut segment.file)?;
            segment.file.flush()?;
            info!(
                "Segment {} of run {} reached {}; rotating to segment {}",
                segment.sequence,
                segment.run,
                human_bytes(segment.bytes_written as f64),
                segment.sequence + 1
            );
            segment = self.open_segment(segment.run, segment.title, segment.sequence + 1)?;
        }
        segment.bytes_written += record.write_to(&mut segment.file)?;
        Ok(segment)
    }

    /// Terminate an interrupted run: synthesize a bad-end record (rotating
    /// first if it would not fit), flush, and close.
    fn close_with_bad_end(
        &mut self,
        segment: OpenSegment,
    ) -> Result<SegmenterOutcome, SegmenterError> {
        let mut bad_end = pack_timestamped(TYPE_BAD_END, segment.run, &segment.title);
        bad_end.header.status_code = STATUS_RUN_INCOMPLETE;
        warn!(
            "Run {} ended without an end-run record; writing bad-end to {:?}",
            segment.run, segment.path
        );
        let mut segment = self.write_rotating(segment, &bad_end)?;
        segment.file.flush()?;
        Ok(SegmenterOutcome::BadEnd {
            run: segment.run,
            segments: segment.sequence + 1,
        })
    }

    /// Open a fresh segment file. An already existing file is fatal: the
    /// segmenter never overwrites recorded data.
    fn open_segment(
        &mut self,
        run: u32,
        title: String,
        sequence: u32,
    ) -> Result<OpenSegment, SegmenterError> {
        let path = segment_path(&self.directory, run, sequence);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => SegmenterError::SegmentExists(path.clone()),
                _ => SegmenterError::IOError(e),
            })?;
        Ok(OpenSegment {
            file,
            path,
            run,
            title,
            sequence,
            bytes_written: 0,
        })
    }
}
