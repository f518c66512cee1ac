//! The concatenator: reads a run's segment files back into one continuous
//! record stream.
//!
//! Continue-next-file records carry nothing of interest downstream; they
//! exist only to mark the writer-side rotation point, so the concatenator
//! consumes them and opens the next sequence number. A missing interior
//! segment is a fatal inconsistency: this tool deliberately does not wait
//! for a segment that has not been written yet (a tailing consumer would use
//! [`BufferedRecordReader::tail_ready`] instead).

use log::{debug, info, warn};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::byte_source::FdSource;
use super::constants::*;
use super::error::ConcatError;
use super::record_reader::BufferedRecordReader;
use super::segment_writer::segment_path;

/// How a concatenation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatOutcome {
    /// A genuine end-run record was forwarded.
    CleanEnd { segments: u32 },
    /// A bad-end record was forwarded; the run is marked incomplete.
    BadEnd { segments: u32 },
    /// The final segment ended with no terminator record at all (writer
    /// crashed before bad-end synthesis). Everything readable was forwarded.
    Truncated { segments: u32 },
}

pub struct RunConcatenator {
    directory: PathBuf,
    run: u32,
    sequence: u32,
    reader: BufferedRecordReader<FdSource<File>>,
}

impl RunConcatenator {
    /// Open segment 0 of `run` in `directory`. A missing first segment is
    /// fatal: there is no run to dump.
    pub fn new(directory: &Path, run: u32) -> Result<Self, ConcatError> {
        let reader = open_segment_reader(directory, run, 0)
            .map_err(|e| match e {
                ConcatError::MissingSegment(run, 0) => {
                    ConcatError::MissingFirstSegment(segment_path(directory, run, 0), run)
                }
                other => other,
            })?;
        Ok(Self {
            directory: directory.to_path_buf(),
            run,
            sequence: 0,
            reader,
        })
    }

    /// Forward every record of the run to `out`, in order, stopping after
    /// the terminator record.
    pub fn dump<W: Write>(&mut self, out: &mut W) -> Result<ConcatOutcome, ConcatError> {
        let mut forwarded: u64 = 0;
        loop {
            match self.reader.read_next()? {
                Some(record) => match record.header.record_type {
                    TYPE_CONTINUE_NEXT_FILE => {
                        debug!(
                            "Continuation record in segment {}; advancing to segment {}",
                            self.sequence,
                            self.sequence + 1
                        );
                        self.advance_segment()?;
                    }
                    TYPE_END_RUN => {
                        record.write_to(out)?;
                        info!(
                            "Run {} dumped: {} record(s) across {} segment(s), clean end",
                            self.run,
                            forwarded + 1,
                            self.sequence + 1
                        );
                        return Ok(ConcatOutcome::CleanEnd {
                            segments: self.sequence + 1,
                        });
                    }
                    TYPE_BAD_END => {
                        record.write_to(out)?;
                        warn!(
                            "Run {} dumped, but it ended in a bad-end record; the run is incomplete",
                            self.run
                        );
                        return Ok(ConcatOutcome::BadEnd {
                            segments: self.sequence + 1,
                        });
                    }
                    _ => {
                        record.write_to(out)?;
                        forwarded += 1;
                    }
                },
                None => {
                    warn!(
                        "Segment {} of run {} ended with no terminator record",
                        self.sequence, self.run
                    );
                    return Ok(ConcatOutcome::Truncated {
                        segments: self.sequence + 1,
                    });
                }
            }
        }
    }

    /// Open the next sequence number after a continuation record. The file
    /// must already exist: the writer created it before writing the marker.
    fn advance_segment(&mut self) -> Result<(), ConcatError> {
        let next = self.sequence + 1;
        self.reader = open_segment_reader(&self.directory, self.run, next)?;
        self.sequence = next;
        Ok(())
    }
}

fn open_segment_reader(
    directory: &Path,
    run: u32,
    sequence: u32,
) -> Result<BufferedRecordReader<FdSource<File>>, ConcatError> {
    let path = segment_path(directory, run, sequence);
    let file = File::open(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConcatError::MissingSegment(run, sequence),
        _ => ConcatError::IOError(e),
    })?;
    Ok(BufferedRecordReader::new(FdSource::new(file)))
}
