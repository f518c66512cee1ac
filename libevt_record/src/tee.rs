//! The tee filter: forwards every record downstream while duplicating
//! records of selected types to a child process's stdin.
//!
//! Duplication is strictly best-effort. If the child dies or its pipe
//! breaks, the tee closes its end and carries on; the primary stream is
//! never stalled or corrupted by a sick consumer.

use log::{info, warn};
use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::str::FromStr;

use super::byte_source::ByteSource;
use super::error::FilterError;
use super::record_reader::BufferedRecordReader;

/// A set of inclusive record-type ranges selecting which records to
/// duplicate.
#[derive(Debug, Clone, Default)]
pub struct TypeRangeSet {
    ranges: Vec<(u32, u32)>,
}

impl TypeRangeSet {
    pub fn new(ranges: Vec<(u32, u32)>) -> Result<Self, FilterError> {
        for &(lo, hi) in &ranges {
            if lo > hi {
                return Err(FilterError::BadTypeRange(lo, hi));
            }
        }
        Ok(Self { ranges })
    }

    pub fn contains(&self, record_type: u32) -> bool {
        self.ranges
            .iter()
            .any(|&(lo, hi)| lo <= record_type && record_type <= hi)
    }
}

/// One inclusive range, parsed from `N` or `N-M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRange(pub u32, pub u32);

impl FromStr for TypeRange {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || FilterError::BadRangeSyntax(s.to_string());
        match s.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo.trim().parse().map_err(|_| bad())?;
                let hi: u32 = hi.trim().parse().map_err(|_| bad())?;
                if lo > hi {
                    return Err(FilterError::BadTypeRange(lo, hi));
                }
                Ok(TypeRange(lo, hi))
            }
            None => {
                let value: u32 = s.trim().parse().map_err(|_| bad())?;
                Ok(TypeRange(value, value))
            }
        }
    }
}

pub struct RecordTee {
    child: Child,
    child_in: Option<ChildStdin>,
    ranges: TypeRangeSet,
}

impl RecordTee {
    /// Spawn the duplicate-consumer child. Its stdout is discarded so it can
    /// never interleave with the primary stream; stderr is inherited.
    pub fn spawn(command: &str, args: &[String], ranges: TypeRangeSet) -> Result<Self, FilterError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(FilterError::SpawnError)?;
        let child_in = child.stdin.take();
        Ok(Self {
            child,
            child_in,
            ranges,
        })
    }

    /// Pump records from `reader` to `out` until end-of-stream, duplicating
    /// selected types to the child. Returns the number of records forwarded.
    pub fn run<S: ByteSource, W: Write>(
        &mut self,
        reader: &mut BufferedRecordReader<S>,
        out: &mut W,
    ) -> Result<u64, FilterError> {
        let mut forwarded: u64 = 0;
        while let Some(record) = reader.read_next()? {
            record.write_to(out)?;
            forwarded += 1;

            if !self.ranges.contains(record.header.record_type) {
                continue;
            }
            let mut duplication_failed = false;
            if let Some(child_in) = self.child_in.as_mut() {
                if let Err(e) = record.write_to(child_in) {
                    warn!("Tee child stopped accepting records ({e}); duplication disabled");
                    duplication_failed = true;
                }
            }
            if duplication_failed {
                self.child_in = None;
            }
        }
        out.flush().map_err(FilterError::IOError)?;

        // Closing our end of the pipe lets the child see EOF and exit.
        self.child_in = None;
        match self.child.wait() {
            Ok(status) => info!("Tee child exited with {status}"),
            Err(e) => warn!("Could not reap tee child: {e}"),
        }
        Ok(forwarded)
    }
}
