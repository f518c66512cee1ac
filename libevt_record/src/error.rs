use std::path::PathBuf;
use thiserror::Error;

use super::constants::*;

#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("Buffer of {0} bytes is too small to hold a {size} byte record header", size = ENCODED_HEADER_SIZE)]
    BufferTooSmall(usize),
    #[error("Decoded record header version {0} does not match the current version {exp}", exp = RECORD_FORMAT_VERSION)]
    VersionMismatch(u16),
    #[error("Payload of {0} bytes does not match the header data size of {1} bytes")]
    PayloadSizeMismatch(usize, u32),
    #[error("Payload of {0} bytes is too short to hold a time-stamped record body")]
    BadTimestampedBody(usize),
    #[error("Time-stamped record body carries an out-of-range wall clock value {0}")]
    BadClockValue(i64),
}

#[derive(Debug, Error)]
pub enum WireWriteError {
    #[error("Short write: {0} of {1} record bytes written")]
    Short(usize, usize),
    #[error("Record header encode failed: {0}")]
    Codec(#[from] CodecError),
    #[error("Record write failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Reader failed to decode a record header: {0}")]
    BadHeader(#[from] CodecError),
    #[error("Record header declares {0} bytes which exceeds the reader limit of {1} bytes")]
    RecordTooLarge(u32, u32),
    #[error("Record header declares {0} total bytes but its sections sum to {1} bytes")]
    InconsistentSize(u32, u64),
    #[error("Stream ended inside a record header ({0} of {exp} bytes buffered)", exp = ENCODED_HEADER_SIZE)]
    TruncatedHeader(usize),
    #[error("Reader failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SegmenterError {
    #[error("Segment directory {0:?} does not exist")]
    BadDirectory(PathBuf),
    #[error("Received a begin-run for run {1} while run {0} is still open")]
    BeginWhileOpen(u32, u32),
    #[error("Received an {name} record with no run open; the stream did not start with a begin-run", name = record_type_name(*.0))]
    RecordBeforeBegin(u32),
    #[error("Begin-run record carries no usable run number: {0}")]
    BadBeginRun(CodecError),
    #[error("Segment file {0:?} already exists; refusing to overwrite recorded data")]
    SegmentExists(PathBuf),
    #[error("Segmenter failed to write a record: {0}")]
    WriteError(#[from] WireWriteError),
    #[error("Segmenter failed to read the input stream: {0}")]
    ReadError(#[from] ReaderError),
    #[error("Segmenter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConcatError {
    #[error("First segment {0:?} of run {1} does not exist")]
    MissingFirstSegment(PathBuf, u32),
    #[error("Segment {1} of run {0} is missing but the previous segment ended in a continuation record")]
    MissingSegment(u32, u32),
    #[error("Concatenator failed to read a record: {0}")]
    ReadError(#[from] ReaderError),
    #[error("Concatenator failed to write a record downstream: {0}")]
    WriteError(#[from] WireWriteError),
    #[error("Concatenator failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Record type {0} is reserved for run boundaries and cannot be assigned by a filter")]
    ReservedType(u32),
    #[error("Invalid record type range: {0} > {1}")]
    BadTypeRange(u32, u32),
    #[error("Could not parse record type range {0:?}; expected N or N-M")]
    BadRangeSyntax(String),
    #[error("Filter child process could not be spawned: {0}")]
    SpawnError(std::io::Error),
    #[error("Filter failed to read the input stream: {0}")]
    ReadError(#[from] ReaderError),
    #[error("Filter failed to write a record: {0}")]
    WriteError(#[from] WireWriteError),
    #[error("Filter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}
