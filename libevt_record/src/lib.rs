//! # evt_record_tools
//!
//! evt_record_tools is the record segmentation and streaming pipeline of a
//! FRIB-style data acquisition. It takes the continuous stream of
//! self-describing, length-prefixed binary records produced by a readout
//! front-end and turns it into size-capped, numbered segment files on disk,
//! and back again.
//!
//! The pieces, bottom up:
//!
//! - [`record`]: the 28-byte wire header codec (big-endian fields, native
//!   byte-order sentinel for endian detection) and the time-stamped control
//!   payload carried by run-boundary records.
//! - [`record_reader`]: reassembly of complete records from a byte stream
//!   with arbitrary read chunking, including headers split across reads,
//!   with non-blocking readiness probes and tail-follow support.
//! - [`segment_writer`]: the run segmenter. Splits one run into
//!   `run%04u_%04u.evt` files capped at a configurable size, marks each
//!   rotation with a continue-next-file record, and guarantees that every
//!   run's final record is either a genuine end-run or a synthesized
//!   bad-end, so truncation is always detectable by record type.
//! - [`segment_reader`]: the concatenator. Reassembles a run's segments
//!   back into one stream, consuming rotation markers along the way.
//! - [`injector`] / [`tee`]: child-process stream multiplexers built on the
//!   reader; one merges a secondary stream in at record boundaries, the
//!   other duplicates selected record types out.
//!
//! Everything is single-threaded, blocking I/O; pipelines are built from OS
//! processes connected by pipes. The segmenter installs a signal policy
//! ([`signal`]) so a broken pipe or a stray Ctrl-C can never leave a run
//! without its terminator record.
//!
//! ## Binaries
//!
//! The companion `evt_record_cli` crate ships the four pipeline tools:
//! `segmenter`, `daqcat`, `daqtee`, and `asciionramp`. See their `--help`
//! output for usage.

pub mod byte_source;
pub mod config;
pub mod constants;
pub mod error;
pub mod injector;
pub mod record;
pub mod record_reader;
pub mod segment_reader;
pub mod segment_writer;
pub mod signal;
pub mod tee;
