//! End-to-end tests of the segmentation pipeline: records in, segment files
//! on disk, records back out.

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::FromRawFd;
use std::path::Path;

use libevt_record::byte_source::ByteSource;
use libevt_record::constants::*;
use libevt_record::error::{ConcatError, SegmenterError};
use libevt_record::injector::Injector;
use libevt_record::record::{pack_timestamped, Record, RecordHeader};
use libevt_record::record_reader::BufferedRecordReader;
use libevt_record::segment_reader::{ConcatOutcome, RunConcatenator};
use libevt_record::segment_writer::{segment_path, RunSegmenter, SegmenterOutcome};
use libevt_record::tee::{RecordTee, TypeRangeSet};

/// A fully buffered in-memory stream standing in for the producer pipe.
struct MemorySource {
    data: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl MemorySource {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            eof: false,
        }
    }
}

impl ByteSource for MemorySource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.len() - self.pos;
        if remaining == 0 {
            self.eof = true;
            return Ok(0);
        }
        let take = remaining.min(buf.len());
        buf[..take].copy_from_slice(&self.data[self.pos..self.pos + take]);
        self.pos += take;
        Ok(take)
    }

    fn poll_readable(&mut self) -> io::Result<bool> {
        Ok(!self.eof && self.pos < self.data.len())
    }

    fn wait_readable(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn at_eof(&self) -> bool {
        self.eof
    }

    fn clear_eof(&mut self) {
        self.eof = false;
    }
}

fn physics(payload: &[u8]) -> Record {
    let mut header = RecordHeader::new();
    header.data_size = payload.len() as u32;
    header.record_size = (ENCODED_HEADER_SIZE + payload.len()) as u32;
    header.entity_count = 1;
    Record {
        header,
        body: payload.to_vec(),
    }
}

fn stream_bytes(records: &[Record]) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        record.write_to(&mut out).expect("wire encode");
    }
    out
}

fn read_all_records(bytes: Vec<u8>) -> Vec<Record> {
    let mut reader = BufferedRecordReader::new(MemorySource::new(bytes));
    let mut records = Vec::new();
    while let Some(record) = reader.read_next().expect("well-formed stream") {
        records.push(record);
    }
    records
}

fn read_segment_file(path: &Path) -> Vec<Record> {
    read_all_records(std::fs::read(path).expect("segment file should exist"))
}

fn segment_records(dir: &Path, run: u32, sequence: u32) -> Vec<Record> {
    read_segment_file(&segment_path(dir, run, sequence))
}

fn os_pipe() -> (File, File) {
    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) }
}

#[test]
fn clean_run_round_trips_through_segments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let payloads: Vec<Vec<u8>> = (0u8..20).map(|i| vec![i; 50 + i as usize]).collect();

    let mut records = vec![pack_timestamped(TYPE_BEGIN_RUN, 7, "round trip")];
    for p in &payloads {
        records.push(physics(p));
    }
    records.push(pack_timestamped(TYPE_END_RUN, 7, "round trip"));

    let mut reader = BufferedRecordReader::new(MemorySource::new(stream_bytes(&records)));
    let mut segmenter = RunSegmenter::new(dir.path(), 100).expect("segmenter");
    let outcome = segmenter.process(&mut reader).expect("process");
    assert_eq!(outcome, SegmenterOutcome::CleanEnd { run: 7, segments: 1 });

    let mut dumped = Vec::new();
    let mut concat = RunConcatenator::new(dir.path(), 7).expect("concatenator");
    let concat_outcome = concat.dump(&mut dumped).expect("dump");
    assert_eq!(concat_outcome, ConcatOutcome::CleanEnd { segments: 1 });

    let replayed = read_all_records(dumped);
    assert_eq!(replayed.len(), records.len());
    for (got, want) in replayed.iter().zip(&records) {
        assert_eq!(got.header.record_type, want.header.record_type);
        assert_eq!(got.header.data_size, want.header.data_size);
        assert_eq!(got.body, want.body);
    }
}

#[test]
fn oversized_run_rotates_into_numbered_segments() {
    let dir = tempfile::tempdir().expect("tempdir");
    // 1 MB cap, 100 KB payloads: rotation after roughly ten records.
    let payload = vec![0x5au8; 100 * 1024];
    let mut records = vec![pack_timestamped(TYPE_BEGIN_RUN, 7, "big run")];
    for _ in 0..15 {
        records.push(physics(&payload));
    }
    records.push(pack_timestamped(TYPE_END_RUN, 7, "big run"));

    let mut reader = BufferedRecordReader::new(MemorySource::new(stream_bytes(&records)));
    let mut segmenter = RunSegmenter::new(dir.path(), 1).expect("segmenter");
    let outcome = segmenter.process(&mut reader).expect("process");
    assert_eq!(outcome, SegmenterOutcome::CleanEnd { run: 7, segments: 2 });

    // Segment 0 is terminated by the rotation marker.
    let seg0 = segment_records(dir.path(), 7, 0);
    assert_eq!(
        seg0.last().expect("segment 0 has records").header.record_type,
        TYPE_CONTINUE_NEXT_FILE
    );
    assert_eq!(seg0.first().expect("records").header.record_type, TYPE_BEGIN_RUN);

    // Segment 1 starts with physics and ends with the genuine end-run.
    let seg1 = segment_records(dir.path(), 7, 1);
    assert_eq!(seg1.first().expect("records").header.record_type, TYPE_PHYSICS);
    assert_eq!(
        seg1.last().expect("records").header.record_type,
        TYPE_END_RUN
    );

    // No segment exceeds the cap by more than one record plus one marker.
    let cap = 1024 * 1024;
    let record_wire = (ENCODED_HEADER_SIZE + payload.len()) as u64;
    let marker_wire = seg0.last().unwrap().wire_size();
    for seq in 0..2 {
        let len = std::fs::metadata(segment_path(dir.path(), 7, seq))
            .expect("metadata")
            .len();
        assert!(len <= cap + record_wire + marker_wire);
    }

    // Every physics record survives, in order.
    let mut dumped = Vec::new();
    RunConcatenator::new(dir.path(), 7)
        .expect("concatenator")
        .dump(&mut dumped)
        .expect("dump");
    let replayed = read_all_records(dumped);
    let physics_count = replayed
        .iter()
        .filter(|r| r.header.record_type == TYPE_PHYSICS)
        .count();
    assert_eq!(physics_count, 15);
    assert!(replayed
        .iter()
        .all(|r| r.header.record_type != TYPE_CONTINUE_NEXT_FILE));
}

#[test]
fn producer_death_synthesizes_bad_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = vec![
        pack_timestamped(TYPE_BEGIN_RUN, 3, "doomed run"),
        physics(b"last data before the crash"),
    ];

    let mut reader = BufferedRecordReader::new(MemorySource::new(stream_bytes(&records)));
    let mut segmenter = RunSegmenter::new(dir.path(), 100).expect("segmenter");
    let outcome = segmenter.process(&mut reader).expect("process");
    assert_eq!(outcome, SegmenterOutcome::BadEnd { run: 3, segments: 1 });

    let seg0 = segment_records(dir.path(), 3, 0);
    let last = seg0.last().expect("records");
    assert_eq!(last.header.record_type, TYPE_BAD_END);
    assert_eq!(last.header.status_code, STATUS_RUN_INCOMPLETE);

    // The concatenator still dumps the run, flagged incomplete.
    let mut dumped = Vec::new();
    let concat_outcome = RunConcatenator::new(dir.path(), 3)
        .expect("concatenator")
        .dump(&mut dumped)
        .expect("dump");
    assert_eq!(concat_outcome, ConcatOutcome::BadEnd { segments: 1 });
}

#[test]
fn reader_failure_mid_run_still_writes_bad_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bytes = stream_bytes(&[
        pack_timestamped(TYPE_BEGIN_RUN, 3, "dying producer"),
        physics(b"good data"),
    ]);
    // The producer died ten bytes into its next record header.
    bytes.extend_from_slice(&[0u8; 10]);

    let mut reader = BufferedRecordReader::new(MemorySource::new(bytes));
    let mut segmenter = RunSegmenter::new(dir.path(), 100).expect("segmenter");
    let result = segmenter.process(&mut reader);
    assert!(matches!(result, Err(SegmenterError::ReadError(_))));

    // Even the failed run's segment ends in its terminator record.
    let seg0 = segment_records(dir.path(), 3, 0);
    let last = seg0.last().expect("records");
    assert_eq!(last.header.record_type, TYPE_BAD_END);
    assert_eq!(last.header.status_code, STATUS_RUN_INCOMPLETE);
}

#[test]
fn tee_child_death_leaves_primary_stream_intact() {
    let records = vec![
        pack_timestamped(TYPE_BEGIN_RUN, 4, "teed run"),
        physics(b"one"),
        physics(b"two"),
        pack_timestamped(TYPE_END_RUN, 4, "teed run"),
    ];
    let bytes = stream_bytes(&records);

    let ranges = TypeRangeSet::new(vec![(TYPE_PHYSICS, TYPE_PHYSICS)]).expect("ranges");
    let mut tee = RecordTee::spawn("false", &[], ranges).expect("spawn");
    // Give the child time to exit before any duplication is attempted.
    std::thread::sleep(std::time::Duration::from_millis(100));

    let mut reader = BufferedRecordReader::new(MemorySource::new(bytes.clone()));
    let mut out = Vec::new();
    let forwarded = tee.run(&mut reader, &mut out).expect("run");
    assert_eq!(forwarded, 4);
    assert_eq!(out, bytes);
}

#[test]
fn injector_passes_primary_records_through_intact() {
    let records = vec![
        pack_timestamped(TYPE_BEGIN_RUN, 9, "monitored run"),
        physics(b"alpha"),
        physics(b"beta"),
        pack_timestamped(TYPE_END_RUN, 9, "monitored run"),
    ];
    let bytes = stream_bytes(&records);

    let (primary, mut producer) = os_pipe();
    producer.write_all(&bytes).expect("fill pipe");
    drop(producer);

    let mut injector =
        Injector::spawn("echo", &[String::from("status ok")], FIRST_USER_TYPE).expect("spawn");
    let mut out = Vec::new();
    injector.run(primary, &mut out).expect("run");

    // The merged stream must parse cleanly: injection never splits a
    // primary record.
    let replayed = read_all_records(out);
    let (injected, primary): (Vec<Record>, Vec<Record>) = replayed
        .into_iter()
        .partition(|r| r.header.record_type == FIRST_USER_TYPE);
    assert_eq!(primary, records);

    assert!(!injected.is_empty());
    let text: Vec<u8> = injected.iter().flat_map(|r| r.body.clone()).collect();
    assert_eq!(text, b"status ok\n".to_vec());
}

#[test]
fn missing_interior_segment_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Handcraft segment 0 of run 3 ending in a continuation record with no
    // segment 1 behind it.
    let records = vec![
        pack_timestamped(TYPE_BEGIN_RUN, 3, "lost segment"),
        physics(b"some data"),
        pack_timestamped(TYPE_CONTINUE_NEXT_FILE, 3, "lost segment"),
    ];
    std::fs::write(segment_path(dir.path(), 3, 0), stream_bytes(&records)).expect("seed");

    let mut dumped = Vec::new();
    let result = RunConcatenator::new(dir.path(), 3)
        .expect("concatenator")
        .dump(&mut dumped);
    assert!(matches!(result, Err(ConcatError::MissingSegment(3, 1))));
}

#[test]
fn begin_while_open_terminates_old_run_then_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = vec![
        pack_timestamped(TYPE_BEGIN_RUN, 1, "first"),
        physics(b"data"),
        pack_timestamped(TYPE_BEGIN_RUN, 2, "second"),
    ];

    let mut reader = BufferedRecordReader::new(MemorySource::new(stream_bytes(&records)));
    let mut segmenter = RunSegmenter::new(dir.path(), 100).expect("segmenter");
    let result = segmenter.process(&mut reader);
    assert!(matches!(result, Err(SegmenterError::BeginWhileOpen(1, 2))));

    // The first run's segment was still closed out in-band.
    let seg0 = segment_records(dir.path(), 1, 0);
    assert_eq!(
        seg0.last().expect("records").header.record_type,
        TYPE_BAD_END
    );
}

#[test]
fn stream_must_open_with_a_begin_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = vec![physics(b"orphan data")];

    let mut reader = BufferedRecordReader::new(MemorySource::new(stream_bytes(&records)));
    let mut segmenter = RunSegmenter::new(dir.path(), 100).expect("segmenter");
    let result = segmenter.process(&mut reader);
    assert!(matches!(
        result,
        Err(SegmenterError::RecordBeforeBegin(TYPE_PHYSICS))
    ));
}

#[test]
fn pre_existing_segment_file_is_never_overwritten() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(segment_path(dir.path(), 5, 0), b"previously recorded").expect("seed");

    let records = vec![pack_timestamped(TYPE_BEGIN_RUN, 5, "collision")];
    let mut reader = BufferedRecordReader::new(MemorySource::new(stream_bytes(&records)));
    let mut segmenter = RunSegmenter::new(dir.path(), 100).expect("segmenter");
    let result = segmenter.process(&mut reader);
    assert!(matches!(result, Err(SegmenterError::SegmentExists(_))));
}

#[test]
fn empty_input_produces_no_segments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut reader = BufferedRecordReader::new(MemorySource::new(Vec::new()));
    let mut segmenter = RunSegmenter::new(dir.path(), 100).expect("segmenter");
    let outcome = segmenter.process(&mut reader).expect("process");
    assert_eq!(outcome, SegmenterOutcome::NoInput);
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}
