//! The injector filter: interleaves a child process's output into the
//! primary record stream as records of a caller-assigned type.
//!
//! Injection happens only at primary record boundaries; a primary record is
//! never split. All three inputs (primary stream, child stdout, child
//! stderr) are multiplexed with one poll so none can starve the others.

use log::{info, warn};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};

use super::byte_source::{poll_many, ByteSource, FdSource};
use super::constants::*;
use super::error::FilterError;
use super::record::{Record, RecordHeader};
use super::record_reader::BufferedRecordReader;

/// Wrap raw child-output bytes in a record of the given type. The entity
/// count is the number of newline-terminated lines, minimum one, matching
/// the text-record convention.
pub fn wrap_bytes(record_type: u32, bytes: &[u8]) -> Record {
    let lines = bytes.iter().filter(|&&b| b == b'\n').count().max(1);
    let mut header = RecordHeader::new();
    header.record_type = record_type;
    header.data_size = bytes.len() as u32;
    header.record_size = (ENCODED_HEADER_SIZE + bytes.len()) as u32;
    header.entity_count = lines as u32;
    Record {
        header,
        body: bytes.to_vec(),
    }
}

pub struct Injector {
    inject_type: u32,
    child: Child,
    child_out: Option<ChildStdout>,
    child_err: Option<ChildStderr>,
}

impl Injector {
    /// Spawn the secondary producer. The assigned record type must not be a
    /// reserved run-boundary type; claiming one is a configuration error.
    pub fn spawn(command: &str, args: &[String], inject_type: u32) -> Result<Self, FilterError> {
        if is_reserved_type(inject_type) {
            return Err(FilterError::ReservedType(inject_type));
        }
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(FilterError::SpawnError)?;
        let child_out = child.stdout.take();
        let child_err = child.stderr.take();
        Ok(Self {
            inject_type,
            child,
            child_out,
            child_err,
        })
    }

    /// Pump until the primary stream and the child's output are both
    /// exhausted. Primary records pass through unmodified; child output is
    /// injected between them as records of the assigned type.
    pub fn run<T: Read + AsRawFd, W: Write>(
        &mut self,
        primary: T,
        out: &mut W,
    ) -> Result<(), FilterError> {
        let primary_fd = primary.as_raw_fd();
        let mut reader = BufferedRecordReader::new(FdSource::new(primary));
        let mut chunk = [0u8; 4096];

        loop {
            let primary_live = !reader.source_mut().at_eof();
            let mut fds: Vec<libc::c_int> = Vec::with_capacity(3);
            let mut roles: Vec<u8> = Vec::with_capacity(3);
            if primary_live {
                fds.push(primary_fd);
                roles.push(0);
            }
            if let Some(child_out) = &self.child_out {
                fds.push(child_out.as_raw_fd());
                roles.push(1);
            }
            if let Some(child_err) = &self.child_err {
                fds.push(child_err.as_raw_fd());
                roles.push(2);
            }
            if fds.is_empty() {
                break;
            }

            let readable = poll_many(&fds, -1)?;
            for (idx, &is_readable) in readable.iter().enumerate() {
                if !is_readable {
                    continue;
                }
                match roles[idx] {
                    0 => {
                        // Drain every complete primary record currently
                        // staged; anything partial waits for the next poll.
                        while reader.ready()? {
                            if let Some(record) = reader.read_next()? {
                                record.write_to(out)?;
                            }
                        }
                    }
                    1 => {
                        let got = match self.child_out.as_mut() {
                            Some(child_out) => child_out.read(&mut chunk)?,
                            None => 0,
                        };
                        if got == 0 {
                            self.child_out = None;
                        } else {
                            // We are between primary records here, so the
                            // injected record cannot split one.
                            wrap_bytes(self.inject_type, &chunk[..got]).write_to(out)?;
                        }
                    }
                    _ => {
                        let got = match self.child_err.as_mut() {
                            Some(child_err) => child_err.read(&mut chunk)?,
                            None => 0,
                        };
                        if got == 0 {
                            self.child_err = None;
                        } else {
                            warn!(
                                "Injector child stderr: {}",
                                String::from_utf8_lossy(&chunk[..got]).trim_end()
                            );
                        }
                    }
                }
            }
        }

        // A primary stream that died mid-record still owes the consumer its
        // short-but-well-formed final record.
        while let Some(record) = reader.read_next()? {
            record.write_to(out)?;
        }
        out.flush().map_err(FilterError::IOError)?;

        match self.child.wait() {
            Ok(status) => info!("Injector child exited with {status}"),
            Err(e) => warn!("Could not reap injector child: {e}"),
        }
        Ok(())
    }
}
