//! Shared constants of the record wire format and the segmentation tools.

/// Format version stamped into every record header. A decoded header whose
/// version differs from this one is a protocol-incompatible stream.
pub const RECORD_FORMAT_VERSION: u16 = 1;

/// Encoded size of a record header on the wire, in bytes.
pub const ENCODED_HEADER_SIZE: usize = 28;

/// Sentinel written verbatim (producer native order) into the `byte_order`
/// header field. A consumer seeing anything else knows the producer's
/// endianness differs from its own.
pub const BYTE_ORDER_SENTINEL: u32 = 0x0102_0304;

// Record type codes. The four run-boundary types are reserved: user-level
// filters may not claim them, and the segmentation tools act on them.

pub const TYPE_PHYSICS: u32 = 1;
pub const TYPE_SCALER: u32 = 2;
pub const TYPE_BEGIN_RUN: u32 = 3;
pub const TYPE_END_RUN: u32 = 4;
pub const TYPE_BAD_END: u32 = 5;
pub const TYPE_CONTINUE_NEXT_FILE: u32 = 6;
pub const TYPE_RUN_VARIABLES: u32 = 7;
pub const TYPE_STATE_VARIABLES: u32 = 8;
pub const TYPE_PACKET_TYPES: u32 = 9;
pub const TYPE_STATISTICS: u32 = 10;
pub const TYPE_PARAMETER_DESCRIPTORS: u32 = 11;

/// First record type code available to user-level filters.
pub const FIRST_USER_TYPE: u32 = 32768;

// Record status codes.

pub const STATUS_OK: u16 = 0;
pub const STATUS_ERROR: u16 = 1;
pub const STATUS_TRUNCATED: u16 = 2;
pub const STATUS_RUN_INCOMPLETE: u16 = 3;

/// Default segment size threshold in megabytes.
pub const DEFAULT_SEGMENT_SIZE_MB: u64 = 2000;

/// Size of the raw intake buffer used by the buffered reader.
pub const INTAKE_BUFFER_SIZE: usize = 8192;

/// Largest record the buffered reader will stage. A header declaring more
/// than this is treated as stream corruption rather than a growth request.
pub const DEFAULT_MAX_RECORD_SIZE: u32 = 256 * 1024 * 1024;

/// Human-readable name for a record type code, for log and error text.
pub fn record_type_name(record_type: u32) -> &'static str {
    match record_type {
        TYPE_PHYSICS => "physics",
        TYPE_SCALER => "scaler",
        TYPE_BEGIN_RUN => "begin-run",
        TYPE_END_RUN => "end-run",
        TYPE_BAD_END => "bad-end",
        TYPE_CONTINUE_NEXT_FILE => "continue-next-file",
        TYPE_RUN_VARIABLES => "run-variables",
        TYPE_STATE_VARIABLES => "state-variables",
        TYPE_PACKET_TYPES => "packet-types",
        TYPE_STATISTICS => "statistics",
        TYPE_PARAMETER_DESCRIPTORS => "parameter-descriptors",
        t if t >= FIRST_USER_TYPE => "user",
        _ => "unknown",
    }
}

/// True for the run-boundary type codes that user filters may not claim.
pub fn is_reserved_type(record_type: u32) -> bool {
    matches!(
        record_type,
        TYPE_BEGIN_RUN | TYPE_END_RUN | TYPE_BAD_END | TYPE_CONTINUE_NEXT_FILE
    )
}
