use crate::errors::CoreError;

/// Magic bytes identifying a CPSN (crypto portfolio snapshot) store file.
/// The payload holds the portfolios.
pub const MAGIC: &[u8; 4] = b"CPSN";

/// Current file format version.
pub const CURRENT_VERSION: u16 = 1;

/// Header size in bytes: magic(4) + version(2) + payload_len(8) = 14
pub const HEADER_SIZE: usize = 14;

/// Header read from a store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub payload_len: u64,
}

/// Write a complete store file to bytes.
///
/// Layout:
/// ```text
/// [CPSN: 4B] [version: 2B LE] [payload_len: 8B LE] [payload: variable]
/// ```
pub fn write_file(version: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&version.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Parse the header from raw file bytes.
/// Returns the header and the payload slice.
pub fn read_file(data: &[u8]) -> Result<(FileHeader, &[u8]), CoreError> {
    if data.len() < HEADER_SIZE {
        return Err(CoreError::InvalidFileFormat(
            "File too small to be a valid CPSN file".into(),
        ));
    }

    if &data[0..4] != MAGIC {
        return Err(CoreError::InvalidFileFormat(
            "Invalid magic bytes: not a CPSN file".into(),
        ));
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version == 0 || version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let payload_len = u64::from_le_bytes(data[6..HEADER_SIZE].try_into().map_err(|_| {
        CoreError::InvalidFileFormat("Failed to read payload length".into())
    })?);

    let available = (data.len() - HEADER_SIZE) as u64;
    if available < payload_len {
        return Err(CoreError::InvalidFileFormat(format!(
            "File truncated: expected {payload_len} bytes of payload, got {available}"
        )));
    }

    let end = HEADER_SIZE + payload_len as usize;
    Ok((
        FileHeader {
            version,
            payload_len,
        },
        &data[HEADER_SIZE..end],
    ))
}

// ── Snapshot log ────────────────────────────────────────────────────

/// Magic bytes identifying a CPSL (snapshot log) file.
pub const LOG_MAGIC: &[u8; 4] = b"CPSL";

/// Current snapshot log version.
pub const LOG_VERSION: u16 = 1;

/// Log header size in bytes: magic(4) + version(2) = 6
pub const LOG_HEADER_SIZE: usize = 6;

/// Record length prefix size in bytes (u32 LE).
pub const RECORD_PREFIX_SIZE: usize = 4;

/// Header bytes that start every snapshot log.
///
/// Layout:
/// ```text
/// [CPSL: 4B] [version: 2B LE] ([record_len: 4B LE] [record: variable])*
/// ```
pub fn log_header() -> Vec<u8> {
    let mut buf = Vec::with_capacity(LOG_HEADER_SIZE);
    buf.extend_from_slice(LOG_MAGIC);
    buf.extend_from_slice(&LOG_VERSION.to_le_bytes());
    buf
}

/// Validate a snapshot log header and return its version.
pub fn read_log_header(data: &[u8]) -> Result<u16, CoreError> {
    if data.len() < LOG_HEADER_SIZE {
        return Err(CoreError::InvalidFileFormat(
            "File too small to be a valid CPSL log".into(),
        ));
    }

    if &data[0..4] != LOG_MAGIC {
        return Err(CoreError::InvalidFileFormat(
            "Invalid magic bytes: not a CPSL log".into(),
        ));
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version == 0 || version > LOG_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }
    Ok(version)
}

/// Frame one record payload with its length prefix.
pub fn encode_record(payload: &[u8]) -> Result<Vec<u8>, CoreError> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        CoreError::Serialization(format!("Record of {} bytes is too large", payload.len()))
    })?;
    let mut buf = Vec::with_capacity(RECORD_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Split the complete records at the front of `data` (bytes after the log
/// header). Returns the record payloads and how many bytes they span. An
/// incomplete trailing record is left unconsumed.
pub fn split_records(data: &[u8]) -> (Vec<&[u8]>, usize) {
    let mut records = Vec::new();
    let mut pos = 0;
    while data.len() - pos >= RECORD_PREFIX_SIZE {
        let prefix = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
        let len = u32::from_le_bytes(prefix) as usize;
        let start = pos + RECORD_PREFIX_SIZE;
        if data.len() - start < len {
            break;
        }
        records.push(&data[start..start + len]);
        pos = start + len;
    }
    (records, pos)
}
