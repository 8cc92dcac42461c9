//! Shared fixture builder for integration tests.
//!
//! Builds real BEV files on disk: `%` text header followed by framed,
//! zlib-compressed records, exactly as the reader expects to find them.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;
use tempfile::NamedTempFile;

pub const SCALER_SCHEMA: &str = "RUN::scaler {fcup/F,fcupgated/F,livetime/F,clock/L}";
pub const CONFIG_SCHEMA: &str = "RUN::config {run/I,event/I,torus/F,solenoid/F}";

/// In-memory BEV file under construction.
pub struct BevFile {
    header_lines: Vec<String>,
    records: Vec<Vec<u8>>,
}

impl BevFile {
    pub fn new() -> Self {
        Self {
            header_lines: vec!["% bev 1.0".to_string()],
            records: Vec::new(),
        }
    }

    pub fn with_run(mut self, run: u32) -> Self {
        self.header_lines.push(format!("% run {}", run));
        self
    }

    pub fn with_schema(mut self, decl: &str) -> Self {
        self.header_lines.push(format!("% schema {}", decl));
        self
    }

    /// Appends one record carrying the given `(bank_name, field_bytes)` pairs.
    pub fn push_record(&mut self, banks: &[(&str, &[u8])]) {
        let mut payload = Vec::new();
        for (name, data) in banks {
            payload.push(name.len() as u8);
            payload.extend_from_slice(name.as_bytes());
            payload.extend_from_slice(data);
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut record = Vec::new();
        record.extend_from_slice(b"BREC");
        record.write_u16::<LittleEndian>(banks.len() as u16).unwrap();
        record
            .write_u32::<LittleEndian>(compressed.len() as u32)
            .unwrap();
        record
            .write_u32::<LittleEndian>(payload.len() as u32)
            .unwrap();
        record.extend_from_slice(&compressed);
        self.records.push(record);
    }

    /// Serializes header and records into file bytes.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for line in &self.header_lines {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(b"% end\n");
        for record in &self.records {
            out.extend_from_slice(record);
        }
        out
    }

    /// Writes the file to a named temp file; the handle keeps it alive.
    pub fn write_temp(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&self.bytes()).unwrap();
        file.flush().unwrap();
        file
    }
}

/// Field bytes for a `RUN::scaler` bank.
pub fn scaler_fields(fcup: f32, fcupgated: f32, livetime: f32, clock: i64) -> Vec<u8> {
    let mut data = Vec::new();
    data.write_f32::<LittleEndian>(fcup).unwrap();
    data.write_f32::<LittleEndian>(fcupgated).unwrap();
    data.write_f32::<LittleEndian>(livetime).unwrap();
    data.write_i64::<LittleEndian>(clock).unwrap();
    data
}

/// Field bytes for a `RUN::config` bank.
pub fn config_fields(run: i32, event: i32, torus: f32, solenoid: f32) -> Vec<u8> {
    let mut data = Vec::new();
    data.write_i32::<LittleEndian>(run).unwrap();
    data.write_i32::<LittleEndian>(event).unwrap();
    data.write_f32::<LittleEndian>(torus).unwrap();
    data.write_f32::<LittleEndian>(solenoid).unwrap();
    data
}
