//! Sequential BEV record reader.
//!
//! A BEV file starts with a `%`-prefixed text header that carries the format
//! version and the bank schema dictionary, terminated by `% end`. The binary
//! body follows as a sequence of individually zlib-compressed records.
//!
//! The reader owns a single record buffer that is reused in place on every
//! [`Reader::next`] call. The current record is exposed through
//! [`Reader::event`], which borrows the reader, so an event view can never
//! outlive the record it projects.

use crate::dictionary::{BankSchema, Dictionary, DictionaryError};
use crate::event::Event;
use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use log::{debug, info};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while opening or advancing over a BEV file.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("unsupported BEV version: {0}")]
    UnsupportedVersion(String),

    #[error("header declares no bank schemas")]
    MissingSchema,

    #[error(transparent)]
    Schema(#[from] DictionaryError),

    #[error("bad record magic in record {record}")]
    BadRecordMagic { record: u64 },

    #[error("truncated record {record}")]
    TruncatedRecord { record: u64 },

    #[error("malformed record {record}: {reason}")]
    MalformedRecord { record: u64, reason: String },
}

/// Marker bytes at the start of every framed record.
const RECORD_MAGIC: [u8; 4] = *b"BREC";

/// Record header: magic, bank count (u16), compressed and uncompressed
/// payload lengths (u32 each), all little-endian.
const RECORD_HEADER_LEN: usize = 4 + 2 + 4 + 4;

/// Upper bound on a record's decompressed payload (64 MiB). A declared size
/// beyond this is treated as corrupt framing rather than an allocation
/// request.
const MAX_PAYLOAD_LEN: u32 = 64 * 1024 * 1024;

/// One bank entry inside the current record, located during framing.
///
/// Names and field data stay in the record's payload buffer; entries only
/// store ranges into it.
#[derive(Debug, Clone, Copy)]
struct BankEntry {
    name_start: usize,
    name_len: usize,
    data_start: usize,
    data_len: usize,
}

/// The currently loaded record: decompressed payload plus its bank directory.
///
/// Owned by the reader and reused across [`Reader::next`] calls.
#[derive(Debug, Default)]
pub(crate) struct Record {
    payload: Vec<u8>,
    entries: Vec<BankEntry>,
}

impl Record {
    /// Returns the field data of the named bank, if present in this record.
    pub(crate) fn bank_data(&self, name: &str) -> Option<&[u8]> {
        self.entries.iter().find_map(|e| {
            let entry_name = &self.payload[e.name_start..e.name_start + e.name_len];
            if entry_name == name.as_bytes() {
                Some(&self.payload[e.data_start..e.data_start + e.data_len])
            } else {
                None
            }
        })
    }

    /// Returns true if the named bank is present in this record.
    pub(crate) fn has_bank(&self, name: &str) -> bool {
        self.bank_data(name).is_some()
    }

    /// Number of banks in this record.
    pub(crate) fn bank_count(&self) -> usize {
        self.entries.len()
    }
}

/// Sequential cursor over the records of a BEV file.
///
/// Records are consumed strictly in file order; there is no random access and
/// no rewind. [`Reader::next`] returns `Ok(false)` only at a clean
/// end-of-stream; a truncated or corrupt tail is reported as an error so that
/// callers never mistake a partial file for a complete one.
#[derive(Debug)]
pub struct Reader<R> {
    input: R,
    dictionary: Dictionary,
    run: Option<u32>,
    record: Record,
    compressed: Vec<u8>,
    records_read: u64,
}

impl Reader<BufReader<File>> {
    /// Opens a BEV file and parses its header.
    ///
    /// Fails fast if the file cannot be opened, the header is not
    /// recognizable, the format version is unsupported, or no bank schemas
    /// are declared.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReadError::Open {
            path: path.display().to_string(),
            source,
        })?;
        info!("opening BEV file: {}", path.display());
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: BufRead> Reader<R> {
    /// Builds a reader over an already-open stream, parsing the header.
    ///
    /// The stream must be positioned at the start of the `%` header.
    pub fn from_reader(mut input: R) -> Result<Self, ReadError> {
        let header = parse_header(&mut input)?;
        info!("dictionary resolved: {} banks", header.dictionary.len());
        Ok(Self {
            input,
            dictionary: header.dictionary,
            run: header.run,
            record: Record::default(),
            compressed: Vec::new(),
            records_read: 0,
        })
    }

    /// Returns the dictionary parsed from the file header.
    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Returns the run number declared in the header, if any.
    pub fn run(&self) -> Option<u32> {
        self.run
    }

    /// Number of records successfully read so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Returns a view over the current record.
    ///
    /// Before the first successful [`Reader::next`] the view is over an empty
    /// record and every bank lookup reports absence.
    pub fn event(&self) -> Event<'_> {
        Event::new(&self.record, &self.dictionary)
    }

    /// Advances to the next record.
    ///
    /// Returns `Ok(true)` when a record was loaded, `Ok(false)` at a clean
    /// end-of-stream. Any structural problem with the framing or the payload
    /// is an error, never a silent stop. Advancing invalidates the previous
    /// record's contents.
    pub fn next(&mut self) -> Result<bool, ReadError> {
        let record = self.records_read + 1;

        let mut head = [0u8; RECORD_HEADER_LEN];
        match read_full(&mut self.input, &mut head)? {
            0 => return Ok(false),
            n if n < RECORD_HEADER_LEN => {
                return Err(ReadError::TruncatedRecord { record });
            }
            _ => {}
        }

        if head[..4] != RECORD_MAGIC {
            return Err(ReadError::BadRecordMagic { record });
        }
        let bank_count = LittleEndian::read_u16(&head[4..6]);
        let compressed_len = LittleEndian::read_u32(&head[6..10]);
        let uncompressed_len = LittleEndian::read_u32(&head[10..14]);

        if uncompressed_len > MAX_PAYLOAD_LEN || compressed_len > MAX_PAYLOAD_LEN {
            return Err(ReadError::MalformedRecord {
                record,
                reason: format!(
                    "declared record size {}/{} exceeds limit",
                    compressed_len, uncompressed_len
                ),
            });
        }

        self.compressed.resize(compressed_len as usize, 0);
        let got = read_full(&mut self.input, &mut self.compressed)?;
        if got < compressed_len as usize {
            return Err(ReadError::TruncatedRecord { record });
        }

        self.record.payload.clear();
        let mut decoder = ZlibDecoder::new(self.compressed.as_slice());
        decoder
            .read_to_end(&mut self.record.payload)
            .map_err(|e| ReadError::MalformedRecord {
                record,
                reason: format!("zlib: {}", e),
            })?;
        if self.record.payload.len() != uncompressed_len as usize {
            return Err(ReadError::MalformedRecord {
                record,
                reason: format!(
                    "payload size mismatch: declared {}, decompressed {}",
                    uncompressed_len,
                    self.record.payload.len()
                ),
            });
        }

        self.record.entries =
            parse_bank_directory(&self.record.payload, bank_count, &self.dictionary, record)?;

        self.records_read = record;
        debug!(
            "record {}: {} banks, {} payload bytes",
            record,
            self.record.entries.len(),
            self.record.payload.len()
        );
        Ok(true)
    }
}

/// Walks a decompressed payload and locates each bank entry.
///
/// Every entry must name a dictionary-declared bank (its byte length comes
/// from the schema) and the entries must cover the payload exactly.
fn parse_bank_directory(
    payload: &[u8],
    bank_count: u16,
    dictionary: &Dictionary,
    record: u64,
) -> Result<Vec<BankEntry>, ReadError> {
    let malformed = |reason: String| ReadError::MalformedRecord { record, reason };

    let mut entries = Vec::with_capacity(bank_count as usize);
    let mut pos = 0usize;

    for _ in 0..bank_count {
        let name_len = *payload
            .get(pos)
            .ok_or_else(|| malformed("bank entry overruns payload".to_string()))?
            as usize;
        pos += 1;

        let name_start = pos;
        let name_bytes = payload
            .get(pos..pos + name_len)
            .ok_or_else(|| malformed("bank name overruns payload".to_string()))?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| malformed("bank name is not valid UTF-8".to_string()))?;
        pos += name_len;

        let schema = dictionary
            .schema(name)
            .ok_or_else(|| malformed(format!("undeclared bank: {}", name)))?;

        let data_len = schema.byte_len();
        if payload.len() < pos + data_len {
            return Err(malformed(format!(
                "bank {} field data overruns payload",
                name
            )));
        }

        entries.push(BankEntry {
            name_start,
            name_len,
            data_start: pos,
            data_len,
        });
        pos += data_len;
    }

    if pos != payload.len() {
        return Err(malformed(format!(
            "{} trailing bytes after last bank",
            payload.len() - pos
        )));
    }

    Ok(entries)
}

/// Parsed contents of the `%` text header.
struct Header {
    dictionary: Dictionary,
    run: Option<u32>,
}

/// Parses the text header up to and including the `% end` line.
fn parse_header<R: BufRead>(input: &mut R) -> Result<Header, ReadError> {
    let mut version: Option<String> = None;
    let mut run: Option<u32> = None;
    let mut dictionary = Dictionary::new();
    let mut saw_end = false;

    loop {
        let peeked = input.fill_buf()?;
        if peeked.is_empty() || peeked[0] != b'%' {
            break;
        }

        let mut line = String::new();
        input.read_line(&mut line)?;
        let line = line.trim_end();

        if line == "% end" {
            saw_end = true;
            break;
        }

        parse_header_line(line, &mut version, &mut run, &mut dictionary)?;
    }

    if !saw_end {
        return Err(ReadError::InvalidHeader("missing % end line".to_string()));
    }

    match version {
        Some(v) if v.starts_with("1.") => {}
        Some(v) => return Err(ReadError::UnsupportedVersion(v)),
        None => {
            return Err(ReadError::InvalidHeader(
                "missing % bev version line".to_string(),
            ))
        }
    }

    if dictionary.is_empty() {
        return Err(ReadError::MissingSchema);
    }

    Ok(Header { dictionary, run })
}

/// Parses a single header line.
fn parse_header_line(
    line: &str,
    version: &mut Option<String>,
    run: &mut Option<u32>,
    dictionary: &mut Dictionary,
) -> Result<(), ReadError> {
    if let Some(v) = line.strip_prefix("% bev ") {
        *version = Some(v.trim().to_string());
    } else if let Some(decl) = line.strip_prefix("% schema ") {
        let schema = BankSchema::parse(decl)?;
        debug!("schema: {} ({} bytes)", schema.name(), schema.byte_len());
        dictionary.insert(schema)?;
    } else if let Some(value) = line.strip_prefix("% run ") {
        *run = value.trim().parse().ok();
    }
    // Other % lines are ignored so old readers keep working when new
    // informational lines appear.
    Ok(())
}

/// Reads until `buf` is full or the stream ends, returning the byte count.
fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<usize, std::io::Error> {
    let mut total = 0usize;
    while total < buf.len() {
        match input.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
