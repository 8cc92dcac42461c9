//! BEV 1.0 banked-event decoder library.
//!
//! This crate reads BEV files: sequential streams of compressed event
//! records whose typed sub-structures ("banks") are described by a schema
//! dictionary embedded in the file header. Bank layouts are resolved once
//! per file; per-event decoding is lazy and name-based.
//!
//! # Example
//!
//! ```no_run
//! use bev_core::BeamChargeScan;
//!
//! let scan = BeamChargeScan::scan_file("run_4013.bev").unwrap();
//!
//! println!("accumulated beam charge: {} nC", scan.beam_charge());
//! println!("{} events, {} with scalers", scan.events(), scan.scaler_events());
//! ```
//!
//! # Features
//!
//! - Text-header schema dictionary with one-letter field type codes
//! - Sequential record reader with per-record zlib decompression
//! - Lazy, name-based bank decoding with exact-width type checking
//! - Streaming beam-charge accumulator over the `RUN::scaler` bank
//! - Clean end-of-stream distinguished from truncated or corrupt tails

pub mod dictionary;
pub mod event;
pub mod reader;
pub mod scaler;
pub mod types;

// Re-export commonly used types
pub use dictionary::{BankSchema, Dictionary, DictionaryError, FieldDescriptor};
pub use event::{Bank, Event, EventError};
pub use reader::{ReadError, Reader};
pub use scaler::{BeamChargeScan, ScalerBank, ScanError};
pub use types::{FieldType, Value};
