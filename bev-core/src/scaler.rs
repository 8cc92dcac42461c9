//! Scaler bank decoding and the beam-charge scan.
//!
//! `RUN::scaler` banks appear on a small subset of events and carry the
//! Faraday-cup readings. The gated, integrated charge (`fcupgated`) grows
//! monotonically over a run, so the maximum seen across a whole file is the
//! total accumulated beam charge.

use crate::event::{Event, EventError};
use crate::reader::{ReadError, Reader};
use log::info;
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

/// Errors that terminate a scan.
///
/// Per-event bank absence is not represented here: optional banks are normal
/// and scans skip over them. Everything else ends the scan, because a charge
/// total computed from a partial or corrupt stream would silently
/// under-report.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Decode(#[from] EventError),
}

/// Decoded `RUN::scaler` bank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalerBank {
    /// Ungated Faraday-cup integrated charge, nC
    pub fcup: f32,
    /// Gated Faraday-cup integrated charge, nC
    pub fcupgated: f32,
    /// DAQ livetime fraction
    pub livetime: f32,
    /// Scaler clock ticks
    pub clock: i64,
}

impl ScalerBank {
    /// Dictionary name of the scaler bank.
    pub const NAME: &'static str = "RUN::scaler";

    /// Decodes the scaler bank from an event, if the event carries one.
    pub fn from_event(event: &Event<'_>) -> Result<Option<Self>, EventError> {
        let Some(bank) = event.bank(Self::NAME)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            fcup: bank.get_float("fcup")?,
            fcupgated: bank.get_float("fcupgated")?,
            livetime: bank.get_float("livetime")?,
            clock: bank.get_long("clock")?,
        }))
    }
}

/// Streaming accumulator for the maximum integrated beam charge of a file.
///
/// Drives the reader through every record exactly once, decodes the scaler
/// bank where present, and folds `fcupgated` into a running maximum. The
/// result is a pure function of the file contents: scanning the same file
/// twice yields the same value.
#[derive(Debug, Clone, Default)]
pub struct BeamChargeScan {
    max_charge: f64,
    events: u64,
    scaler_events: u64,
}

impl BeamChargeScan {
    /// Creates an accumulator with zero charge and no events seen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans an entire file and returns the finished accumulator.
    ///
    /// Fails fast if the file cannot be opened or has no valid schema
    /// section. Any malformed record terminates the scan with the reader's
    /// error; there is no partial result.
    pub fn scan_file<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let mut reader = Reader::open(path)?;
        let mut scan = Self::new();
        while scan.step(&mut reader)? {}
        info!(
            "scan complete: {} events, {} with scalers, max charge {}",
            scan.events, scan.scaler_events, scan.max_charge
        );
        Ok(scan)
    }

    /// Processes one record: pull, decode, fold.
    ///
    /// Returns `Ok(false)` at a clean end-of-stream. Callers that own the
    /// loop can stop between calls, which is the only defined cancellation
    /// point; there is no mid-record cancellation.
    pub fn step<R: BufRead>(&mut self, reader: &mut Reader<R>) -> Result<bool, ScanError> {
        if !reader.next()? {
            return Ok(false);
        }
        self.events += 1;

        let event = reader.event();
        if let Some(scaler) = ScalerBank::from_event(&event)? {
            self.scaler_events += 1;
            self.fold(&scaler);
        }
        Ok(true)
    }

    /// Folds one scaler reading into the running maximum.
    ///
    /// Strict `>` comparison: a tie leaves the stored value in place, which
    /// is indistinguishable from replacing it.
    pub fn fold(&mut self, scaler: &ScalerBank) {
        let charge = f64::from(scaler.fcupgated);
        if charge > self.max_charge {
            self.max_charge = charge;
        }
    }

    /// The maximum integrated beam charge seen, in nC.
    ///
    /// 0.0 for a file with no scaler banks at all; check
    /// [`BeamChargeScan::scaler_events`] to tell that apart from a genuine
    /// zero reading.
    pub fn beam_charge(&self) -> f64 {
        self.max_charge
    }

    /// Total number of records processed.
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Number of records that carried a scaler bank.
    pub fn scaler_events(&self) -> u64 {
        self.scaler_events
    }
}
