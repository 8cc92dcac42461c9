//! Event view and typed bank decoding.
//!
//! An [`Event`] is a non-owning projection over the reader's current record
//! and the file dictionary. Its lifetime is bounded to one record: advancing
//! the reader requires a mutable borrow, which the compiler refuses while an
//! event view is alive.
//!
//! Bank decoding is lazy. Only the banks a caller asks for are materialized,
//! and decoding is a pure read of the record buffer.

use crate::dictionary::{BankSchema, Dictionary};
use crate::reader::Record;
use crate::types::{FieldType, Value};
use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Errors raised while decoding or querying a bank.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("unknown field {field} in bank {bank}")]
    UnknownField { bank: String, field: String },

    #[error("type mismatch for {bank}.{field}: requested {requested}, declared {declared}")]
    TypeMismatch {
        bank: String,
        field: String,
        requested: FieldType,
        declared: FieldType,
    },

    #[error("bank {bank} field data too short: expected {expected} bytes, found {found}")]
    ShortBank {
        bank: String,
        expected: usize,
        found: usize,
    },
}

/// A view over one record, bound to the dictionary that describes it.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    record: &'a Record,
    dictionary: &'a Dictionary,
}

impl<'a> Event<'a> {
    pub(crate) fn new(record: &'a Record, dictionary: &'a Dictionary) -> Self {
        Self { record, dictionary }
    }

    /// Decodes the named bank from this event.
    ///
    /// Returns `Ok(None)` when the bank is absent, either because this record
    /// does not carry it or because the dictionary does not declare it.
    /// Absence is an expected per-event condition, not an error: optional
    /// banks only appear on a subset of events.
    pub fn bank(&self, name: &str) -> Result<Option<Bank>, EventError> {
        let Some(schema) = self.dictionary.schema(name) else {
            return Ok(None);
        };
        let Some(data) = self.record.bank_data(name) else {
            return Ok(None);
        };
        Bank::decode(schema, data).map(Some)
    }

    /// Returns true if this record carries the named bank.
    pub fn has_bank(&self, name: &str) -> bool {
        self.record.has_bank(name)
    }

    /// Number of banks carried by this record.
    pub fn bank_count(&self) -> usize {
        self.record.bank_count()
    }

    /// The dictionary this event resolves bank layouts against.
    pub fn dictionary(&self) -> &Dictionary {
        self.dictionary
    }
}

/// A materialized bank: named, typed field values for one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Bank {
    name: String,
    fields: Vec<(String, Value)>,
}

impl Bank {
    /// Decodes a bank from its raw field bytes using the schema layout.
    ///
    /// Each field is read at its declared offset with its exact declared
    /// width, little-endian, in declaration order.
    pub(crate) fn decode(schema: &BankSchema, data: &[u8]) -> Result<Self, EventError> {
        if data.len() < schema.byte_len() {
            return Err(EventError::ShortBank {
                bank: schema.name().to_string(),
                expected: schema.byte_len(),
                found: data.len(),
            });
        }

        let mut fields = Vec::with_capacity(schema.fields().len());
        for descriptor in schema.fields() {
            let bytes = &data[descriptor.offset..descriptor.offset + descriptor.ty.width()];
            let value = match descriptor.ty {
                FieldType::Byte => Value::Byte(bytes[0] as i8),
                FieldType::Short => Value::Short(LittleEndian::read_i16(bytes)),
                FieldType::Int => Value::Int(LittleEndian::read_i32(bytes)),
                FieldType::Long => Value::Long(LittleEndian::read_i64(bytes)),
                FieldType::Float => Value::Float(LittleEndian::read_f32(bytes)),
                FieldType::Double => Value::Double(LittleEndian::read_f64(bytes)),
            };
            fields.push((descriptor.name.clone(), value));
        }

        Ok(Self {
            name: schema.name().to_string(),
            fields,
        })
    }

    /// Returns the bank name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field values in declaration order.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Returns the value of the named field.
    pub fn get(&self, field: &str) -> Result<Value, EventError> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| *value)
            .ok_or_else(|| EventError::UnknownField {
                bank: self.name.clone(),
                field: field.to_string(),
            })
    }

    /// Reads an `i8` field, failing if the declared type differs.
    pub fn get_byte(&self, field: &str) -> Result<i8, EventError> {
        match self.get(field)? {
            Value::Byte(v) => Ok(v),
            other => Err(self.mismatch(field, FieldType::Byte, other)),
        }
    }

    /// Reads an `i16` field, failing if the declared type differs.
    pub fn get_short(&self, field: &str) -> Result<i16, EventError> {
        match self.get(field)? {
            Value::Short(v) => Ok(v),
            other => Err(self.mismatch(field, FieldType::Short, other)),
        }
    }

    /// Reads an `i32` field, failing if the declared type differs.
    pub fn get_int(&self, field: &str) -> Result<i32, EventError> {
        match self.get(field)? {
            Value::Int(v) => Ok(v),
            other => Err(self.mismatch(field, FieldType::Int, other)),
        }
    }

    /// Reads an `i64` field, failing if the declared type differs.
    pub fn get_long(&self, field: &str) -> Result<i64, EventError> {
        match self.get(field)? {
            Value::Long(v) => Ok(v),
            other => Err(self.mismatch(field, FieldType::Long, other)),
        }
    }

    /// Reads an `f32` field, failing if the declared type differs.
    pub fn get_float(&self, field: &str) -> Result<f32, EventError> {
        match self.get(field)? {
            Value::Float(v) => Ok(v),
            other => Err(self.mismatch(field, FieldType::Float, other)),
        }
    }

    /// Reads an `f64` field, failing if the declared type differs.
    pub fn get_double(&self, field: &str) -> Result<f64, EventError> {
        match self.get(field)? {
            Value::Double(v) => Ok(v),
            other => Err(self.mismatch(field, FieldType::Double, other)),
        }
    }

    fn mismatch(&self, field: &str, requested: FieldType, found: Value) -> EventError {
        EventError::TypeMismatch {
            bank: self.name.clone(),
            field: field.to_string(),
            requested,
            declared: found.field_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn scaler_schema() -> BankSchema {
        BankSchema::parse("RUN::scaler {fcup/F,fcupgated/F,livetime/F,clock/L}").unwrap()
    }

    fn scaler_bytes(fcup: f32, fcupgated: f32, livetime: f32, clock: i64) -> Vec<u8> {
        let mut data = Vec::new();
        data.write_f32::<LittleEndian>(fcup).unwrap();
        data.write_f32::<LittleEndian>(fcupgated).unwrap();
        data.write_f32::<LittleEndian>(livetime).unwrap();
        data.write_i64::<LittleEndian>(clock).unwrap();
        data
    }

    #[test]
    fn test_decode_scaler_fields() {
        let schema = scaler_schema();
        let bank = Bank::decode(&schema, &scaler_bytes(3.25, 40.0, 0.97, 123_456)).unwrap();

        assert_eq!(bank.name(), "RUN::scaler");
        assert_eq!(bank.get_float("fcup").unwrap(), 3.25);
        assert_eq!(bank.get_float("fcupgated").unwrap(), 40.0);
        assert_eq!(bank.get_float("livetime").unwrap(), 0.97);
        assert_eq!(bank.get_long("clock").unwrap(), 123_456);
    }

    #[test]
    fn test_decode_mixed_width_bank() {
        let schema = BankSchema::parse("DET::hit {sector/B,layer/S,adc/I,time/D}").unwrap();
        let mut data = Vec::new();
        data.write_i8(-3).unwrap();
        data.write_i16::<LittleEndian>(512).unwrap();
        data.write_i32::<LittleEndian>(-100_000).unwrap();
        data.write_f64::<LittleEndian>(57.125).unwrap();

        let bank = Bank::decode(&schema, &data).unwrap();
        assert_eq!(bank.get_byte("sector").unwrap(), -3);
        assert_eq!(bank.get_short("layer").unwrap(), 512);
        assert_eq!(bank.get_int("adc").unwrap(), -100_000);
        assert_eq!(bank.get_double("time").unwrap(), 57.125);
    }

    #[test]
    fn test_unknown_field() {
        let bank = Bank::decode(&scaler_schema(), &scaler_bytes(0.0, 0.0, 0.0, 0)).unwrap();
        let err = bank.get("beam_current").unwrap_err();
        assert!(matches!(err, EventError::UnknownField { field, .. } if field == "beam_current"));
    }

    #[test]
    fn test_type_mismatch_is_not_coerced() {
        let bank = Bank::decode(&scaler_schema(), &scaler_bytes(1.0, 2.0, 3.0, 4)).unwrap();

        // fcupgated is declared F; asking for a long must fail, not
        // reinterpret the bits.
        let err = bank.get_long("fcupgated").unwrap_err();
        assert!(matches!(
            err,
            EventError::TypeMismatch {
                requested: FieldType::Long,
                declared: FieldType::Float,
                ..
            }
        ));

        // clock is declared L; asking for a float must fail too.
        let err = bank.get_float("clock").unwrap_err();
        assert!(matches!(
            err,
            EventError::TypeMismatch {
                requested: FieldType::Float,
                declared: FieldType::Long,
                ..
            }
        ));
    }

    #[test]
    fn test_short_data_is_an_error() {
        let err = Bank::decode(&scaler_schema(), &[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            EventError::ShortBank {
                expected: 20,
                found: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_value_lookup_by_name() {
        let bank = Bank::decode(&scaler_schema(), &scaler_bytes(1.5, 2.5, 3.5, 7)).unwrap();
        assert_eq!(bank.get("fcup").unwrap(), Value::Float(1.5));
        assert_eq!(bank.get("clock").unwrap(), Value::Long(7));
        assert_eq!(bank.fields().len(), 4);
    }
}
