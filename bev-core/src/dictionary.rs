//! Bank schema dictionary.
//!
//! A BEV file declares the layout of every bank it may carry in its text
//! header, one `% schema` line per bank. The dictionary is built once when a
//! file is opened and is immutable afterward, so sharing it by reference is
//! always safe.

use crate::types::FieldType;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while building or querying a [`Dictionary`].
#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("bank not found in dictionary: {name}")]
    BankNotFound { name: String },

    #[error("duplicate bank declaration: {name}")]
    DuplicateBank { name: String },

    #[error("unknown field type code '{code}' in bank {bank}")]
    UnknownTypeCode { bank: String, code: char },

    #[error("malformed schema declaration: {0}")]
    MalformedSchema(String),
}

/// One typed field within a bank layout.
///
/// The byte offset is resolved once, at schema parse time, from the widths of
/// the fields declared before it. Field order is stable and determines the
/// decode layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name, unique within its bank
    pub name: String,
    /// Declared numeric type
    pub ty: FieldType,
    /// Byte offset from the start of the bank's field data
    pub offset: usize,
}

/// Resolved layout of one bank: named, typed fields at fixed byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankSchema {
    name: String,
    fields: Vec<FieldDescriptor>,
    byte_len: usize,
}

impl BankSchema {
    /// Parses a schema declaration of the form
    /// `RUN::scaler {fcup/F,fcupgated/F,livetime/F,clock/L}`.
    ///
    /// This is the payload of a `% schema` header line, after the prefix has
    /// been stripped by the reader.
    pub fn parse(decl: &str) -> Result<Self, DictionaryError> {
        let decl = decl.trim();
        let open = decl
            .find('{')
            .ok_or_else(|| DictionaryError::MalformedSchema(decl.to_string()))?;
        if !decl.ends_with('}') {
            return Err(DictionaryError::MalformedSchema(decl.to_string()));
        }

        let name = decl[..open].trim();
        if name.is_empty() {
            return Err(DictionaryError::MalformedSchema(decl.to_string()));
        }

        let body = &decl[open + 1..decl.len() - 1];
        let mut fields = Vec::new();
        let mut offset = 0usize;

        for item in body.split(',') {
            let item = item.trim();
            let (field_name, code) = item
                .split_once('/')
                .ok_or_else(|| DictionaryError::MalformedSchema(decl.to_string()))?;
            if field_name.is_empty() || code.len() != 1 {
                return Err(DictionaryError::MalformedSchema(decl.to_string()));
            }

            let code_char = code.as_bytes()[0];
            let ty = FieldType::from_code(code_char).ok_or(DictionaryError::UnknownTypeCode {
                bank: name.to_string(),
                code: code_char as char,
            })?;

            if fields.iter().any(|f: &FieldDescriptor| f.name == field_name) {
                return Err(DictionaryError::MalformedSchema(format!(
                    "duplicate field {} in bank {}",
                    field_name, name
                )));
            }

            fields.push(FieldDescriptor {
                name: field_name.to_string(),
                ty,
                offset,
            });
            offset += ty.width();
        }

        if fields.is_empty() {
            return Err(DictionaryError::MalformedSchema(decl.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            fields,
            byte_len: offset,
        })
    }

    /// Returns the bank name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field descriptors in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the total encoded length of the bank's field data in bytes.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }
}

/// Mapping from bank name to its resolved [`BankSchema`].
///
/// Built once per file from the header's `% schema` lines; read-only for the
/// lifetime of the file.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    banks: HashMap<String, BankSchema>,
}

impl Dictionary {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parsed schema, rejecting duplicate bank names.
    pub fn insert(&mut self, schema: BankSchema) -> Result<(), DictionaryError> {
        if self.banks.contains_key(schema.name()) {
            return Err(DictionaryError::DuplicateBank {
                name: schema.name().to_string(),
            });
        }
        self.banks.insert(schema.name().to_string(), schema);
        Ok(())
    }

    /// Returns the schema for `name`, or [`DictionaryError::BankNotFound`].
    pub fn get(&self, name: &str) -> Result<&BankSchema, DictionaryError> {
        self.banks
            .get(name)
            .ok_or_else(|| DictionaryError::BankNotFound {
                name: name.to_string(),
            })
    }

    /// Returns the schema for `name` if it is declared.
    pub fn schema(&self, name: &str) -> Option<&BankSchema> {
        self.banks.get(name)
    }

    /// Returns true if `name` is declared.
    pub fn has(&self, name: &str) -> bool {
        self.banks.contains_key(name)
    }

    /// Number of declared banks.
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    /// Returns true if no banks are declared.
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    /// Iterates over the declared schemas in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &BankSchema> {
        self.banks.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schema_offsets() {
        let schema = BankSchema::parse("RUN::scaler {fcup/F,fcupgated/F,livetime/F,clock/L}")
            .expect("valid schema");

        assert_eq!(schema.name(), "RUN::scaler");
        assert_eq!(schema.fields().len(), 4);
        assert_eq!(schema.byte_len(), 4 + 4 + 4 + 8);

        let fcupgated = schema.field("fcupgated").unwrap();
        assert_eq!(fcupgated.ty, FieldType::Float);
        assert_eq!(fcupgated.offset, 4);

        let clock = schema.field("clock").unwrap();
        assert_eq!(clock.ty, FieldType::Long);
        assert_eq!(clock.offset, 12);
    }

    #[test]
    fn test_parse_schema_mixed_widths() {
        let schema = BankSchema::parse("DET::hit {sector/B,layer/S,adc/I,time/D}").unwrap();
        let offsets: Vec<usize> = schema.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 1, 3, 7]);
        assert_eq!(schema.byte_len(), 15);
    }

    #[test]
    fn test_parse_schema_rejects_unknown_code() {
        let err = BankSchema::parse("RUN::scaler {fcup/Q}").unwrap_err();
        assert!(matches!(
            err,
            DictionaryError::UnknownTypeCode { code: 'Q', .. }
        ));
    }

    #[test]
    fn test_parse_schema_rejects_malformed() {
        assert!(BankSchema::parse("RUN::scaler").is_err());
        assert!(BankSchema::parse("RUN::scaler {}").is_err());
        assert!(BankSchema::parse("{fcup/F}").is_err());
        assert!(BankSchema::parse("RUN::scaler {fcup}").is_err());
        assert!(BankSchema::parse("RUN::scaler {fcup/F,fcup/F}").is_err());
    }

    #[test]
    fn test_dictionary_lookup() {
        let mut dict = Dictionary::new();
        dict.insert(BankSchema::parse("RUN::scaler {fcupgated/F}").unwrap())
            .unwrap();

        assert!(dict.has("RUN::scaler"));
        assert_eq!(dict.len(), 1);
        assert!(dict.get("RUN::scaler").is_ok());

        let err = dict.get("RUN::config").unwrap_err();
        assert!(matches!(err, DictionaryError::BankNotFound { name } if name == "RUN::config"));
    }

    #[test]
    fn test_dictionary_rejects_duplicates() {
        let mut dict = Dictionary::new();
        dict.insert(BankSchema::parse("RUN::scaler {fcup/F}").unwrap())
            .unwrap();
        let err = dict
            .insert(BankSchema::parse("RUN::scaler {clock/L}").unwrap())
            .unwrap_err();
        assert!(matches!(err, DictionaryError::DuplicateBank { .. }));
    }
}
