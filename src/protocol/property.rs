//! cEMI interface object property services.
//!
//! M_PropRead and M_PropWrite address a property of an interface object:
//!
//! ```text
//! msgCode | objectType (2) | objectInstance (1) | propertyId (1) |
//! nElements (4 bits) | startIndex (12 bits) | data...
//! ```
//!
//! A confirmation with `elements == 0` reports an error; its code is the
//! first data byte.

use crate::error::{KnxError, Result};

/// Body of an M_PropRead / M_PropWrite service (everything after the
/// message code and additional info).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyFrame {
    /// Interface object type (e.g. 0x0008, cEMI server object).
    pub object_type: u16,
    /// Object instance, 1-based.
    pub object_instance: u8,
    /// Property identifier.
    pub property_id: u8,
    /// Number of elements (4 bits). Zero in a confirmation signals an error.
    pub elements: u8,
    /// Start index (12 bits).
    pub start_index: u16,
    /// Property data: values in `.con` and write `.req` frames, error code
    /// in failed confirmations, empty in read requests.
    pub data: Vec<u8>,
}

impl PropertyFrame {
    /// Size of the fixed part in bytes.
    pub const FIXED_SIZE: usize = 6;

    /// Describe a property access without data (read request shape).
    pub fn new(object_type: u16, object_instance: u8, property_id: u8, elements: u8, start_index: u16) -> Self {
        Self {
            object_type,
            object_instance,
            property_id,
            elements,
            start_index,
            data: Vec::new(),
        }
    }

    /// Attach property data (write request shape).
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Parse a property frame body.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::FIXED_SIZE {
            return Err(KnxError::BadCemi);
        }
        let object_type = u16::from_be_bytes([data[0], data[1]]);
        let object_instance = data[2];
        let property_id = data[3];
        let elements = data[4] >> 4;
        let start_index = (u16::from(data[4] & 0x0F) << 8) | u16::from(data[5]);
        Ok(Self {
            object_type,
            object_instance,
            property_id,
            elements,
            start_index,
            data: data[Self::FIXED_SIZE..].to_vec(),
        })
    }

    /// Append the encoded body to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.object_type.to_be_bytes());
        out.push(self.object_instance);
        out.push(self.property_id);
        out.push((self.elements << 4) | ((self.start_index >> 8) as u8 & 0x0F));
        out.push(self.start_index as u8);
        out.extend_from_slice(&self.data);
    }

    /// Encoded length of this body.
    pub fn encoded_len(&self) -> usize {
        Self::FIXED_SIZE + self.data.len()
    }

    /// True when `other` confirms this access: same object, instance,
    /// property and start index.
    pub fn matches(&self, other: &PropertyFrame) -> bool {
        self.object_type == other.object_type
            && self.object_instance == other.object_instance
            && self.property_id == other.property_id
            && self.start_index == other.start_index
    }

    /// True for a failed confirmation (zero elements).
    pub fn is_error(&self) -> bool {
        self.elements == 0
    }

    /// Error code of a failed confirmation.
    pub fn error_code(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }
}
