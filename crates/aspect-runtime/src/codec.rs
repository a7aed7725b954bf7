//! The typed value codec
//!
//! Every value crossing the guest boundary is encoded as a fixed six-byte
//! header followed by a variable-length body:
//!
//! ```text
//! [0..2)        kind    int16, little-endian
//! [2..6)        length  int32, little-endian byte count of the body
//! [6..6+length) body
//! ```
//!
//! Numeric kinds use fixed-width little-endian bodies, `Bool` is a single byte
//! (0 or 1), `String` is UTF-8 and `ByteArray` is carried verbatim.  Guest
//! toolchains embed this exact layout, so it must stay bit-exact.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use crate::error::DecodeError;
use byteorder::{ByteOrder, LittleEndian};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::{any::Any, fmt};
use strum_macros::{EnumString, IntoStaticStr};

////////////////////////////////////////////////////////////////////////////////
// Type kinds.
////////////////////////////////////////////////////////////////////////////////

/// Length of the value header in bytes: a 2-byte kind and a 4-byte length.
pub const HEADER_LEN: usize = 6;

/// The closed set of kinds a value can take on the wire.  The discriminants
/// are the tags written into the header.
#[derive(
    IntoStaticStr,
    EnumString,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    FromPrimitive,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[repr(i16)]
pub enum TypeKind {
    /// Not a valid kind.  Returned by kind inference for unsupported types.
    Empty = 0,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Bool,
    String,
    ByteArray,
}

impl TypeKind {
    /// Decodes a header tag.  `Empty` is never a valid tag on the wire.
    pub fn from_tag(tag: i16) -> Result<Self, DecodeError> {
        match TypeKind::from_i16(tag) {
            Some(TypeKind::Empty) | None => Err(DecodeError::UnknownKind(tag)),
            Some(kind) => Ok(kind),
        }
    }

    #[inline]
    pub fn tag(self) -> i16 {
        self as i16
    }

    /// Body width for fixed-width kinds, `None` for variable-length ones.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            TypeKind::Int8 | TypeKind::Uint8 | TypeKind::Bool => Some(1),
            TypeKind::Int16 | TypeKind::Uint16 => Some(2),
            TypeKind::Int32 | TypeKind::Uint32 => Some(4),
            TypeKind::Int64 | TypeKind::Uint64 => Some(8),
            TypeKind::Empty | TypeKind::String | TypeKind::ByteArray => None,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(<&'static str>::from(*self))
    }
}

////////////////////////////////////////////////////////////////////////////////
// The header.
////////////////////////////////////////////////////////////////////////////////

/// A decoded value header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub kind: TypeKind,
    /// Byte count of the body following the header.
    pub length: i32,
}

impl Header {
    /// Decodes the first `HEADER_LEN` bytes of `bytes`.  Fails on a short
    /// buffer, an unknown tag or a negative length.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::TruncatedHeader {
                expected: HEADER_LEN,
                found: bytes.len(),
            });
        }
        let kind = TypeKind::from_tag(LittleEndian::read_i16(&bytes[0..2]))?;
        let length = LittleEndian::read_i32(&bytes[2..HEADER_LEN]);
        if length < 0 {
            return Err(DecodeError::NegativeLength(length));
        }
        Ok(Self { kind, length })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        LittleEndian::write_i16(&mut out[0..2], self.kind.tag());
        LittleEndian::write_i32(&mut out[2..HEADER_LEN], self.length);
        out
    }

    /// Size of the whole wire value, header included.
    #[inline]
    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.length as usize
    }
}

////////////////////////////////////////////////////////////////////////////////
// Values.
////////////////////////////////////////////////////////////////////////////////

/// A value of one of the supported kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Bool(bool),
    String(String),
    ByteArray(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> TypeKind {
        match self {
            Value::Int8(_) => TypeKind::Int8,
            Value::Int16(_) => TypeKind::Int16,
            Value::Int32(_) => TypeKind::Int32,
            Value::Int64(_) => TypeKind::Int64,
            Value::Uint8(_) => TypeKind::Uint8,
            Value::Uint16(_) => TypeKind::Uint16,
            Value::Uint32(_) => TypeKind::Uint32,
            Value::Uint64(_) => TypeKind::Uint64,
            Value::Bool(_) => TypeKind::Bool,
            Value::String(_) => TypeKind::String,
            Value::ByteArray(_) => TypeKind::ByteArray,
        }
    }

    /// Length of the encoded body.
    pub fn body_len(&self) -> usize {
        match self {
            Value::String(s) => s.len(),
            Value::ByteArray(b) => b.len(),
            other => other.kind().fixed_width().unwrap_or(0),
        }
    }

    /// Encodes the value, header included.
    ///
    /// Panics if the body is longer than `i32::MAX` bytes, which no guest
    /// memory can hold.
    pub fn encode(&self) -> Vec<u8> {
        let body_len = self.body_len();
        let length = i32::try_from(body_len)
            .unwrap_or_else(|_| panic!("value body of {} bytes cannot be encoded", body_len));
        let mut out = vec![0u8; HEADER_LEN + body_len];
        out[..HEADER_LEN].copy_from_slice(
            &Header {
                kind: self.kind(),
                length,
            }
            .encode(),
        );

        let body = &mut out[HEADER_LEN..];
        match self {
            Value::Int8(v) => body[0] = *v as u8,
            Value::Int16(v) => LittleEndian::write_i16(body, *v),
            Value::Int32(v) => LittleEndian::write_i32(body, *v),
            Value::Int64(v) => LittleEndian::write_i64(body, *v),
            Value::Uint8(v) => body[0] = *v,
            Value::Uint16(v) => LittleEndian::write_u16(body, *v),
            Value::Uint32(v) => LittleEndian::write_u32(body, *v),
            Value::Uint64(v) => LittleEndian::write_u64(body, *v),
            Value::Bool(v) => body[0] = u8::from(*v),
            Value::String(s) => body.copy_from_slice(s.as_bytes()),
            Value::ByteArray(b) => body.copy_from_slice(b),
        }
        out
    }

    /// Decodes a wire value.  Only `header.length` bytes past the header are
    /// read; anything after them is ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let header = Header::decode(bytes)?;
        if bytes.len() < header.total_len() {
            return Err(DecodeError::TruncatedBody {
                expected: header.length as usize,
                found: bytes.len() - HEADER_LEN,
            });
        }
        Self::decode_body(header.kind, &bytes[HEADER_LEN..header.total_len()])
    }

    /// Decodes a body of the given kind.  `body` must be the exact body span.
    pub fn decode_body(kind: TypeKind, body: &[u8]) -> Result<Self, DecodeError> {
        if let Some(width) = kind.fixed_width() {
            if body.len() != width {
                return Err(DecodeError::WidthMismatch {
                    kind: kind.to_string(),
                    expected: width,
                    found: body.len(),
                });
            }
        }

        let value = match kind {
            TypeKind::Int8 => Value::Int8(body[0] as i8),
            TypeKind::Int16 => Value::Int16(LittleEndian::read_i16(body)),
            TypeKind::Int32 => Value::Int32(LittleEndian::read_i32(body)),
            TypeKind::Int64 => Value::Int64(LittleEndian::read_i64(body)),
            TypeKind::Uint8 => Value::Uint8(body[0]),
            TypeKind::Uint16 => Value::Uint16(LittleEndian::read_u16(body)),
            TypeKind::Uint32 => Value::Uint32(LittleEndian::read_u32(body)),
            TypeKind::Uint64 => Value::Uint64(LittleEndian::read_u64(body)),
            TypeKind::Bool => match body[0] {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => return Err(DecodeError::InvalidBool(other)),
            },
            TypeKind::String => Value::String(
                String::from_utf8(body.to_vec()).map_err(|_| DecodeError::InvalidUtf8)?,
            ),
            TypeKind::ByteArray => Value::ByteArray(body.to_vec()),
            TypeKind::Empty => return Err(DecodeError::UnknownKind(kind.tag())),
        };
        Ok(value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::ByteArray(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Uint8(v) => write!(f, "{}", v),
            Value::Uint16(v) => write!(f, "{}", v),
            Value::Uint32(v) => write!(f, "{}", v),
            Value::Uint64(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::ByteArray(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::ByteArray(b.to_vec())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Native representations.
////////////////////////////////////////////////////////////////////////////////

/// A native Rust type with a canonical wire kind.  Host function parameters
/// and results must implement this.
pub trait Marshal: Sized + Send + 'static {
    const KIND: TypeKind;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, DecodeError>;
}

macro_rules! impl_marshal {
    ($($native:ty => $variant:ident),* $(,)?) => {
        $(
            impl Marshal for $native {
                const KIND: TypeKind = TypeKind::$variant;

                #[inline]
                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: Value) -> Result<Self, DecodeError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(DecodeError::KindMismatch {
                            expected: TypeKind::$variant.to_string(),
                            found: other.kind().to_string(),
                        }),
                    }
                }
            }

            impl From<$native> for Value {
                #[inline]
                fn from(v: $native) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_marshal! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    bool => Bool,
    String => String,
    Vec<u8> => ByteArray,
}

////////////////////////////////////////////////////////////////////////////////
// Kind-checked marshaling.
////////////////////////////////////////////////////////////////////////////////

/// Encodes `value` as `kind`.
///
/// Panics if the value is not of that kind: a mismatch is a host wiring bug,
/// never something a guest can cause.
pub fn marshal(kind: TypeKind, value: &Value) -> Vec<u8> {
    assert_eq!(
        kind,
        value.kind(),
        "cannot marshal a {} value as {}",
        value.kind(),
        kind
    );
    value.encode()
}

/// Decodes `bytes` as a value of `kind`.
pub fn unmarshal(kind: TypeKind, bytes: &[u8]) -> Result<Value, DecodeError> {
    let header = Header::decode(bytes)?;
    if header.kind != kind {
        return Err(DecodeError::KindMismatch {
            expected: kind.to_string(),
            found: header.kind.to_string(),
        });
    }
    Value::decode(bytes)
}

/// Infers the wire kind of a native value.  Unsupported types map to
/// `TypeKind::Empty`, which callers must check for.
pub fn infer_kind(value: &dyn Any) -> TypeKind {
    macro_rules! match_native {
        ($($native:ty => $kind:ident),*) => {
            $(
                if value.is::<$native>() {
                    return TypeKind::$kind;
                }
            )*
        };
    }

    match_native! {
        i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64,
        u8 => Uint8, u16 => Uint16, u32 => Uint32, u64 => Uint64,
        bool => Bool, String => String, &'static str => String,
        Vec<u8> => ByteArray, &'static [u8] => ByteArray
    }

    match value.downcast_ref::<Value>() {
        Some(v) => v.kind(),
        None => TypeKind::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) {
        let bytes = marshal(value.kind(), &value);
        assert_eq!(unmarshal(value.kind(), &bytes).unwrap(), value);
    }

    #[test]
    fn integer_boundaries_round_trip() {
        for v in [
            Value::Int8(i8::MIN),
            Value::Int8(i8::MAX),
            Value::Int16(i16::MIN),
            Value::Int16(i16::MAX),
            Value::Int32(i32::MIN),
            Value::Int32(i32::MAX),
            Value::Int64(i64::MIN),
            Value::Int64(i64::MAX),
            Value::Uint8(u8::MAX),
            Value::Uint16(u16::MAX),
            Value::Uint32(u32::MAX),
            Value::Uint64(u64::MAX),
            Value::Uint64(0),
            Value::Bool(true),
            Value::Bool(false),
        ] {
            round_trip(v);
        }
    }

    #[test]
    fn variable_length_round_trip() {
        round_trip(Value::String(String::new()));
        round_trip(Value::String("héllo wörld".to_string()));
        round_trip(Value::String("x".repeat(1 << 16)));
        round_trip(Value::ByteArray(Vec::new()));
        round_trip(Value::ByteArray(vec![0xff; 300]));
    }

    #[test]
    fn header_layout_is_little_endian() {
        let bytes = Value::Int32(0x0102_0304).encode();
        assert_eq!(bytes, vec![3, 0, 4, 0, 0, 0, 0x04, 0x03, 0x02, 0x01]);

        let bytes = Value::String("abc".to_string()).encode();
        assert_eq!(&bytes[..HEADER_LEN], &[10, 0, 3, 0, 0, 0]);
        assert_eq!(&bytes[HEADER_LEN..], b"abc");
    }

    #[test]
    fn length_matches_body() {
        for v in [
            Value::Int64(7),
            Value::Uint16(9),
            Value::String("four".to_string()),
            Value::ByteArray(vec![1, 2, 3]),
        ] {
            let bytes = v.encode();
            let header = Header::decode(&bytes).unwrap();
            assert_eq!(header.length as usize, bytes.len() - HEADER_LEN);
            assert_eq!(header.length as usize, v.body_len());
        }
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut bytes = Value::String("ab".to_string()).encode();
        bytes.extend_from_slice(b"garbage");
        assert_eq!(
            Value::decode(&bytes).unwrap(),
            Value::String("ab".to_string())
        );
    }

    #[test]
    fn reencoding_valid_bytes_is_exact() {
        let valid = vec![9, 0, 1, 0, 0, 0, 1];
        assert_eq!(Value::decode(&valid).unwrap().encode(), valid);
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert_eq!(
            Header::decode(&[10, 0, 3]),
            Err(DecodeError::TruncatedHeader {
                expected: HEADER_LEN,
                found: 3
            })
        );
        let bytes = Value::String("abcdef".to_string()).encode();
        assert_eq!(
            Value::decode(&bytes[..8]),
            Err(DecodeError::TruncatedBody {
                expected: 6,
                found: 2
            })
        );
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert_eq!(
            Value::decode(&[0, 0, 0, 0, 0, 0]),
            Err(DecodeError::UnknownKind(0))
        );
        assert_eq!(
            Value::decode(&[42, 0, 0, 0, 0, 0]),
            Err(DecodeError::UnknownKind(42))
        );
        assert_eq!(
            Value::decode(&[10, 0, 0xff, 0xff, 0xff, 0xff]),
            Err(DecodeError::NegativeLength(-1))
        );
        assert!(matches!(
            Value::decode(&[3, 0, 2, 0, 0, 0, 1, 2]),
            Err(DecodeError::WidthMismatch { expected: 4, found: 2, .. })
        ));
        assert_eq!(
            Value::decode(&[9, 0, 1, 0, 0, 0, 2]),
            Err(DecodeError::InvalidBool(2))
        );
        assert_eq!(
            Value::decode(&[10, 0, 2, 0, 0, 0, 0xc3, 0x28]),
            Err(DecodeError::InvalidUtf8)
        );
    }

    #[test]
    fn unmarshal_checks_kind() {
        let bytes = Value::Uint32(5).encode();
        assert!(matches!(
            unmarshal(TypeKind::Int32, &bytes),
            Err(DecodeError::KindMismatch { .. })
        ));
    }

    #[test]
    #[should_panic]
    fn marshal_with_wrong_kind_panics() {
        marshal(TypeKind::String, &Value::Int8(1));
    }

    #[test]
    fn kind_inference() {
        assert_eq!(infer_kind(&5u16), TypeKind::Uint16);
        assert_eq!(infer_kind(&-5i64), TypeKind::Int64);
        assert_eq!(infer_kind(&"str"), TypeKind::String);
        assert_eq!(infer_kind(&String::from("s")), TypeKind::String);
        assert_eq!(infer_kind(&vec![1u8]), TypeKind::ByteArray);
        assert_eq!(infer_kind(&Value::Bool(true)), TypeKind::Bool);
        assert_eq!(infer_kind(&1.5f64), TypeKind::Empty);
        assert_eq!(infer_kind(&vec![1u32]), TypeKind::Empty);
    }

    #[test]
    fn kinds_parse_from_lowercase_names() {
        assert_eq!("bytearray".parse::<TypeKind>().unwrap(), TypeKind::ByteArray);
        assert_eq!(TypeKind::Uint64.to_string(), "uint64");
        assert_eq!(TypeKind::from_tag(11).unwrap(), TypeKind::ByteArray);
    }

    #[test]
    fn natives_convert_through_values() {
        assert_eq!(u32::from_value(7u32.into_value()).unwrap(), 7);
        assert!(matches!(
            String::from_value(Value::Int8(1)),
            Err(DecodeError::KindMismatch { .. })
        ));
    }
}
