//! Signature blob parsing.
//!
//! Field, method, property and stand-alone signatures are stored in the
//! `#Blob` heap as element-type byte streams with ECMA-335 compressed
//! integers. This module decodes them into structural [`TypeSig`] values;
//! token references (`VALUETYPE`/`CLASS`/modifiers) stay unresolved here
//! and are attached to real classes by the loader.

use crate::metadata::token::Token;
use crate::Result;

/// Raw element-type bytes as they appear in signature blobs.
#[allow(non_snake_case, dead_code, missing_docs)]
pub mod ELEMENT_TYPE {
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDef or TypeRef token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDef or TypeRef token
    pub const CLASS: u8 = 0x12;
    // type rank boundsCount bound1 ... loCount lo1 ...
    pub const ARRAY: u8 = 0x14;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    // System.Object
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Required modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_REQD: u8 = 0x1f;
    // Optional modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_OPT: u8 = 0x20;
    // Sentinel for vararg method signature
    pub const SENTINEL: u8 = 0x41;
    // Denotes a local variable that points at a pinned object
    pub const PINNED: u8 = 0x45;
}

/// Calling-convention bits of a signature's first byte.
#[allow(non_snake_case, missing_docs)]
pub mod CALL_CONV {
    pub const DEFAULT: u8 = 0x00;
    pub const VARARG: u8 = 0x05;
    pub const FIELD: u8 = 0x06;
    pub const LOCALS: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const MASK: u8 = 0x0F;
    pub const HASTHIS: u8 = 0x20;
    pub const EXPLICITTHIS: u8 = 0x40;
}

/// A structural type extracted from a signature blob.
///
/// `ValueType` and `Class` carry the raw `TypeDefOrRef` token; the loader
/// turns them into class links.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeSig {
    /// No value (return types only)
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Char`
    Char,
    /// `System.SByte`
    I1,
    /// `System.Byte`
    U1,
    /// `System.Int16`
    I2,
    /// `System.UInt16`
    U2,
    /// `System.Int32`
    I4,
    /// `System.UInt32`
    U4,
    /// `System.Int64`
    I8,
    /// `System.UInt64`
    U8,
    /// `System.Single`
    R4,
    /// `System.Double`
    R8,
    /// `System.IntPtr`
    I,
    /// `System.UIntPtr`
    U,
    /// `System.String`
    String,
    /// `System.Object`
    Object,
    /// `System.TypedReference`
    TypedByRef,
    /// Unmanaged pointer
    Ptr(Box<TypeSig>),
    /// Managed by-reference
    ByRef(Box<TypeSig>),
    /// Value type referenced by token
    ValueType(Token),
    /// Class type referenced by token
    Class(Token),
    /// Single-dimensional zero-based array
    SzArray(Box<TypeSig>),
    /// General array with explicit rank, sizes and lower bounds
    Array {
        /// Element type
        elem: Box<TypeSig>,
        /// Number of dimensions
        rank: u32,
        /// Declared sizes (may be shorter than `rank`)
        sizes: Vec<u32>,
        /// Declared lower bounds (may be shorter than `rank`)
        lo_bounds: Vec<i32>,
    },
    /// Function-pointer type carrying a full method signature
    FnPtr(Box<MethodSig>),
    /// Pinned local
    Pinned(Box<TypeSig>),
    /// Custom modifier wrapper
    Modified {
        /// `CMOD_REQD` vs `CMOD_OPT`
        required: bool,
        /// The modifier type token
        modifier: Token,
        /// The modified type
        inner: Box<TypeSig>,
    },
}

/// A decoded method signature.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodSig {
    /// Instance method (`this` passed implicitly)
    pub has_this: bool,
    /// `this` appears explicitly as the first parameter
    pub explicit_this: bool,
    /// Low calling-convention nibble (`DEFAULT` or `VARARG`)
    pub call_conv: u8,
    /// Return type
    pub return_type: TypeSig,
    /// Declared parameter types, in order
    pub params: Vec<TypeSig>,
}

/// A decoded field signature.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSig {
    /// The field's type
    pub field_type: TypeSig,
}

/// A decoded property signature.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertySig {
    /// Instance property
    pub has_this: bool,
    /// The property's type
    pub property_type: TypeSig,
    /// Indexer parameter types
    pub params: Vec<TypeSig>,
}

/// Cursor over a signature blob.
pub struct SignatureReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> SignatureReader<'a> {
    /// Wrap a blob for decoding.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureReader { data, offset: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.offset)
            .ok_or(crate::Error::OutOfBounds)?;
        self.offset += 1;
        Ok(byte)
    }

    fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    /// Decode an ECMA-335 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns an error for a truncated or invalid encoding.
    pub fn read_compressed_u32(&mut self) -> Result<u32> {
        let first = self.read_u8()?;
        if first & 0x80 == 0 {
            Ok(u32::from(first))
        } else if first & 0xC0 == 0x80 {
            let second = self.read_u8()?;
            Ok((u32::from(first & 0x3F) << 8) | u32::from(second))
        } else if first & 0xE0 == 0xC0 {
            let b2 = self.read_u8()?;
            let b3 = self.read_u8()?;
            let b4 = self.read_u8()?;
            Ok((u32::from(first & 0x1F) << 24)
                | (u32::from(b2) << 16)
                | (u32::from(b3) << 8)
                | u32::from(b4))
        } else {
            Err(malformed_error!(
                "Invalid compressed integer lead byte 0x{:02x}",
                first
            ))
        }
    }

    /// Decode an ECMA-335 compressed signed integer (rotated encoding).
    ///
    /// # Errors
    /// Returns an error for a truncated or invalid encoding.
    pub fn read_compressed_i32(&mut self) -> Result<i32> {
        let unsigned = self.read_compressed_u32()?;
        let rotated = unsigned >> 1;
        if unsigned & 1 == 0 {
            Ok(rotated as i32)
        } else {
            // The sign bit wraps to the width of the original encoding
            let bits = match unsigned {
                value if value < 0x80 => 6,
                value if value < 0x4000 => 13,
                _ => 28,
            };
            Ok((rotated as i32) - (1 << bits))
        }
    }

    /// Decode a `TypeDefOrRef` coded token as stored inside signatures.
    fn read_type_token(&mut self) -> Result<Token> {
        let coded = self.read_compressed_u32()?;
        let row = coded >> 2;
        let table = match coded & 0x3 {
            0 => 0x02, // TypeDef
            1 => 0x01, // TypeRef
            2 => 0x1B, // TypeSpec
            _ => {
                return Err(malformed_error!(
                    "Invalid TypeDefOrRef encoding {} in signature",
                    coded
                ))
            }
        };
        Ok(Token::from_parts(table, row))
    }

    /// Parse one type from the stream.
    ///
    /// # Errors
    /// Returns an error for unknown element bytes or truncated data.
    pub fn parse_type(&mut self) -> Result<TypeSig> {
        use ELEMENT_TYPE as ET;
        let elem = self.read_u8()?;
        Ok(match elem {
            ET::VOID => TypeSig::Void,
            ET::BOOLEAN => TypeSig::Boolean,
            ET::CHAR => TypeSig::Char,
            ET::I1 => TypeSig::I1,
            ET::U1 => TypeSig::U1,
            ET::I2 => TypeSig::I2,
            ET::U2 => TypeSig::U2,
            ET::I4 => TypeSig::I4,
            ET::U4 => TypeSig::U4,
            ET::I8 => TypeSig::I8,
            ET::U8 => TypeSig::U8,
            ET::R4 => TypeSig::R4,
            ET::R8 => TypeSig::R8,
            ET::I => TypeSig::I,
            ET::U => TypeSig::U,
            ET::STRING => TypeSig::String,
            ET::OBJECT => TypeSig::Object,
            ET::TYPEDBYREF => TypeSig::TypedByRef,
            ET::PTR => TypeSig::Ptr(Box::new(self.parse_type()?)),
            ET::BYREF => TypeSig::ByRef(Box::new(self.parse_type()?)),
            ET::PINNED => TypeSig::Pinned(Box::new(self.parse_type()?)),
            ET::VALUETYPE => TypeSig::ValueType(self.read_type_token()?),
            ET::CLASS => TypeSig::Class(self.read_type_token()?),
            ET::SZARRAY => TypeSig::SzArray(Box::new(self.parse_type()?)),
            ET::FNPTR => TypeSig::FnPtr(Box::new(self.parse_method()?)),
            ET::CMOD_REQD | ET::CMOD_OPT => TypeSig::Modified {
                required: elem == ET::CMOD_REQD,
                modifier: self.read_type_token()?,
                inner: Box::new(self.parse_type()?),
            },
            ET::ARRAY => {
                let inner = self.parse_type()?;
                let rank = self.read_compressed_u32()?;
                if rank == 0 {
                    return Err(malformed_error!("Array signature with rank 0"));
                }
                let num_sizes = self.read_compressed_u32()?;
                if num_sizes > rank {
                    return Err(malformed_error!(
                        "Array signature declares {} sizes for rank {}",
                        num_sizes,
                        rank
                    ));
                }
                let mut sizes = Vec::with_capacity(num_sizes as usize);
                for _ in 0..num_sizes {
                    sizes.push(self.read_compressed_u32()?);
                }
                let num_lo = self.read_compressed_u32()?;
                if num_lo > rank {
                    return Err(malformed_error!(
                        "Array signature declares {} lower bounds for rank {}",
                        num_lo,
                        rank
                    ));
                }
                let mut lo_bounds = Vec::with_capacity(num_lo as usize);
                for _ in 0..num_lo {
                    lo_bounds.push(self.read_compressed_i32()?);
                }
                TypeSig::Array {
                    elem: Box::new(inner),
                    rank,
                    sizes,
                    lo_bounds,
                }
            }
            _ => {
                return Err(malformed_error!(
                    "Unsupported element type 0x{:02x} in signature",
                    elem
                ))
            }
        })
    }

    /// Parse a method signature (starting with its calling-convention byte).
    ///
    /// # Errors
    /// Returns an error for non-method signatures or truncated data.
    pub fn parse_method(&mut self) -> Result<MethodSig> {
        let conv = self.read_u8()?;
        let call_conv = conv & CALL_CONV::MASK;
        if call_conv != CALL_CONV::DEFAULT && call_conv != CALL_CONV::VARARG {
            return Err(malformed_error!(
                "Not a method signature (calling convention 0x{:02x})",
                conv
            ));
        }
        let param_count = self.read_compressed_u32()?;
        let return_type = self.parse_type()?;
        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            if self.peek_u8() == Some(ELEMENT_TYPE::SENTINEL) {
                self.offset += 1;
            }
            params.push(self.parse_type()?);
        }
        Ok(MethodSig {
            has_this: conv & CALL_CONV::HASTHIS != 0,
            explicit_this: conv & CALL_CONV::EXPLICITTHIS != 0,
            call_conv,
            return_type,
            params,
        })
    }

    /// Parse a field signature (prefix byte 0x06).
    ///
    /// # Errors
    /// Returns an error for non-field signatures or truncated data.
    pub fn parse_field(&mut self) -> Result<FieldSig> {
        let conv = self.read_u8()?;
        if conv & CALL_CONV::MASK != CALL_CONV::FIELD {
            return Err(malformed_error!(
                "Not a field signature (calling convention 0x{:02x})",
                conv
            ));
        }
        Ok(FieldSig {
            field_type: self.parse_type()?,
        })
    }

    /// Parse a local-variable signature (prefix byte 0x07).
    ///
    /// # Errors
    /// Returns an error for non-locals signatures or truncated data.
    pub fn parse_locals(&mut self) -> Result<Vec<TypeSig>> {
        let conv = self.read_u8()?;
        if conv & CALL_CONV::MASK != CALL_CONV::LOCALS {
            return Err(malformed_error!(
                "Not a locals signature (calling convention 0x{:02x})",
                conv
            ));
        }
        let count = self.read_compressed_u32()?;
        let mut locals = Vec::with_capacity(count as usize);
        for _ in 0..count {
            locals.push(self.parse_type()?);
        }
        Ok(locals)
    }

    /// Parse a property signature (prefix byte 0x08).
    ///
    /// # Errors
    /// Returns an error for non-property signatures or truncated data.
    pub fn parse_property(&mut self) -> Result<PropertySig> {
        let conv = self.read_u8()?;
        if conv & CALL_CONV::MASK != CALL_CONV::PROPERTY {
            return Err(malformed_error!(
                "Not a property signature (calling convention 0x{:02x})",
                conv
            ));
        }
        let param_count = self.read_compressed_u32()?;
        let property_type = self.parse_type()?;
        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            params.push(self.parse_type()?);
        }
        Ok(PropertySig {
            has_this: conv & CALL_CONV::HASTHIS != 0,
            property_type,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_u32_forms() {
        assert_eq!(SignatureReader::new(&[0x03]).read_compressed_u32().unwrap(), 3);
        assert_eq!(
            SignatureReader::new(&[0x80, 0x80]).read_compressed_u32().unwrap(),
            0x80
        );
        assert_eq!(
            SignatureReader::new(&[0xC0, 0x00, 0x40, 0x00])
                .read_compressed_u32()
                .unwrap(),
            0x4000
        );
        assert!(SignatureReader::new(&[0xFF]).read_compressed_u32().is_err());
    }

    #[test]
    fn compressed_i32_rotation() {
        // The sign bit is rotated into bit 0 (ECMA-335 II.23.2)
        assert_eq!(SignatureReader::new(&[0x7F]).read_compressed_i32().unwrap(), -1);
        assert_eq!(SignatureReader::new(&[0x06]).read_compressed_i32().unwrap(), 3);
        assert_eq!(SignatureReader::new(&[0x01]).read_compressed_i32().unwrap(), -64);
    }

    #[test]
    fn parse_simple_method() {
        // default, 1 param, returns I4, takes I4
        let blob = [0x00, 0x01, 0x08, 0x08];
        let sig = SignatureReader::new(&blob).parse_method().unwrap();
        assert!(!sig.has_this);
        assert_eq!(sig.return_type, TypeSig::I4);
        assert_eq!(sig.params, vec![TypeSig::I4]);
    }

    #[test]
    fn parse_instance_method_with_class_param() {
        // hasthis, 1 param, returns void, takes class TypeDef row 2
        let blob = [0x20, 0x01, 0x01, 0x12, 0x08];
        let sig = SignatureReader::new(&blob).parse_method().unwrap();
        assert!(sig.has_this);
        assert_eq!(sig.return_type, TypeSig::Void);
        assert_eq!(sig.params, vec![TypeSig::Class(Token::new(0x0200_0002))]);
    }

    #[test]
    fn parse_field_with_valuetype() {
        // field, valuetype TypeRef row 1
        let blob = [0x06, 0x11, 0x05];
        let sig = SignatureReader::new(&blob).parse_field().unwrap();
        assert_eq!(sig.field_type, TypeSig::ValueType(Token::new(0x0100_0001)));
    }

    #[test]
    fn parse_multidim_array() {
        // szarray-of-array: ARRAY I4 rank=2 sizes=[3,4] lo=[0,0]
        let blob = [0x14, 0x08, 0x02, 0x02, 0x03, 0x04, 0x02, 0x00, 0x00];
        let sig = SignatureReader::new(&blob).parse_type().unwrap();
        match sig {
            TypeSig::Array {
                elem,
                rank,
                sizes,
                lo_bounds,
            } => {
                assert_eq!(*elem, TypeSig::I4);
                assert_eq!(rank, 2);
                assert_eq!(sizes, vec![3, 4]);
                assert_eq!(lo_bounds, vec![0, 0]);
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn parse_byref_and_ptr() {
        let blob = [0x10, 0x08];
        assert_eq!(
            SignatureReader::new(&blob).parse_type().unwrap(),
            TypeSig::ByRef(Box::new(TypeSig::I4))
        );
        let blob = [0x0F, 0x01];
        assert_eq!(
            SignatureReader::new(&blob).parse_type().unwrap(),
            TypeSig::Ptr(Box::new(TypeSig::Void))
        );
    }

    #[test]
    fn rank_zero_array_is_malformed() {
        let blob = [0x14, 0x08, 0x00, 0x00, 0x00];
        assert!(SignatureReader::new(&blob).parse_type().is_err());
    }
}
