use std::fmt::Display;
use std::io;

use thiserror::Error;

use crate::params::CvRole;

/// The kind of data held by a binary data array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArrayType {
    #[default]
    Unknown,
    MZArray,
    IntensityArray,
}

impl ArrayType {
    pub fn from_role(role: CvRole) -> Option<Self> {
        match role {
            CvRole::MzArray => Some(Self::MZArray),
            CvRole::IntensityArray => Some(Self::IntensityArray),
            _ => None,
        }
    }

    pub const fn role(&self) -> Option<CvRole> {
        match self {
            Self::MZArray => Some(CvRole::MzArray),
            Self::IntensityArray => Some(CvRole::IntensityArray),
            Self::Unknown => None,
        }
    }
}

impl Display for ArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The floating point widths a binary data array may be stored with
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq, Default)]
pub enum BinaryDataArrayType {
    /// Arrays with no width marker are read as single precision
    #[default]
    Float32,
    Float64,
}

impl Display for BinaryDataArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl BinaryDataArrayType {
    /// Get the size in bytes of a single value of this type
    pub const fn size_of(&self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    pub const fn role(&self) -> CvRole {
        match self {
            Self::Float32 => CvRole::Float32,
            Self::Float64 => CvRole::Float64,
        }
    }
}

/// The compression applied to a binary data array's bytes before base64 encoding
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq, Default)]
pub enum BinaryCompressionType {
    #[default]
    NoCompression,
    Zlib,
}

impl BinaryCompressionType {
    pub const fn role(&self) -> CvRole {
        match self {
            Self::NoCompression => CvRole::NoCompression,
            Self::Zlib => CvRole::ZlibCompression,
        }
    }
}

impl Display for BinaryCompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The failure modes of turning a binary data array's text back into numbers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ArrayRetrievalError {
    #[error("Array type {0:?} not found")]
    NotFound(ArrayType),
    #[error("An error occurred while decoding base64: {0}")]
    Base64Error(String),
    #[error("An error occurred while decompressing: {0}")]
    DecompressionError(String),
    #[error("The requested data type does not match the number of bytes available in the buffer")]
    DataTypeSizeMismatch,
}

impl From<base64_simd::Error> for ArrayRetrievalError {
    fn from(value: base64_simd::Error) -> Self {
        Self::Base64Error(value.to_string())
    }
}

impl From<bytemuck::PodCastError> for ArrayRetrievalError {
    fn from(_value: bytemuck::PodCastError) -> Self {
        Self::DataTypeSizeMismatch
    }
}

impl From<ArrayRetrievalError> for io::Error {
    fn from(value: ArrayRetrievalError) -> Self {
        match value {
            ArrayRetrievalError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, value),
            ArrayRetrievalError::DecompressionError(e) | ArrayRetrievalError::Base64Error(e) => {
                io::Error::new(io::ErrorKind::InvalidData, e)
            }
            ArrayRetrievalError::DataTypeSizeMismatch => {
                io::Error::new(io::ErrorKind::InvalidData, value)
            }
        }
    }
}
