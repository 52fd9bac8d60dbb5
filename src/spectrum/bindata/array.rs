use std::io::prelude::*;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::trace;

use super::encodings::{ArrayRetrievalError, ArrayType, BinaryCompressionType, BinaryDataArrayType};

pub type Bytes = Vec<u8>;

/// The length of the base64 text produced for `byte_length` raw bytes
pub const fn encoded_length(byte_length: usize) -> usize {
    4 * byte_length.div_ceil(3)
}

/**
A single binary data array as it appears in an mzML document: base64 text plus
the description of how to turn that text back into numbers.

Decoding is deferred until [`DataArray::to_f64`] is called, so a parsed document
only pays for the arrays that are actually read.
*/
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataArray {
    /// The base64 encoded text of the array
    pub data: String,
    pub dtype: BinaryDataArrayType,
    pub compression: BinaryCompressionType,
    pub name: ArrayType,
}

impl DataArray {
    pub fn new(
        data: String,
        dtype: BinaryDataArrayType,
        compression: BinaryCompressionType,
        name: ArrayType,
    ) -> Self {
        Self {
            data,
            dtype,
            compression,
            name,
        }
    }

    /// Encode `values` the way the writer emits every array: 64-bit, uncompressed, base64
    pub fn from_f64(name: ArrayType, values: &[f64]) -> Self {
        let raw: &[u8] = bytemuck::cast_slice(values);
        Self {
            data: base64_simd::STANDARD.encode_to_string(raw),
            dtype: BinaryDataArrayType::Float64,
            compression: BinaryCompressionType::NoCompression,
            name,
        }
    }

    /// Encode `values` with zlib compression before base64 encoding
    pub fn from_f64_compressed(name: ArrayType, values: &[f64]) -> Result<Self, ArrayRetrievalError> {
        let compressed = Self::compress_zlib(bytemuck::cast_slice(values))?;
        Ok(Self {
            data: base64_simd::STANDARD.encode_to_string(&compressed),
            dtype: BinaryDataArrayType::Float64,
            compression: BinaryCompressionType::Zlib,
            name,
        })
    }

    pub fn compress_zlib(bytestring: &[u8]) -> Result<Bytes, ArrayRetrievalError> {
        let mut compressor = ZlibEncoder::new(Bytes::new(), Compression::best());
        compressor
            .write_all(bytestring)
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))?;
        compressor
            .finish()
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))
    }

    pub fn decompress_zlib(bytestring: &[u8]) -> Result<Bytes, ArrayRetrievalError> {
        let mut result = Bytes::new();
        let mut decompressor = ZlibDecoder::new(bytestring);
        decompressor
            .read_to_end(&mut result)
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))?;
        Ok(result)
    }

    /// Undo the base64 and compression layers, returning the raw value bytes
    pub fn decode(&self) -> Result<Bytes, ArrayRetrievalError> {
        let text = self.data.trim();
        if text.is_empty() {
            return Ok(Bytes::new());
        }
        let bytestring = base64_simd::STANDARD.decode_to_vec(text.as_bytes())?;
        match self.compression {
            BinaryCompressionType::NoCompression => Ok(bytestring),
            BinaryCompressionType::Zlib => Self::decompress_zlib(&bytestring),
        }
    }

    /// The length of this array's base64 text
    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }

    /// Decode the array and widen its values to `f64`
    pub fn to_f64(&self) -> Result<Vec<f64>, ArrayRetrievalError> {
        let bytes = self.decode()?;
        if bytes.len() % self.dtype.size_of() != 0 {
            return Err(ArrayRetrievalError::DataTypeSizeMismatch);
        }
        trace!(
            "Decoded {} bytes of {} {} data",
            bytes.len(),
            self.compression,
            self.dtype
        );
        let values = match self.dtype {
            BinaryDataArrayType::Float64 => bytemuck::pod_collect_to_vec::<u8, f64>(&bytes),
            BinaryDataArrayType::Float32 => bytemuck::pod_collect_to_vec::<u8, f32>(&bytes)
                .into_iter()
                .map(|v| v as f64)
                .collect(),
        };
        Ok(values)
    }
}
