//! Encoding and decoding of mzML binary data arrays.
mod array;
mod encodings;

pub use array::{encoded_length, Bytes, DataArray};
pub use encodings::{ArrayRetrievalError, ArrayType, BinaryCompressionType, BinaryDataArrayType};
