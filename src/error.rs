//! Error types for the MVT codec.

use thiserror::Error;

/// Errors raised while encoding a geometry into a command stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A point set, line string, or ring with zero coordinates reached the encoder.
    #[error("geometry component has no coordinates")]
    EmptyGeometry,
}

/// Errors raised while decoding a command stream back into a geometry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The stream contains a command id other than MoveTo, LineTo, or ClosePath.
    #[error("invalid geometry command id {0}")]
    InvalidCommand(u32),

    /// A LineTo appeared before any MoveTo opened a coordinate sequence.
    #[error("LineTo before any MoveTo")]
    UnexpectedLineTo,

    /// The stream ended in the middle of a command's coordinate pairs.
    #[error("geometry stream truncated while reading coordinates")]
    Truncated,
}

/// Errors raised while parsing tile protobuf bytes into features.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The bytes are not a valid tile protobuf message.
    #[error("malformed tile protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// A feature's tags array has odd length.
    #[error("feature tags array has odd length {0}")]
    OddTagCount(usize),

    /// A tag pair references a key index past the layer's keys dictionary.
    #[error("tag key index {0} out of range")]
    KeyIndexOutOfRange(u32),

    /// A tag pair references a value index past the layer's values dictionary.
    #[error("tag value index {0} out of range")]
    ValueIndexOutOfRange(u32),
}
