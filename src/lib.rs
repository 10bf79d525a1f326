//! Encoder and decoder core for Mapbox Vector Tiles (MVT).
//!
//! The crate covers the MVT 2.1 geometry command stream (delta-coded,
//! zigzag-encoded MoveTo/LineTo/ClosePath runs), the per-layer attribute
//! dictionaries, and the tile-level protobuf assembly and parsing:
//!
//! - [`geometry::encode_geometry`] turns a [`geo_types::Geometry`] into a
//!   [`geometry::VectorGeometry`]; [`geometry::VectorGeometry::decode`] is
//!   the inverse.
//! - [`tile::TileBuilder`] assembles named layers of features into tile
//!   bytes; [`tile::decode`] parses tile bytes back into features, leaving
//!   each geometry encoded until the caller asks for it.
//!
//! Everything is synchronous and allocation-local: one builder per tile,
//! no shared state, uncompressed output bytes.

pub mod error;
pub mod geometry;
pub mod tag;
pub mod tile;
pub mod vector_tile;

pub use error::{DecodeError, EncodeError, ParseError};
pub use geometry::{GeometryEncoder, VectorGeometry, encode_geometry};
pub use tag::Value;
pub use tile::{AttrMap, Feature, NO_GROUP, TileBuilder, decode};
pub use vector_tile::tile::GeomType;

/// Integer tile units per tile side, written to every layer.
pub const EXTENT: u32 = 4096;

/// Side length of the tile-local floating-point frame; input coordinates
/// span `[0, TILE_SIZE]`.
pub const TILE_SIZE: u32 = 256;

/// Multiplier from tile-local floats to integer tile units.
pub const SCALE: f64 = (EXTENT / TILE_SIZE) as f64;
