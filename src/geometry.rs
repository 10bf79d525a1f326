//! Geometry command-stream encoder and decoder for MVT.

use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use tracing::warn;

use crate::SCALE;
use crate::error::{DecodeError, EncodeError};
use crate::vector_tile::tile::GeomType;

const GEOM_COMMAND_MOVE_TO: u32 = 1;
const GEOM_COMMAND_LINE_TO: u32 = 2;
const GEOM_COMMAND_CLOSE_PATH: u32 = 7;

/// Largest repeat count a command header can carry.
const MAX_COMMAND_REPEAT: u32 = (1 << 29) - 1;

/// Packs a command id and repeat count into a command header integer.
#[inline]
fn command(id: u32, repeat: u32) -> u32 {
    debug_assert!(repeat <= MAX_COMMAND_REPEAT);
    repeat << 3 | id
}

/// A geometry held in its encoded MVT form: the raw command stream plus the
/// geometry type tag.
///
/// Instances are value-semantic and freely shareable; [`VectorGeometry::decode`]
/// is a pure function of the pair and may be called any number of times.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VectorGeometry {
    pub commands: Vec<u32>,
    pub geom_type: GeomType,
}

impl VectorGeometry {
    pub fn new(commands: Vec<u32>, geom_type: GeomType) -> Self {
        Self {
            commands,
            geom_type,
        }
    }

    /// True when the command stream holds no geometry at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Decodes the command stream back into a planar geometry in tile-local
    /// floating-point coordinates.
    ///
    /// An empty stream, a stream yielding no usable sub-geometry, or an
    /// `Unknown` type tag decodes to an empty `GeometryCollection`. Degenerate
    /// rings and self-intersections pass through undetected; validating the
    /// result is the caller's concern.
    pub fn decode(&self) -> Result<Geometry<f64>, DecodeError> {
        let sequences = decode_sequences(&self.commands, self.geom_type)?;
        Ok(match self.geom_type {
            GeomType::Point => assemble_points(sequences),
            GeomType::Linestring => assemble_linestrings(sequences),
            GeomType::Polygon => assemble_polygons(sequences),
            GeomType::Unknown => empty_collection(),
        })
    }
}

/// Encodes a single geometry with a fresh encoder.
pub fn encode_geometry(geometry: &Geometry<f64>) -> Result<VectorGeometry, EncodeError> {
    let mut encoder = GeometryEncoder::new();
    encoder.add_geometry(geometry)?;
    Ok(VectorGeometry::new(
        encoder.into_commands(),
        geom_type(geometry),
    ))
}

/// Maps a geometry to its MVT type tag.
pub fn geom_type(geometry: &Geometry<f64>) -> GeomType {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => GeomType::Point,
        Geometry::LineString(_) | Geometry::MultiLineString(_) => GeomType::Linestring,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => GeomType::Polygon,
        _ => GeomType::Unknown,
    }
}

/// Utility for encoding MVT geometries.
///
/// Input coordinates are tile-local floats in `[0, TILE_SIZE]`; they are
/// scaled to integer tile units and delta-coded against a cursor that starts
/// at `(0, 0)` and persists across every geometry submitted to the same
/// encoder.
pub struct GeometryEncoder {
    buf: Vec<u32>,
    cursor_x: i32,
    cursor_y: i32,
}

impl GeometryEncoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            cursor_x: 0,
            cursor_y: 0,
        }
    }

    /// Consumes the encoder and returns the encoded command stream.
    #[inline]
    pub fn into_commands(self) -> Vec<u32> {
        self.buf
    }

    /// Appends one geometry to the command stream.
    ///
    /// Geometry types with no MVT representation (collections, lines, rects,
    /// triangles) are logged and skipped without emitting commands.
    pub fn add_geometry(&mut self, geometry: &Geometry<f64>) -> Result<(), EncodeError> {
        match geometry {
            Geometry::Point(point) => self.add_points(std::slice::from_ref(point)),
            Geometry::MultiPoint(points) => self.add_points(&points.0),
            Geometry::LineString(line) => self.add_path(line, false),
            Geometry::MultiLineString(lines) => {
                for line in &lines.0 {
                    self.add_path(line, false)?;
                }
                Ok(())
            }
            Geometry::Polygon(polygon) => self.add_polygon(polygon),
            Geometry::MultiPolygon(polygons) => {
                for polygon in &polygons.0 {
                    self.add_polygon(polygon)?;
                }
                Ok(())
            }
            other => {
                warn!(
                    "skipping geometry type {} with no MVT representation",
                    type_name(other)
                );
                Ok(())
            }
        }
    }

    /// Adds a point run: one MoveTo header followed by every delta pair.
    fn add_points(&mut self, points: &[Point<f64>]) -> Result<(), EncodeError> {
        if points.is_empty() {
            return Err(EncodeError::EmptyGeometry);
        }
        self.buf
            .push(command(GEOM_COMMAND_MOVE_TO, points.len() as u32));
        for point in points {
            let [x, y] = scaled(&point.0);
            self.push_delta(x, y);
        }
        Ok(())
    }

    fn add_polygon(&mut self, polygon: &Polygon<f64>) -> Result<(), EncodeError> {
        self.add_path(polygon.exterior(), true)?;
        for ring in polygon.interiors() {
            self.add_path(ring, true)?;
        }
        Ok(())
    }

    /// Adds a path (line string or polygon ring).
    fn add_path(&mut self, line: &LineString<f64>, close: bool) -> Result<(), EncodeError> {
        let mut points: Vec<[i32; 2]> = line.coords().map(scaled).collect();
        if points.is_empty() {
            return Err(EncodeError::EmptyGeometry);
        }
        // rings are implicitly closed on the wire
        if close && points.len() > 1 && points.first() == points.last() {
            points.pop();
        }

        let [first_x, first_y] = points[0];
        self.buf.push(command(GEOM_COMMAND_MOVE_TO, 1));
        self.push_delta(first_x, first_y);

        // the LineTo repeat count is unknown until duplicate points are
        // filtered, so reserve the header slot and rewrite it afterwards
        let lineto_cmd_pos = self.buf.len();
        self.buf.push(GEOM_COMMAND_LINE_TO);
        let mut count: u32 = 0;
        for &[x, y] in &points[1..] {
            if x == self.cursor_x && y == self.cursor_y {
                continue;
            }
            self.push_delta(x, y);
            count += 1;
        }
        if count == 0 {
            self.buf.truncate(lineto_cmd_pos);
        } else {
            self.buf[lineto_cmd_pos] = command(GEOM_COMMAND_LINE_TO, count);
        }

        if close {
            self.buf.push(command(GEOM_COMMAND_CLOSE_PATH, 1));
        }
        Ok(())
    }

    #[inline]
    fn push_delta(&mut self, x: i32, y: i32) {
        let dx = x.wrapping_sub(self.cursor_x);
        let dy = y.wrapping_sub(self.cursor_y);
        (self.cursor_x, self.cursor_y) = (x, y);
        self.buf.extend([zigzag(dx), zigzag(dy)]);
    }
}

impl Default for GeometryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scales a tile-local coordinate to integer tile units, rounding ties away
/// from zero.
#[inline]
fn scaled(coord: &Coord<f64>) -> [i32; 2] {
    [
        (coord.x * SCALE).round() as i32,
        (coord.y * SCALE).round() as i32,
    ]
}

fn type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Line(_) => "Line",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "Geometry",
    }
}

/// Cursor-tracking reader over a raw command stream.
struct CommandReader<'a> {
    buf: &'a [u32],
    pos: usize,
    cursor_x: i32,
    cursor_y: i32,
}

impl CommandReader<'_> {
    fn next_header(&mut self) -> Option<u32> {
        let header = self.buf.get(self.pos).copied();
        if header.is_some() {
            self.pos += 1;
        }
        header
    }

    fn read_coord(&mut self) -> Result<[i32; 2], DecodeError> {
        if self.pos + 1 >= self.buf.len() {
            return Err(DecodeError::Truncated);
        }
        let dx = unzigzag(self.buf[self.pos]);
        let dy = unzigzag(self.buf[self.pos + 1]);
        self.pos += 2;
        self.cursor_x = self.cursor_x.wrapping_add(dx);
        self.cursor_y = self.cursor_y.wrapping_add(dy);
        Ok([self.cursor_x, self.cursor_y])
    }
}

/// Walks the command stream into raw coordinate sequences, one per MoveTo
/// step. ClosePath repeats the sequence's first coordinate except for point
/// geometries, where it is ignored.
fn decode_sequences(
    commands: &[u32],
    geom_type: GeomType,
) -> Result<Vec<Vec<[i32; 2]>>, DecodeError> {
    let mut reader = CommandReader {
        buf: commands,
        pos: 0,
        cursor_x: 0,
        cursor_y: 0,
    };
    let mut sequences: Vec<Vec<[i32; 2]>> = Vec::new();

    while let Some(header) = reader.next_header() {
        let cmd = header & 0x7;
        let repeat = header >> 3;
        match cmd {
            GEOM_COMMAND_MOVE_TO => {
                for _ in 0..repeat {
                    let coord = reader.read_coord()?;
                    sequences.push(vec![coord]);
                }
            }
            GEOM_COMMAND_LINE_TO => {
                let Some(sequence) = sequences.last_mut() else {
                    return Err(DecodeError::UnexpectedLineTo);
                };
                for _ in 0..repeat {
                    let coord = reader.read_coord()?;
                    sequence.push(coord);
                }
            }
            GEOM_COMMAND_CLOSE_PATH => {
                if geom_type != GeomType::Point {
                    if let Some(sequence) = sequences.last_mut() {
                        if let Some(&first) = sequence.first() {
                            sequence.push(first);
                        }
                    }
                }
            }
            other => return Err(DecodeError::InvalidCommand(other)),
        }
    }
    Ok(sequences)
}

#[inline]
fn to_coord(p: [i32; 2]) -> Coord<f64> {
    Coord {
        x: p[0] as f64 / SCALE,
        y: p[1] as f64 / SCALE,
    }
}

fn empty_collection() -> Geometry<f64> {
    Geometry::GeometryCollection(GeometryCollection(Vec::new()))
}

fn assemble_points(sequences: Vec<Vec<[i32; 2]>>) -> Geometry<f64> {
    // only the first coordinate of each sequence carries a point
    let mut points: Vec<Point<f64>> = sequences
        .iter()
        .filter_map(|s| s.first())
        .map(|&p| Point::from(to_coord(p)))
        .collect();
    match points.len() {
        0 => empty_collection(),
        1 => Geometry::Point(points.swap_remove(0)),
        _ => Geometry::MultiPoint(MultiPoint(points)),
    }
}

fn assemble_linestrings(sequences: Vec<Vec<[i32; 2]>>) -> Geometry<f64> {
    let mut lines: Vec<LineString<f64>> = sequences
        .into_iter()
        .filter(|s| s.len() >= 2)
        .map(|s| LineString::new(s.into_iter().map(to_coord).collect()))
        .collect();
    match lines.len() {
        0 => empty_collection(),
        1 => Geometry::LineString(lines.swap_remove(0)),
        _ => Geometry::MultiLineString(MultiLineString(lines)),
    }
}

fn assemble_polygons(sequences: Vec<Vec<[i32; 2]>>) -> Geometry<f64> {
    // The first ring's orientation defines the outer orientation; rings with
    // the same orientation start new shells, opposite rings become holes of
    // the current shell.
    let mut grouped: Vec<(Vec<[i32; 2]>, Vec<Vec<[i32; 2]>>)> = Vec::new();
    let mut outer_is_ccw: Option<bool> = None;
    for sequence in sequences {
        let is_ccw = signed_area(&sequence) > 0;
        match outer_is_ccw {
            Some(outer) if is_ccw != outer => {
                // degenerate holes are dropped
                if sequence.len() >= 2 {
                    if let Some(current) = grouped.last_mut() {
                        current.1.push(sequence);
                    }
                }
            }
            _ => {
                outer_is_ccw.get_or_insert(is_ccw);
                grouped.push((sequence, Vec::new()));
            }
        }
    }

    let ring = |coords: Vec<[i32; 2]>| LineString::new(coords.into_iter().map(to_coord).collect());
    let mut polygons: Vec<Polygon<f64>> = grouped
        .into_iter()
        .map(|(shell, holes)| Polygon::new(ring(shell), holes.into_iter().map(ring).collect()))
        .collect();
    match polygons.len() {
        0 => empty_collection(),
        1 => Geometry::Polygon(polygons.swap_remove(0)),
        _ => Geometry::MultiPolygon(MultiPolygon(polygons)),
    }
}

/// Twice the signed area of a ring, exact over integer coordinates.
/// Positive for counter-clockwise rings in the tile's axis convention.
fn signed_area(ring: &[[i32; 2]]) -> i64 {
    if ring.len() < 3 {
        return 0;
    }
    let mut area = 0i64;
    for i in 0..ring.len() {
        let j = (i + 1) % ring.len();
        area += ring[i][0] as i64 * ring[j][1] as i64;
        area -= ring[j][0] as i64 * ring[i][1] as i64;
    }
    area
}

/// zig-zag encoding
///
/// See: https://protobuf.dev/programming-guides/encoding/#signed-ints
#[inline]
fn zigzag(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

/// zig-zag decoding
#[inline]
fn unzigzag(v: u32) -> i32 {
    ((v >> 1) as i32) ^ (-((v & 1) as i32))
}
