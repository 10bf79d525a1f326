//! Tile assembly and parsing: features in, protobuf bytes out, and back.

use foldhash::fast::RandomState;
use indexmap::IndexMap;
use prost::Message;

use crate::EXTENT;
use crate::error::ParseError;
use crate::geometry::VectorGeometry;
use crate::tag::{TagsDecoder, TagsEncoder, Value};
use crate::vector_tile::{self, tile::GeomType};

/// Group sentinel for features that carry no grouping key.
pub const NO_GROUP: i64 = i64::MIN;

/// Insertion-ordered attribute mapping. `None` is the null value: dropped
/// when a feature is encoded, produced when a parsed wire value has no
/// oneof field set.
pub type AttrMap = IndexMap<String, Option<Value>, RandomState>;

/// A single tile feature: a named layer's geometry plus typed attributes.
///
/// `group` is a caller-assigned key used by upstream density control; it is
/// never written to the wire and parsed features always carry [`NO_GROUP`].
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub layer: String,
    pub id: i64,
    pub geometry: VectorGeometry,
    pub attrs: AttrMap,
    pub group: i64,
}

impl Feature {
    pub fn new(layer: impl Into<String>, id: i64, geometry: VectorGeometry, attrs: AttrMap) -> Self {
        Self {
            layer: layer.into(),
            id,
            geometry,
            attrs,
            group: NO_GROUP,
        }
    }

    pub fn with_group(mut self, group: i64) -> Self {
        self.group = group;
        self
    }
}

/// A feature reduced to wire terms: dictionary indices plus the encoded
/// geometry. Lives only while its tile is being assembled.
struct EncodedFeature {
    tags: Vec<u32>,
    id: i64,
    geometry: VectorGeometry,
}

#[derive(Default)]
struct LayerBuilder {
    features: Vec<EncodedFeature>,
    tags: TagsEncoder,
}

/// Assembles named layers of encoded features into MVT protobuf bytes.
///
/// The builder is a single-owner mutable sink; independent tiles get
/// independent builders.
#[derive(Default)]
pub struct TileBuilder {
    layers: IndexMap<String, LayerBuilder, RandomState>,
}

impl TileBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends features to the named layer, creating it when the first
    /// feature with a non-empty geometry arrives. Attributes are interned in
    /// insertion order; null values are dropped.
    pub fn add_layer_features(
        &mut self,
        layer_name: &str,
        features: impl IntoIterator<Item = Feature>,
    ) -> &mut Self {
        for feature in features {
            if feature.geometry.is_empty() {
                continue;
            }
            let layer = self.layers.entry(layer_name.to_string()).or_default();
            for (key, value) in feature.attrs {
                if let Some(value) = value {
                    layer.tags.add(&key, value);
                }
            }
            layer.features.push(EncodedFeature {
                tags: layer.tags.take_tags(),
                id: feature.id,
                geometry: feature.geometry,
            });
        }
        self
    }

    /// Serialises the tile. Layers are written in insertion order, each with
    /// `version = 2`; feature ids are written only when non-negative.
    pub fn encode(self) -> Vec<u8> {
        let layers = self
            .layers
            .into_iter()
            .map(|(name, layer)| {
                let (keys, values) = layer.tags.into_keys_and_values();
                vector_tile::tile::Layer {
                    version: 2,
                    name,
                    features: layer
                        .features
                        .into_iter()
                        .map(|feature| vector_tile::tile::Feature {
                            id: (feature.id >= 0).then_some(feature.id as u64),
                            tags: feature.tags,
                            r#type: Some(feature.geometry.geom_type as i32),
                            geometry: feature.geometry.commands,
                        })
                        .collect(),
                    keys,
                    values,
                    extent: Some(EXTENT),
                }
            })
            .collect();
        vector_tile::Tile { layers }.encode_to_vec()
    }
}

/// Parses MVT protobuf bytes into an ordered list of features.
///
/// Geometries are kept in their encoded form; callers invoke
/// [`VectorGeometry::decode`] per feature as needed.
pub fn decode(data: &[u8]) -> Result<Vec<Feature>, ParseError> {
    let tile = vector_tile::Tile::decode(data)?;
    let mut features = Vec::new();
    for layer in &tile.layers {
        let tags_decoder = TagsDecoder::new(&layer.keys, &layer.values);
        for feature in &layer.features {
            let attrs: AttrMap = tags_decoder
                .decode(&feature.tags)?
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect();
            let geom_type = feature
                .r#type
                .and_then(|t| GeomType::try_from(t).ok())
                .unwrap_or(GeomType::Unknown);
            features.push(Feature {
                layer: layer.name.clone(),
                id: feature.id.unwrap_or(0) as i64,
                geometry: VectorGeometry::new(feature.geometry.clone(), geom_type),
                attrs,
                group: NO_GROUP,
            });
        }
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::encode_geometry;
    use geo_types::{Geometry, point};

    fn point_geometry(x: f64, y: f64) -> VectorGeometry {
        encode_geometry(&Geometry::Point(point!(x: x, y: y))).unwrap()
    }

    fn attrs(entries: &[(&str, Value)]) -> AttrMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.clone())))
            .collect()
    }

    #[test]
    fn tile_roundtrip() {
        let mut builder = TileBuilder::new();
        builder
            .add_layer_features(
                "roads",
                vec![
                    Feature::new(
                        "roads",
                        1,
                        point_geometry(1.0, 2.0),
                        attrs(&[("name", "a".into()), ("lanes", 2i64.into())]),
                    ),
                    Feature::new(
                        "roads",
                        2,
                        point_geometry(3.0, 4.0),
                        attrs(&[("name", "b".into()), ("lanes", 2i64.into())]),
                    ),
                ],
            )
            .add_layer_features(
                "buildings",
                vec![Feature::new(
                    "buildings",
                    7,
                    point_geometry(5.0, 6.0),
                    attrs(&[("height", 12.5f64.into())]),
                )],
            );
        let data = builder.encode();

        let features = decode(&data).unwrap();
        assert_eq!(features.len(), 3);

        assert_eq!(features[0].layer, "roads");
        assert_eq!(features[0].id, 1);
        assert_eq!(features[0].group, NO_GROUP);
        assert_eq!(features[0].geometry, point_geometry(1.0, 2.0));
        assert_eq!(
            features[0].attrs,
            attrs(&[("name", "a".into()), ("lanes", Value::SInt(2))])
        );

        assert_eq!(features[1].id, 2);
        assert_eq!(
            features[1].attrs,
            attrs(&[("name", "b".into()), ("lanes", Value::SInt(2))])
        );

        assert_eq!(features[2].layer, "buildings");
        assert_eq!(features[2].id, 7);
        assert_eq!(features[2].attrs, attrs(&[("height", 12.5f64.into())]));
    }

    #[test]
    fn layer_wire_fields() {
        let mut builder = TileBuilder::new();
        builder.add_layer_features(
            "layer",
            vec![
                Feature::new(
                    "layer",
                    1,
                    point_geometry(0.0, 0.0),
                    attrs(&[("k", "x".into()), ("n", 1i64.into())]),
                ),
                Feature::new(
                    "layer",
                    2,
                    point_geometry(1.0, 1.0),
                    attrs(&[("k", "x".into()), ("n", 2i64.into())]),
                ),
            ],
        );
        let data = builder.encode();

        let tile = vector_tile::Tile::decode(&data[..]).unwrap();
        assert_eq!(tile.layers.len(), 1);
        let layer = &tile.layers[0];
        assert_eq!(layer.version, 2);
        assert_eq!(layer.name, "layer");
        assert_eq!(layer.extent, Some(EXTENT));
        assert_eq!(layer.keys, vec!["k", "n"]);
        assert_eq!(
            layer.values,
            vec![
                vector_tile::tile::Value {
                    string_value: Some("x".to_string()),
                    ..Default::default()
                },
                vector_tile::tile::Value {
                    sint_value: Some(1),
                    ..Default::default()
                },
                vector_tile::tile::Value {
                    sint_value: Some(2),
                    ..Default::default()
                },
            ]
        );
        assert_eq!(layer.features[0].tags, vec![0, 0, 1, 1]);
        assert_eq!(layer.features[1].tags, vec![0, 0, 1, 2]);
        assert_eq!(layer.features[0].r#type, Some(GeomType::Point as i32));
    }

    #[test]
    fn negative_id_is_omitted() {
        let mut builder = TileBuilder::new();
        builder.add_layer_features(
            "layer",
            vec![Feature::new(
                "layer",
                -1,
                point_geometry(0.0, 0.0),
                AttrMap::default(),
            )],
        );
        let data = builder.encode();

        let tile = vector_tile::Tile::decode(&data[..]).unwrap();
        assert_eq!(tile.layers[0].features[0].id, None);

        // the protobuf default takes over on the way back
        let features = decode(&data).unwrap();
        assert_eq!(features[0].id, 0);
    }

    #[test]
    fn empty_geometries_never_create_a_layer() {
        let empty = VectorGeometry::new(Vec::new(), GeomType::Unknown);
        let mut builder = TileBuilder::new();
        builder.add_layer_features(
            "layer",
            vec![Feature::new("layer", 1, empty, AttrMap::default())],
        );
        let data = builder.encode();

        let tile = vector_tile::Tile::decode(&data[..]).unwrap();
        assert!(tile.layers.is_empty());
    }

    #[test]
    fn null_attributes_are_dropped() {
        let mut attrs = AttrMap::default();
        attrs.insert("kept".to_string(), Some("v".into()));
        attrs.insert("dropped".to_string(), None);

        let mut builder = TileBuilder::new();
        builder.add_layer_features(
            "layer",
            vec![Feature::new("layer", 1, point_geometry(0.0, 0.0), attrs)],
        );
        let data = builder.encode();

        let tile = vector_tile::Tile::decode(&data[..]).unwrap();
        assert_eq!(tile.layers[0].keys, vec!["kept"]);
        assert_eq!(tile.layers[0].features[0].tags, vec![0, 0]);
    }

    #[test]
    fn every_value_variant_roundtrips() {
        let variants = [
            Value::String("s".to_string()),
            Value::Float(1.5f32.to_ne_bytes()),
            Value::Double(2.5f64.to_ne_bytes()),
            Value::Int(-3),
            Value::Uint(4),
            Value::SInt(-5),
            Value::Bool(true),
        ];
        for value in variants {
            let mut builder = TileBuilder::new();
            builder.add_layer_features(
                "layer",
                vec![Feature::new(
                    "layer",
                    0,
                    point_geometry(0.0, 0.0),
                    attrs(&[("v", value.clone())]),
                )],
            );
            let features = decode(&builder.encode()).unwrap();
            assert_eq!(features[0].attrs["v"], Some(value));
        }
    }

    #[test]
    fn appending_to_a_layer_keeps_dictionary_ids_stable() {
        let mut builder = TileBuilder::new();
        builder.add_layer_features(
            "layer",
            vec![Feature::new(
                "layer",
                1,
                point_geometry(0.0, 0.0),
                attrs(&[("k", "x".into())]),
            )],
        );
        builder.add_layer_features(
            "layer",
            vec![Feature::new(
                "layer",
                2,
                point_geometry(1.0, 1.0),
                attrs(&[("k", "x".into())]),
            )],
        );
        let data = builder.encode();

        let tile = vector_tile::Tile::decode(&data[..]).unwrap();
        assert_eq!(tile.layers.len(), 1);
        assert_eq!(tile.layers[0].features.len(), 2);
        assert_eq!(tile.layers[0].keys, vec!["k"]);
        assert_eq!(tile.layers[0].features[1].tags, vec![0, 0]);
    }

    #[test]
    fn parse_error_on_malformed_bytes() {
        assert!(matches!(
            decode(&[0xff, 0xff, 0xff]),
            Err(ParseError::Protobuf(_))
        ));
    }

    #[test]
    fn parse_error_on_odd_tag_count() {
        let tile = vector_tile::Tile {
            layers: vec![vector_tile::tile::Layer {
                version: 2,
                name: "layer".to_string(),
                features: vec![vector_tile::tile::Feature {
                    id: None,
                    tags: vec![0],
                    r#type: Some(GeomType::Point as i32),
                    geometry: vec![9, 0, 0],
                }],
                keys: vec!["k".to_string()],
                values: vec![vector_tile::tile::Value {
                    string_value: Some("v".to_string()),
                    ..Default::default()
                }],
                extent: Some(EXTENT),
            }],
        };
        assert!(matches!(
            decode(&tile.encode_to_vec()),
            Err(ParseError::OddTagCount(1))
        ));
    }

    #[test]
    fn parse_error_on_out_of_range_indices() {
        let mut tile = vector_tile::Tile {
            layers: vec![vector_tile::tile::Layer {
                version: 2,
                name: "layer".to_string(),
                features: vec![vector_tile::tile::Feature {
                    id: None,
                    tags: vec![9, 0],
                    r#type: Some(GeomType::Point as i32),
                    geometry: vec![9, 0, 0],
                }],
                keys: vec!["k".to_string()],
                values: vec![vector_tile::tile::Value {
                    string_value: Some("v".to_string()),
                    ..Default::default()
                }],
                extent: Some(EXTENT),
            }],
        };
        assert!(matches!(
            decode(&tile.encode_to_vec()),
            Err(ParseError::KeyIndexOutOfRange(9))
        ));

        tile.layers[0].features[0].tags = vec![0, 9];
        assert!(matches!(
            decode(&tile.encode_to_vec()),
            Err(ParseError::ValueIndexOutOfRange(9))
        ));
    }

    #[test]
    fn parsed_geometry_decodes_lazily() {
        let mut builder = TileBuilder::new();
        builder.add_layer_features(
            "layer",
            vec![Feature::new(
                "layer",
                1,
                point_geometry(64.0, 64.0),
                AttrMap::default(),
            )],
        );
        let features = decode(&builder.encode()).unwrap();
        assert_eq!(features[0].geometry.commands, vec![9, 2048, 2048]);
        assert_eq!(
            features[0].geometry.decode().unwrap(),
            Geometry::Point(point!(x: 64.0, y: 64.0))
        );
    }
}
