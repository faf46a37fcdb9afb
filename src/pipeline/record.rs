//! The per-object output record.

use crate::neighbors::NeighborhoodMap;
use crate::projection::ProjectionMethod;
use crate::types::Coordinate;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Everything emitted for one input object.
///
/// Serialized as
/// `{"idx", "word", "embedding"?, "nearest_neighbors", "embedding_<method>"...}`
/// with projection keys in configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub index: usize,
    pub label: String,
    pub embedding: Option<Vec<f64>>,
    pub neighbors: NeighborhoodMap,
    pub projections: Vec<(ProjectionMethod, Coordinate)>,
}

impl ObjectRecord {
    #[must_use]
    pub fn projection(&self, method: ProjectionMethod) -> Option<Coordinate> {
        self.projections
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, point)| *point)
    }
}

impl Serialize for ObjectRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 3 + usize::from(self.embedding.is_some()) + self.projections.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("idx", &self.index)?;
        map.serialize_entry("word", &self.label)?;
        if let Some(embedding) = &self.embedding {
            map.serialize_entry("embedding", embedding)?;
        }
        map.serialize_entry("nearest_neighbors", &self.neighbors)?;
        for (method, point) in &self.projections {
            map.serialize_entry(&method.output_key(), point)?;
        }
        map.end()
    }
}
