use super::geometry::Geometry;

/// One structure from the normalized input table.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureRecord {
    /// Sanitized, unique identifier; also the stem of every per-structure file.
    pub id: String,
    /// Line-notation identifier as it appeared in the input.
    pub raw_identifier: String,
    /// Accepted geometry, set by the embedding engine.
    pub geometry: Option<Geometry>,
}

impl StructureRecord {
    pub fn new(id: impl Into<String>, raw_identifier: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_identifier: raw_identifier.into(),
            geometry: None,
        }
    }
}
