//! Shared models used across crates

use serde::{Deserialize, Serialize};

/// Identifier of a source document that owns one or more knowledge points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite key of a knowledge point: owning document plus chunk position.
///
/// Renders as `"{document_id}_chunk_{chunk_index}"`, the storage id shared by
/// the vector index and the lexical corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointId {
    pub document_id: DocumentId,
    pub chunk_index: u32,
}

impl PointId {
    pub fn new(document_id: DocumentId, chunk_index: u32) -> Self {
        Self { document_id, chunk_index }
    }

    /// Prefix shared by every storage id of a document's points.
    pub fn document_prefix(document_id: &DocumentId) -> String {
        format!("{}_chunk_", document_id.0)
    }

    /// Parse a storage id back into its components. Ids written by other
    /// tools (e.g. manually added points) may not follow the format; those
    /// yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (doc, idx) = raw.rsplit_once("_chunk_")?;
        if doc.is_empty() {
            return None;
        }
        let chunk_index: u32 = idx.parse().ok()?;
        Some(Self { document_id: DocumentId(doc.to_string()), chunk_index })
    }
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_chunk_{}", self.document_id.0, self.chunk_index)
    }
}

/// Filterable metadata carried with every indexed point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointMetadata {
    pub document_id: String,
    pub chunk_index: u32,
}

/// One chunk-sized fragment of a document's text, the unit of indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgePoint {
    pub id: PointId,
    pub content: String,
    pub tags: Vec<String>,
}

impl KnowledgePoint {
    pub fn new(document_id: DocumentId, chunk_index: u32, content: impl Into<String>) -> Self {
        Self {
            id: PointId::new(document_id, chunk_index),
            content: content.into(),
            tags: Vec::new(),
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.id.document_id
    }

    pub fn chunk_index(&self) -> u32 {
        self.id.chunk_index
    }

    pub fn metadata(&self) -> PointMetadata {
        PointMetadata {
            document_id: self.id.document_id.0.clone(),
            chunk_index: self.id.chunk_index,
        }
    }
}

/// Default collection receiving points from every processed document.
pub const GLOBAL_COLLECTION: &str = "global_knowledge_base";

/// Collection name for a single document's private namespace.
pub fn document_collection(document_id: &DocumentId) -> String {
    format!("doc_{}", document_id.0)
}

/// Map a collection name to a filesystem-safe file stem. Names that differ
/// only in replaced characters collide; callers pick collection names that
/// stay distinct after sanitization.
pub fn sanitize_collection(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_renders_storage_format() {
        let id = PointId::new(DocumentId::new("42"), 7);
        assert_eq!(id.to_string(), "42_chunk_7");
    }

    #[test]
    fn point_id_parse_round_trips() {
        let id = PointId::parse("doc-a_chunk_3").expect("well-formed id parses");
        assert_eq!(id.document_id.as_str(), "doc-a");
        assert_eq!(id.chunk_index, 3);
        assert_eq!(id.to_string(), "doc-a_chunk_3");
    }

    #[test]
    fn point_id_parse_uses_last_separator() {
        // Document ids may themselves contain the separator text.
        let id = PointId::parse("a_chunk_b_chunk_9").expect("parses");
        assert_eq!(id.document_id.as_str(), "a_chunk_b");
        assert_eq!(id.chunk_index, 9);
    }

    #[test]
    fn point_id_parse_rejects_foreign_ids() {
        assert!(PointId::parse("manual-note-17").is_none());
        assert!(PointId::parse("_chunk_5").is_none());
        assert!(PointId::parse("doc_chunk_x").is_none());
    }

    #[test]
    fn document_prefix_matches_rendered_ids() {
        let doc = DocumentId::new("9");
        let prefix = PointId::document_prefix(&doc);
        assert!(PointId::new(doc, 0).to_string().starts_with(&prefix));
    }

    #[test]
    fn sanitize_keeps_safe_names_and_replaces_the_rest() {
        assert_eq!(sanitize_collection("global_knowledge_base"), "global_knowledge_base");
        assert_eq!(sanitize_collection("doc_42"), "doc_42");
        assert_eq!(sanitize_collection("a/b c:d"), "a_b_c_d");
        assert_eq!(sanitize_collection(""), "_");
    }

    #[test]
    fn knowledge_point_metadata_carries_filter_fields() {
        let kp = KnowledgePoint::new(DocumentId::new("12"), 4, "body");
        let meta = kp.metadata();
        assert_eq!(meta.document_id, "12");
        assert_eq!(meta.chunk_index, 4);
    }
}
