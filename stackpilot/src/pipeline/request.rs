//! The fields of a Run request.

use crate::errors::RequestError;
use crate::rag::DocumentSource;
use std::collections::HashMap;

/// Form field holding the model identifier.
pub const FIELD_MODEL: &str = "modelName";
/// Form field holding the document source.
pub const FIELD_SOURCE: &str = "webUrl";
/// Alternative name for the document source field.
pub const FIELD_SOURCE_ALT: &str = "documentSource";
/// Form field holding the query.
pub const FIELD_QUERY: &str = "query";

/// A validated Run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    /// Model to reserve.
    pub model_name: String,
    /// Document to ingest.
    pub document_source: DocumentSource,
    /// Question to answer.
    pub query: String,
}

impl ProvisionRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(
        model_name: impl Into<String>,
        document_source: &str,
        query: impl Into<String>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            document_source: DocumentSource::parse(document_source),
            query: query.into(),
        }
    }

    /// Reads a request from form fields. Absent or blank fields are rejected.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, RequestError> {
        let field = |name: &'static str| {
            fields
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let model_name = field(FIELD_MODEL).ok_or(RequestError::MissingField(FIELD_MODEL))?;
        let source = field(FIELD_SOURCE)
            .or_else(|| field(FIELD_SOURCE_ALT))
            .ok_or(RequestError::MissingField(FIELD_SOURCE))?;
        let query = field(FIELD_QUERY).ok_or(RequestError::MissingField(FIELD_QUERY))?;

        Ok(Self::new(model_name, source, query))
    }
}
