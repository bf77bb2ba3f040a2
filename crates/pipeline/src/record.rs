use anyhow::Result;
use common::PipelineError;
use extract::ExtractionResult;
use index::LoadReport;
use serde::Serialize;
use std::path::PathBuf;

/// Everything known about one item as it moves through the stages. Each
/// stage reads the field its predecessor filled and fills its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineRecord {
    pub item_id: String,
    pub segment_paths: Option<Vec<PathBuf>>,
    pub transcripts: Option<Vec<String>>,
    pub unified_text: Option<String>,
    pub corrected_text: Option<String>,
    pub coreference_text: Option<String>,
    pub translated_text: Option<String>,
    pub structured_output: Option<ExtractionResult>,
    pub load_report: Option<LoadReport>,
}

impl PipelineRecord {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            ..Default::default()
        }
    }
}

/// Borrow a field a stage depends on, or fail with `MissingInput`.
pub fn require<'a, T: ?Sized>(item_id: &str, value: Option<&'a T>, field: &'static str) -> Result<&'a T> {
    value.ok_or_else(|| {
        PipelineError::MissingInput {
            item_id: item_id.to_string(),
            field,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_reports_the_missing_field() {
        let record = PipelineRecord::new("vid");

        let err = require(&record.item_id, record.unified_text.as_deref(), "unified_text").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInput { field: "unified_text", .. })
        ));
    }

    #[test]
    fn test_require_borrows_present_field() {
        let mut record = PipelineRecord::new("vid");
        record.corrected_text = Some("text".to_string());

        assert_eq!(require(&record.item_id, record.corrected_text.as_deref(), "corrected_text").unwrap(), "text");
    }
}
