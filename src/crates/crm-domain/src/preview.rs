//! `Preview`: the human-readable artifact attached to every approval request.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailField {
    pub label: String,
    pub value: String,
}

impl DetailField {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preview {
    #[serde(rename = "type")]
    pub preview_type: String,
    pub action: String,
    pub title: String,
    pub details: Vec<DetailField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Preview {
    pub fn new(
        preview_type: impl Into<String>,
        action: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            preview_type: preview_type.into(),
            action: action.into(),
            title: title.into(),
            details: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_detail(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push(DetailField::new(label, value));
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_details_and_warnings() {
        let preview = Preview::new("appointment", "create", "Team sync")
            .with_detail("when", "tomorrow 8am")
            .with_warning("1 attendee unresolved");

        assert_eq!(preview.details.len(), 1);
        assert!(preview.has_warnings());
    }
}
