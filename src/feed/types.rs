//! Editor event types consumed by the aggregator.
//!
//! These carry only what the counters need: the document identity, the
//! project it belongs to and, for edits, the size of each content change.
//! Inserted text itself never crosses this boundary.

use serde::{Deserialize, Serialize};

/// File name used for documents the editor reports without a name.
pub const NO_NAME_FILE: &str = "Untitled";

/// Project key used when no workspace root can be resolved.
pub const NO_PROJECT: &str = "None";

/// Identity of the document an event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Full path of the file, if the editor knows one
    #[serde(default)]
    pub file_name: Option<String>,
    /// Whether this is a throwaway buffer that was never saved
    #[serde(default)]
    pub is_untitled: bool,
}

impl DocumentRef {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            file_name: Some(path.into()),
            is_untitled: false,
        }
    }

    pub fn untitled() -> Self {
        Self {
            file_name: None,
            is_untitled: true,
        }
    }

    /// The name activity is bucketed under.
    pub fn file_key(&self) -> &str {
        match self.file_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => NO_NAME_FILE,
        }
    }
}

/// Workspace root the editor reported alongside an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub directory: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl ProjectRef {
    pub fn new(directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            name: None,
        }
    }
}

/// A single fragment of a content change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChange {
    /// Length of the text inserted by this fragment
    #[serde(default)]
    pub inserted_len: u64,
    /// Length of the range this fragment replaced, if any
    #[serde(default)]
    pub deleted_len: Option<u64>,
}

impl ContentChange {
    pub fn insert(len: u64) -> Self {
        Self {
            inserted_len: len,
            deleted_len: None,
        }
    }

    pub fn delete(len: u64) -> Self {
        Self {
            inserted_len: 0,
            deleted_len: Some(len),
        }
    }
}

/// Document lifecycle notification from the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditorEvent {
    Open {
        document: DocumentRef,
        #[serde(default)]
        project: Option<ProjectRef>,
    },
    Close {
        document: DocumentRef,
        #[serde(default)]
        project: Option<ProjectRef>,
    },
    Change {
        document: DocumentRef,
        #[serde(default)]
        project: Option<ProjectRef>,
        #[serde(default)]
        changes: Vec<ContentChange>,
    },
}

impl EditorEvent {
    pub fn document(&self) -> &DocumentRef {
        match self {
            EditorEvent::Open { document, .. }
            | EditorEvent::Close { document, .. }
            | EditorEvent::Change { document, .. } => document,
        }
    }

    pub fn project(&self) -> Option<&ProjectRef> {
        match self {
            EditorEvent::Open { project, .. }
            | EditorEvent::Close { project, .. }
            | EditorEvent::Change { project, .. } => project.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_key_falls_back_to_no_name() {
        assert_eq!(DocumentRef::file("/w/a.rs").file_key(), "/w/a.rs");
        assert_eq!(DocumentRef::untitled().file_key(), NO_NAME_FILE);

        let empty = DocumentRef {
            file_name: Some(String::new()),
            is_untitled: false,
        };
        assert_eq!(empty.file_key(), NO_NAME_FILE);
    }

    #[test]
    fn test_change_event_from_json() {
        let json = r#"{
            "kind": "change",
            "document": {"file_name": "/w/main.rs"},
            "project": {"directory": "/w", "name": "w"},
            "changes": [{"inserted_len": 0, "deleted_len": 4}]
        }"#;

        let event: EditorEvent = serde_json::from_str(json).unwrap();
        match &event {
            EditorEvent::Change { changes, .. } => {
                assert_eq!(changes, &vec![ContentChange::delete(4)]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!event.document().is_untitled);
        assert_eq!(event.project().unwrap().name.as_deref(), Some("w"));
    }

    #[test]
    fn test_open_event_without_project() {
        let json = r#"{"kind": "open", "document": {"file_name": "/tmp/x"}}"#;
        let event: EditorEvent = serde_json::from_str(json).unwrap();
        assert!(event.project().is_none());
    }
}
