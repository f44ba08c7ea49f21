//! Edit classification.
//!
//! A content change is reduced to a single signed magnitude and then sorted
//! into exactly one bucket. The rules are ordered: a bulk insert is a paste,
//! a negative magnitude is a deletion, and only a single character counts as
//! a keystroke.

use crate::feed::ContentChange;
use serde::{Deserialize, Serialize};

/// What a single change event counts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    /// Bulk insert of this many characters
    Paste(u64),
    /// Removal of this many characters
    Delete(u64),
    /// One typed character
    Keystroke,
}

/// Net magnitude of a change event.
///
/// Inserted lengths are summed across all fragments. When nothing was
/// inserted, only the first fragment's deleted range is considered, so a
/// multi-cursor delete is counted once.
pub fn net_magnitude(changes: &[ContentChange]) -> i64 {
    let inserted: u64 = changes.iter().map(|c| c.inserted_len).sum();
    if inserted > 0 {
        return i64::try_from(inserted).unwrap_or(i64::MAX);
    }

    match changes.first().and_then(|c| c.deleted_len) {
        Some(deleted) if deleted > 0 => -i64::try_from(deleted).unwrap_or(i64::MAX),
        _ => 0,
    }
}

/// Classify a net magnitude. Zero (e.g. a cursor move) is not an edit.
pub fn classify(magnitude: i64) -> Option<EditKind> {
    if magnitude > 1 {
        Some(EditKind::Paste(magnitude.unsigned_abs()))
    } else if magnitude < 0 {
        Some(EditKind::Delete(magnitude.unsigned_abs()))
    } else if magnitude == 1 {
        Some(EditKind::Keystroke)
    } else {
        None
    }
}

/// Classify a change event directly from its fragments.
pub fn classify_changes(changes: &[ContentChange]) -> Option<EditKind> {
    classify(net_magnitude(changes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_precedence() {
        assert_eq!(classify(5), Some(EditKind::Paste(5)));
        assert_eq!(classify(2), Some(EditKind::Paste(2)));
        assert_eq!(classify(1), Some(EditKind::Keystroke));
        assert_eq!(classify(0), None);
        assert_eq!(classify(-1), Some(EditKind::Delete(1)));
        assert_eq!(classify(-4), Some(EditKind::Delete(4)));
    }

    #[test]
    fn test_inserted_lengths_are_summed() {
        let changes = [ContentChange::insert(1), ContentChange::insert(0), ContentChange::insert(2)];
        assert_eq!(net_magnitude(&changes), 3);
    }

    #[test]
    fn test_insert_wins_over_deleted_range() {
        // Replacing a selection with one character is a keystroke.
        let changes = [ContentChange {
            inserted_len: 1,
            deleted_len: Some(10),
        }];
        assert_eq!(classify_changes(&changes), Some(EditKind::Keystroke));
    }

    #[test]
    fn test_deletion_uses_first_fragment_only() {
        let changes = [ContentChange::delete(3), ContentChange::delete(7)];
        assert_eq!(net_magnitude(&changes), -3);

        let changes = [ContentChange::insert(0), ContentChange::delete(7)];
        assert_eq!(net_magnitude(&changes), 0);
    }

    #[test]
    fn test_empty_changes_are_not_edits() {
        assert_eq!(net_magnitude(&[]), 0);
        assert_eq!(classify_changes(&[]), None);
        assert_eq!(classify_changes(&[ContentChange::delete(0)]), None);
    }
}
