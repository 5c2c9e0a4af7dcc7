//! Schedule template rows
//!
//! A template is an ordered list of rows describing a standard build. Tasks
//! created from a row remember it so later rows can be wired after them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::error::{Result, ScheduleError};
use super::id::TemplateRowId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRow {
    pub id: TemplateRowId,
    pub name: String,
    pub duration_days: u32,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub predecessor_row_ids: BTreeSet<TemplateRowId>,
    #[serde(default)]
    pub sequence_order: u32,
}

/// All template rows of a workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateLibrary {
    rows: BTreeMap<TemplateRowId, TemplateRow>,
}

impl TemplateLibrary {
    pub fn from_rows(rows: impl IntoIterator<Item = TemplateRow>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn get(&self, id: TemplateRowId) -> Result<&TemplateRow> {
        self.rows
            .get(&id)
            .ok_or(ScheduleError::TemplateRowNotFound(id))
    }

    /// Rows in template order
    pub fn list(&self) -> Vec<&TemplateRow> {
        let mut rows: Vec<_> = self.rows.values().collect();
        rows.sort_by_key(|r| (r.sequence_order, r.id));
        rows
    }

    /// Adds a row after the existing ones
    ///
    /// Predecessor rows must already exist, so rows can only point backward
    /// and the template stays acyclic.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        duration_days: u32,
        predecessor_row_ids: BTreeSet<TemplateRowId>,
    ) -> Result<TemplateRow> {
        if let Some(missing) = predecessor_row_ids
            .iter()
            .find(|id| !self.rows.contains_key(id))
        {
            return Err(ScheduleError::TemplateRowNotFound(*missing));
        }

        let id = self
            .rows
            .keys()
            .next_back()
            .map(|id| id.next())
            .unwrap_or(TemplateRowId::new(1));
        let sequence_order = self
            .rows
            .values()
            .map(|r| r.sequence_order)
            .max()
            .map(|n| n + 1)
            .unwrap_or(1);

        let row = TemplateRow {
            id,
            name: name.into().trim().to_string(),
            duration_days: duration_days.max(1),
            predecessor_row_ids,
            sequence_order,
        };
        self.rows.insert(id, row.clone());
        Ok(row)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateRow> {
        self.rows.values()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rows_in_order() {
        let mut library = TemplateLibrary::default();
        let slab = library.add("Slab", 3, BTreeSet::new()).unwrap();
        let frame = library
            .add("Frame", 5, BTreeSet::from([slab.id]))
            .unwrap();

        assert_eq!(frame.id, TemplateRowId::new(2));
        assert_eq!(frame.sequence_order, 2);
        assert_eq!(library.list().len(), 2);
        assert!(library.get(frame.id).unwrap().predecessor_row_ids.contains(&slab.id));
    }

    #[test]
    fn unknown_predecessor_row_rejected() {
        let mut library = TemplateLibrary::default();
        let result = library.add("Frame", 5, BTreeSet::from([TemplateRowId::new(7)]));
        assert!(matches!(result, Err(ScheduleError::TemplateRowNotFound(_))));
        assert!(library.is_empty());
    }
}
