//! Mark catalog: marks grouped by `(group, name)` with duration statistics

use super::{CategoryIndex, Document, FrameList};
use crate::capture::Record;
use serde::Serialize;
use std::borrow::Cow;

/// Every mark sharing one group and name
#[derive(Debug, Clone, Serialize)]
pub struct MarkCatalog {
    pub group: String,
    pub name: String,
    pub count: usize,
    /// Durations in nanoseconds
    pub min: i64,
    pub max: i64,
    pub average: i64,
    pub median: i64,
    #[serde(skip)]
    marks: CategoryIndex,
}

impl MarkCatalog {
    /// Positions of the catalogued marks
    #[must_use]
    pub fn index(&self) -> &CategoryIndex {
        &self.marks
    }
}

/// Catalogs of one group, names in alphabetical order
#[derive(Debug, Clone, Serialize)]
pub struct MarkGroup {
    pub group: String,
    pub entries: Vec<MarkCatalog>,
}

impl Document {
    /// Marks grouped by group, then name, both alphabetical
    #[must_use]
    pub fn catalog_marks(&self) -> Vec<MarkGroup> {
        self.mark_groups
            .iter()
            .map(|(group, names)| MarkGroup {
                group: group.clone(),
                entries: names
                    .iter()
                    .map(|(name, marks)| self.catalog(group, name, marks))
                    .collect(),
            })
            .collect()
    }

    /// Mark group names in alphabetical order
    pub fn mark_groups(&self) -> impl Iterator<Item = &str> {
        self.mark_groups.keys().map(String::as_str)
    }

    /// Every mark in `group`, in time order
    #[must_use]
    pub fn marks_by_group(&self, group: &str) -> FrameList<'_> {
        let index = self
            .mark_groups
            .get(group)
            .map(|names| names.values().fold(CategoryIndex::new(), |all, idx| all.union(idx)))
            .unwrap_or_default();
        FrameList::new(self, Cow::Owned(index))
    }

    fn catalog(&self, group: &str, name: &str, marks: &CategoryIndex) -> MarkCatalog {
        let mut durations: Vec<i64> = marks
            .iter()
            .filter_map(|position| match self.frame(position)?.record {
                Record::Mark(mark) => Some(mark.duration),
                _ => None,
            })
            .collect();
        durations.sort_unstable();

        let count = durations.len();
        let (min, max, average, median) = if count == 0 {
            (0, 0, 0, 0)
        } else {
            let total: i128 = durations.iter().map(|&d| i128::from(d)).sum();
            let average = i64::try_from(total / count as i128).unwrap_or(i64::MAX);
            (durations[0], durations[count - 1], average, durations[count / 2])
        };

        MarkCatalog {
            group: group.to_string(),
            name: name.to_string(),
            count,
            min,
            max,
            average,
            median,
            marks: marks.clone(),
        }
    }
}
