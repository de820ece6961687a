// src/notify/mod.rs
pub mod slack;

use chrono::{DateTime, Utc};

use crate::types::Item;

/// One run's aggregated delta, shaped for delivery: items sorted newest
/// first and grouped by source display name.
#[derive(Debug, Clone)]
pub struct Digest {
    pub groups: Vec<SourceGroup>,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct SourceGroup {
    pub source_name: String,
    pub items: Vec<Item>,
}

impl Digest {
    /// Sort newest first (undated items sink to the end), then group by
    /// source display name preserving the order sources first appear.
    pub fn from_items(mut items: Vec<Item>) -> Self {
        let total = items.len();
        items.sort_by_key(|it| {
            std::cmp::Reverse(it.published_at.unwrap_or(DateTime::<Utc>::MIN_UTC))
        });

        let mut groups: Vec<SourceGroup> = Vec::new();
        for item in items {
            match groups.iter_mut().find(|g| g.source_name == item.source_name) {
                Some(group) => group.items.push(item),
                None => groups.push(SourceGroup {
                    source_name: item.source_name.clone(),
                    items: vec![item],
                }),
            }
        }
        Self { groups, total }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
