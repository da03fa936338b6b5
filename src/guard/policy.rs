//! Allow-list and threshold rules.

use std::collections::HashSet;

/// Which groups the guard acts in.
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    allowed: HashSet<String>,
}

impl GroupFilter {
    /// An empty list admits every group.
    pub fn new<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: groups.into_iter().map(Into::into).collect(),
        }
    }

    pub fn admits(&self, group_id: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(group_id)
    }

    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// Group max minus tolerance. Not clamped: a large tolerance goes negative.
pub fn effective_max(max_count: u64, fault_tolerance: u64) -> i64 {
    i64::try_from(max_count)
        .unwrap_or(i64::MAX)
        .saturating_sub(i64::try_from(fault_tolerance).unwrap_or(i64::MAX))
}

/// The bot has caught up with the group's most active poster.
pub fn should_suppress(bot_count: u64, max_count: u64, fault_tolerance: u64) -> bool {
    let bot = i64::try_from(bot_count).unwrap_or(i64::MAX);
    bot >= effective_max(max_count, fault_tolerance)
}
