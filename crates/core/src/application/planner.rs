//! Action Planner - decides which remote mutations an audience row needs
//!
//! Compares the checksums stored with the row against freshly computed ones.
//! An empty action set means the row is unchanged and gets no job.

use super::checksum::ChecksumEngine;
use crate::domain::{Action, Audience};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use tracing::debug;

/// What the table remembers about the last successful sync of a row
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredState<'a> {
    pub content_checksum: Option<&'a str>,
    pub shares_checksum: Option<&'a str>,
    pub last_synced: Option<DateTime<Utc>>,
}

pub struct ActionPlanner {
    checksums: ChecksumEngine,
    refresh_after: Option<Duration>,
}

impl Default for ActionPlanner {
    fn default() -> Self {
        Self::new(ChecksumEngine::new())
    }
}

impl ActionPlanner {
    pub fn new(checksums: ChecksumEngine) -> Self {
        Self {
            checksums,
            refresh_after: None,
        }
    }

    /// Also emit UPDATE for unchanged rows last synced longer ago than `days`
    pub fn with_refresh_after_days(mut self, days: Option<i64>) -> Self {
        self.refresh_after = days.map(Duration::days);
        self
    }

    pub fn checksums(&self) -> &ChecksumEngine {
        &self.checksums
    }

    /// Plan from stored checksums only
    pub fn plan_actions(
        &self,
        stored_content_checksum: Option<&str>,
        stored_shares_checksum: Option<&str>,
        audience: &Audience,
    ) -> BTreeSet<Action> {
        let stored = StoredState {
            content_checksum: stored_content_checksum,
            shares_checksum: stored_shares_checksum,
            last_synced: None,
        };
        self.plan(&stored, audience, Utc::now())
    }

    /// Plan from stored checksums and record age
    pub fn plan(
        &self,
        stored: &StoredState<'_>,
        audience: &Audience,
        now: DateTime<Utc>,
    ) -> BTreeSet<Action> {
        let mut actions = BTreeSet::new();
        let stored_content = stored.content_checksum.filter(|c| !c.is_empty());

        match stored_content {
            None => {
                actions.insert(Action::Create);
            }
            Some(stored_content) => {
                if stored_content != self.checksums.content_checksum(audience)
                    || self.is_stale(stored.last_synced, now)
                {
                    actions.insert(Action::Update);
                }
            }
        }

        let shares_changed = match stored.shares_checksum.filter(|c| !c.is_empty()) {
            // Nothing stored yet: only an actual share list needs pushing
            None => !audience.shares.is_empty(),
            Some(stored_shares) => stored_shares != self.checksums.shares_checksum(audience),
        };
        if shares_changed {
            actions.insert(Action::UpdateShares);
        }

        debug!(
            audience = %audience.name,
            actions = ?actions,
            "Planned audience actions"
        );
        actions
    }

    fn is_stale(&self, last_synced: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match (self.refresh_after, last_synced) {
            (Some(window), Some(synced)) => now - synced > window,
            _ => false,
        }
    }
}
