// Remarketing API Port
// Remote advertising API collaborator (HTTP client, auth and paging live in adapters)

use crate::domain::PopulationRule;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote audience resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemarketingList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub life_span: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_population_rule: Option<PopulationRule>,
}

/// Sharing resource of a remote audience
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemarketingListShares {
    pub remarketing_list_id: String,
    #[serde(default)]
    pub shared_account_ids: Vec<String>,
    #[serde(default)]
    pub shared_advertiser_ids: Vec<String>,
}

/// Remote API errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Network/auth hiccup; safe to retry
    #[error("Transient API failure: {0}")]
    Transient(String),

    /// Rejected request (validation, permissions, ...)
    #[error("API rejected request: {0}")]
    Permanent(String),

    #[error("Remote resource not found: {0}")]
    NotFound(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }
}

/// Remarketing API trait
#[async_trait]
pub trait RemarketingApi: Send + Sync {
    /// All audiences of the configured account (paging handled by the adapter)
    async fn get_remarketing_lists(&self) -> Result<Vec<RemarketingList>, ApiError>;

    /// Create a list; the returned resource carries the assigned id
    async fn create_remarketing_list(
        &self,
        list: &RemarketingList,
    ) -> Result<RemarketingList, ApiError>;

    async fn update_remarketing_list(
        &self,
        list: &RemarketingList,
    ) -> Result<RemarketingList, ApiError>;

    async fn get_remarketing_list_shares(
        &self,
        list_id: &str,
    ) -> Result<RemarketingListShares, ApiError>;

    async fn update_remarketing_list_shares(
        &self,
        list_id: &str,
        shares: &RemarketingListShares,
    ) -> Result<RemarketingListShares, ApiError>;
}

// ============================================================================
// In-memory implementation (tests and sandbox daemon)
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::{Mutex, MutexGuard};

    #[derive(Default)]
    struct State {
        lists: BTreeMap<String, RemarketingList>,
        shares: BTreeMap<String, RemarketingListShares>,
        next_id: u64,
        transient_failures: usize,
        rejected_names: BTreeSet<String>,
        rejected_shares: BTreeSet<String>,
        mutation_calls: usize,
    }

    /// In-memory remarketing account
    ///
    /// Ids are assigned sequentially from 1000. Failures can be injected:
    /// a number of upcoming transient errors, or permanent rejection of
    /// specific list names / share updates.
    pub struct InMemoryRemarketingApi {
        state: Mutex<State>,
    }

    impl Default for InMemoryRemarketingApi {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryRemarketingApi {
        pub fn new() -> Self {
            Self {
                state: Mutex::new(State {
                    next_id: 1000,
                    ..State::default()
                }),
            }
        }

        fn lock(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Seed an existing list (id must be set)
        pub fn insert(&self, list: RemarketingList, shared_account_ids: Vec<String>) {
            let mut state = self.lock();
            let id = list.id.clone().unwrap_or_default();
            state.shares.insert(
                id.clone(),
                RemarketingListShares {
                    remarketing_list_id: id.clone(),
                    shared_account_ids,
                    shared_advertiser_ids: Vec::new(),
                },
            );
            state.lists.insert(id, list);
        }

        /// Make the next `count` calls fail with a transient error
        pub fn fail_transiently(&self, count: usize) {
            self.lock().transient_failures = count;
        }

        /// Permanently reject creates/updates of lists with this name
        pub fn reject_name(&self, name: impl Into<String>) {
            self.lock().rejected_names.insert(name.into());
        }

        /// Permanently reject share updates for this list id
        pub fn reject_shares(&self, list_id: impl Into<String>) {
            self.lock().rejected_shares.insert(list_id.into());
        }

        pub fn clear_rejections(&self) {
            let mut state = self.lock();
            state.rejected_names.clear();
            state.rejected_shares.clear();
        }

        pub fn list(&self, id: &str) -> Option<RemarketingList> {
            self.lock().lists.get(id).cloned()
        }

        pub fn shares(&self, id: &str) -> Option<RemarketingListShares> {
            self.lock().shares.get(id).cloned()
        }

        pub fn list_count(&self) -> usize {
            self.lock().lists.len()
        }

        /// Number of create/update calls received (including failed ones)
        pub fn mutation_calls(&self) -> usize {
            self.lock().mutation_calls
        }

        fn check_transient(state: &mut State) -> Result<(), ApiError> {
            if state.transient_failures > 0 {
                state.transient_failures -= 1;
                return Err(ApiError::Transient("backend unavailable".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemarketingApi for InMemoryRemarketingApi {
        async fn get_remarketing_lists(&self) -> Result<Vec<RemarketingList>, ApiError> {
            let mut state = self.lock();
            Self::check_transient(&mut state)?;
            Ok(state.lists.values().cloned().collect())
        }

        async fn create_remarketing_list(
            &self,
            list: &RemarketingList,
        ) -> Result<RemarketingList, ApiError> {
            let mut state = self.lock();
            state.mutation_calls += 1;
            Self::check_transient(&mut state)?;
            if state.rejected_names.contains(&list.name) {
                return Err(ApiError::Permanent(format!("invalid list '{}'", list.name)));
            }

            let id = state.next_id.to_string();
            state.next_id += 1;

            let mut created = list.clone();
            created.id = Some(id.clone());
            state.shares.insert(
                id.clone(),
                RemarketingListShares {
                    remarketing_list_id: id.clone(),
                    ..RemarketingListShares::default()
                },
            );
            state.lists.insert(id, created.clone());
            Ok(created)
        }

        async fn update_remarketing_list(
            &self,
            list: &RemarketingList,
        ) -> Result<RemarketingList, ApiError> {
            let mut state = self.lock();
            state.mutation_calls += 1;
            Self::check_transient(&mut state)?;
            if state.rejected_names.contains(&list.name) {
                return Err(ApiError::Permanent(format!("invalid list '{}'", list.name)));
            }

            let id = list
                .id
                .clone()
                .ok_or_else(|| ApiError::Permanent("update without id".to_string()))?;
            if !state.lists.contains_key(&id) {
                return Err(ApiError::NotFound(id));
            }
            state.lists.insert(id, list.clone());
            Ok(list.clone())
        }

        async fn get_remarketing_list_shares(
            &self,
            list_id: &str,
        ) -> Result<RemarketingListShares, ApiError> {
            let mut state = self.lock();
            Self::check_transient(&mut state)?;
            state
                .shares
                .get(list_id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(list_id.to_string()))
        }

        async fn update_remarketing_list_shares(
            &self,
            list_id: &str,
            shares: &RemarketingListShares,
        ) -> Result<RemarketingListShares, ApiError> {
            let mut state = self.lock();
            state.mutation_calls += 1;
            Self::check_transient(&mut state)?;
            if state.rejected_shares.contains(list_id) {
                return Err(ApiError::Permanent(format!(
                    "cannot share list {}",
                    list_id
                )));
            }
            if !state.lists.contains_key(list_id) {
                return Err(ApiError::NotFound(list_id.to_string()));
            }
            state.shares.insert(list_id.to_string(), shares.clone());
            Ok(shares.clone())
        }
    }
}
