//! Activity store: latest "now playing" text per user, last write wins.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::models::{normalize_activity, ActivityRecord, ServerEvent, UserId, IDLE, MAX_ACTIVITY_LEN};
use crate::services::fanout::BroadcastFanout;

/// Every accepted update is broadcast as `activity_changed`, even when the
/// text did not change.
#[derive(Clone)]
pub struct ActivityStore {
    records: Arc<RwLock<HashMap<UserId, ActivityRecord>>>,
    fanout: BroadcastFanout,
}

impl ActivityStore {
    pub fn new(fanout: BroadcastFanout) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            fanout,
        }
    }

    /// Store `text` if `at` is strictly newer than the current record, then
    /// broadcast the user's effective activity. Returns that record.
    #[instrument(skip(self, text))]
    pub async fn set_activity(
        &self,
        user_id: &UserId,
        text: &str,
        at: DateTime<Utc>,
    ) -> AppResult<ActivityRecord> {
        if text.chars().count() > MAX_ACTIVITY_LEN {
            return Err(AppError::InvalidMessage("activity text is too long".to_string()));
        }
        let text = normalize_activity(text);

        // The write guard is held through the broadcast so peers receive
        // one user's updates in the order the store applied them.
        let mut records = self.records.write().await;
        let effective = match records.get_mut(user_id) {
            Some(current) if current.updated_at >= at => {
                debug!(user_id = %user_id, "stale activity update ignored");
                current.clone()
            }
            Some(current) => {
                current.activity_text = text.to_string();
                current.updated_at = at;
                current.clone()
            }
            None => {
                let record = ActivityRecord {
                    user_id: user_id.clone(),
                    activity_text: text.to_string(),
                    updated_at: at,
                };
                records.insert(user_id.clone(), record.clone());
                record
            }
        };

        self.fanout
            .broadcast(ServerEvent::activity_changed(
                effective.user_id.clone(),
                effective.activity_text.clone(),
            ))
            .await;
        drop(records);
        Ok(effective)
    }

    /// Update stamped with the current time.
    pub async fn set_activity_now(&self, user_id: &UserId, text: &str) -> AppResult<ActivityRecord> {
        self.set_activity(user_id, text, Utc::now()).await
    }

    /// Current activity, `"Idle"` when nothing was reported.
    pub async fn get_activity(&self, user_id: &UserId) -> String {
        self.records
            .read()
            .await
            .get(user_id)
            .map(|r| r.activity_text.clone())
            .unwrap_or_else(|| IDLE.to_string())
    }

    /// Read guard over every record. While it is held no update can be
    /// applied or broadcast.
    pub(crate) async fn records(&self) -> RwLockReadGuard<'_, HashMap<UserId, ActivityRecord>> {
        self.records.read().await
    }
}
