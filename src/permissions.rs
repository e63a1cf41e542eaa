//! Channel permission checks for the HTTP API.

use async_trait::async_trait;

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// May the user read posts in the channel?
    async fn can_read_channel(&self, user_id: &str, channel_id: &str) -> bool;

    /// May the user change the channel's settings?
    async fn can_manage_channel(&self, user_id: &str, channel_id: &str) -> bool;
}

/// Permissions from configuration: every authenticated user can read, and
/// channel management is limited to the configured admins. An empty admin
/// list lets everyone manage.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPermissions {
    admin_user_ids: Vec<String>,
}

impl ConfiguredPermissions {
    pub fn new(admin_user_ids: Vec<String>) -> Self {
        Self { admin_user_ids }
    }
}

#[async_trait]
impl PermissionChecker for ConfiguredPermissions {
    async fn can_read_channel(&self, user_id: &str, _channel_id: &str) -> bool {
        !user_id.is_empty()
    }

    async fn can_manage_channel(&self, user_id: &str, _channel_id: &str) -> bool {
        if user_id.is_empty() {
            return false;
        }
        self.admin_user_ids.is_empty() || self.admin_user_ids.iter().any(|id| id == user_id)
    }
}
