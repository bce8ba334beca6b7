use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A certificate-authenticated member of exactly one tenant.
///
/// `subject` is the normalized certificate subject and is unique across all
/// tenants. It is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUser {
    pub id: String,
    pub tenant_id: String,
    pub subject: String,
    pub common_name: String,
    pub email: Option<String>,
    pub role_id: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantUser {
    pub fn apply(&mut self, update: UserUpdate, now: DateTime<Utc>) {
        if let Some(common_name) = update.common_name {
            self.common_name = common_name;
        }
        if let Some(email) = update.email {
            self.email = Some(email);
        }
        if let Some(role_id) = update.role_id {
            self.role_id = role_id;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub common_name: Option<String>,
    pub email: Option<String>,
    pub role_id: Option<String>,
    pub is_active: Option<bool>,
}
