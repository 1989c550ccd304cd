use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub platform: Platform,
    pub handle: String,
    pub status: AccountStatus,
    pub proxy: Option<String>,
    /// IANA timezone name used to decide which quota day an action falls on.
    pub timezone: String,
    #[serde(with = "serde_bytes")]
    pub credentials_sealed: Vec<u8>,
    pub rate_limited_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    Instagram,
    Pinterest,
    Reddit,
    X,
    Whatsapp,
    Facebook,
    Linkedin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Disabled,
    RateLimited,
}

impl Account {
    pub fn new(
        tenant_id: Uuid,
        platform: Platform,
        handle: String,
        timezone: String,
        proxy: Option<String>,
        credentials_sealed: Vec<u8>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            platform,
            handle,
            status: AccountStatus::Active,
            proxy,
            timezone,
            credentials_sealed,
            rate_limited_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Disabled accounts never receive new work; rate-limited ones may queue
    /// work that runs once their cool-down clears.
    pub fn accepts_work(&self) -> bool {
        self.status != AccountStatus::Disabled
    }
}
