//! Durable write-behind sink behind the in-memory entity cache.
//!
//! Out of scope in depth per spec section 1; this is the minimal interface
//! [`crate::core::cache::EntityCache`] needs. Backed by `sea-orm` against
//! sqlite by default (teacher's `sea-orm` + `sqlite` feature combination).

pub mod entities;
pub mod migration;

use sea_orm::{ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set};

use crate::core::types::{ApiKey, Channel, Group, PriceEntry, RelayLog, Setting};
use crate::utils::error::Result;
use entities::kv::{ActiveModel as KvActiveModel, Column as KvColumn, Entity as Kv};
use entities::relay_log::{ActiveModel as LogActiveModel, Entity as LogEntity};

mod ns {
    pub const CHANNEL: &str = "channel";
    pub const GROUP: &str = "group";
    pub const API_KEY: &str = "api_key";
    pub const SETTING: &str = "setting";
    pub const PRICE: &str = "price";
}

#[derive(Clone)]
pub struct Storage {
    db: DatabaseConnection,
}

impl Storage {
    pub async fn connect(url: &str) -> Result<Self> {
        let db = Database::connect(url).await?;
        migration::run(&db).await?;
        Ok(Self { db })
    }

    async fn put(&self, namespace: &str, key: &str, value: impl serde::Serialize) -> Result<()> {
        let value_json = serde_json::to_string(&value)?;
        let existing = Kv::find()
            .filter(KvColumn::Namespace.eq(namespace))
            .filter(KvColumn::Key.eq(key))
            .one(&self.db)
            .await?;
        let model = KvActiveModel {
            namespace: Set(namespace.to_string()),
            key: Set(key.to_string()),
            value_json: Set(value_json),
        };
        if existing.is_some() {
            model.update(&self.db).await?;
        } else {
            model.insert(&self.db).await?;
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        Kv::delete_many()
            .filter(KvColumn::Namespace.eq(namespace))
            .filter(KvColumn::Key.eq(key))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list<T: serde::de::DeserializeOwned>(&self, namespace: &str) -> Result<Vec<T>> {
        let rows = Kv::find().filter(KvColumn::Namespace.eq(namespace)).all(&self.db).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| serde_json::from_str(&r.value_json).ok())
            .collect())
    }

    pub async fn list_channels(&self) -> Result<Vec<Channel>> {
        self.list(ns::CHANNEL).await
    }

    pub async fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        self.put(ns::CHANNEL, &channel.id.to_string(), channel).await
    }

    pub async fn delete_channel(&self, id: i64) -> Result<()> {
        self.delete(ns::CHANNEL, &id.to_string()).await
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.list(ns::GROUP).await
    }

    pub async fn upsert_group(&self, group: &Group) -> Result<()> {
        self.put(ns::GROUP, &group.id.to_string(), group).await
    }

    pub async fn delete_group(&self, id: i64) -> Result<()> {
        self.delete(ns::GROUP, &id.to_string()).await
    }

    pub async fn list_api_keys(&self) -> Result<Vec<ApiKey>> {
        self.list(ns::API_KEY).await
    }

    pub async fn upsert_api_key(&self, key: &ApiKey) -> Result<()> {
        self.put(ns::API_KEY, &key.key, key).await
    }

    pub async fn delete_api_key(&self, key: &str) -> Result<()> {
        self.delete(ns::API_KEY, key).await
    }

    pub async fn list_settings(&self) -> Result<Vec<Setting>> {
        self.list(ns::SETTING).await
    }

    pub async fn upsert_setting(&self, setting: &Setting) -> Result<()> {
        self.put(ns::SETTING, &setting.key, setting).await
    }

    pub async fn list_price_entries(&self) -> Result<Vec<PriceEntry>> {
        self.list(ns::PRICE).await
    }

    pub async fn upsert_price_entry(&self, entry: &PriceEntry) -> Result<()> {
        let key = match entry.channel_id {
            Some(channel_id) => format!("{}:{}", entry.model, channel_id),
            None => entry.model.clone(),
        };
        self.put(ns::PRICE, &key, entry).await
    }

    /// Batch append, called by the monitoring ring buffer flush.
    pub async fn append_relay_logs(&self, logs: &[RelayLog]) -> Result<()> {
        for log in logs {
            let record_json = serde_json::to_string(log)?;
            LogActiveModel {
                id: sea_orm::ActiveValue::NotSet,
                timestamp: Set(log.timestamp),
                channel_id: Set(log.channel_id),
                record_json: Set(record_json),
            }
            .insert(&self.db)
            .await?;
        }
        Ok(())
    }

    pub async fn recent_relay_logs(&self, limit: u64) -> Result<Vec<RelayLog>> {
        use sea_orm::QueryOrder;
        let rows = LogEntity::find()
            .order_by_desc(entities::relay_log::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().filter_map(|r| serde_json::from_str(&r.record_json).ok()).collect())
    }
}
