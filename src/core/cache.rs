//! In-memory entity cache: channels, groups, API keys, settings.
//!
//! The durable store (`storage::entities`, out of scope per spec section 1
//! beyond its interface) is a write-behind sink: every mutation here also
//! writes through to storage, and readers never touch storage directly.
//! Modeled on the teacher's `dashmap`-backed caches in `services::pricing`.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rand::Rng;
use rand::distributions::{Alphanumeric, WeightedIndex};
use rand::prelude::*;

use crate::core::pricing::PriceTable;
use crate::core::types::{ApiKey, Channel, Group, GroupItem, SelectionMode, Setting};
use crate::storage::Storage;
use crate::utils::error::{GatewayError, Result};

pub struct EntityCache {
    channels: DashMap<i64, Channel>,
    groups: DashMap<i64, Group>,
    api_keys: DashMap<String, ApiKey>,
    settings: DashMap<String, String>,
    round_robin_cursors: DashMap<i64, AtomicU64>,
    pub prices: PriceTable,
    storage: Storage,
}

impl EntityCache {
    pub async fn load(storage: Storage) -> Result<Self> {
        let channels = DashMap::new();
        for c in storage.list_channels().await? {
            channels.insert(c.id, c);
        }
        let groups = DashMap::new();
        for g in storage.list_groups().await? {
            groups.insert(g.id, g);
        }
        let api_keys = DashMap::new();
        for k in storage.list_api_keys().await? {
            api_keys.insert(k.key.clone(), k);
        }
        let settings = DashMap::new();
        for s in storage.list_settings().await? {
            settings.insert(s.key, s.value);
        }
        let prices = PriceTable::new();
        prices.load_all(&storage.list_price_entries().await?);

        Ok(Self {
            channels,
            groups,
            api_keys,
            settings,
            round_robin_cursors: DashMap::new(),
            prices,
            storage,
        })
    }

    pub fn channel(&self, id: i64) -> Option<Channel> {
        self.channels.get(&id).map(|c| c.clone())
    }

    pub async fn put_channel(&self, channel: Channel) -> Result<()> {
        self.storage.upsert_channel(&channel).await?;
        self.reconcile_channel_models(&channel);
        self.channels.insert(channel.id, channel);
        Ok(())
    }

    pub async fn delete_channel(&self, id: i64) -> Result<()> {
        self.storage.delete_channel(id).await?;
        self.channels.remove(&id);
        Ok(())
    }

    pub fn list_channels(&self) -> Vec<Channel> {
        self.channels.iter().map(|e| e.value().clone()).collect()
    }

    /// `[SUPPLEMENT]` — auto-creates a price entry for every model newly
    /// declared by this channel and removes zero-priced entries for models
    /// no longer declared, mirroring `helper/price.go`.
    pub fn reconcile_channel_models(&self, channel: &Channel) {
        for model in channel.all_models() {
            self.prices.ensure_channel_model(model, channel.id);
        }
        if let Some(previous) = self.channels.get(&channel.id) {
            let now: std::collections::HashSet<&str> = channel.all_models().collect();
            for model in previous.all_models() {
                if !now.contains(model) {
                    self.prices.remove_if_zero(model, channel.id);
                }
            }
        }
    }

    /// Group lookup by logical model name. Exact match on group name first
    /// (spec treats a group as owning one logical model), falling back to
    /// the group's match regex if one is configured.
    pub fn group_for_model(&self, model: &str) -> Option<Group> {
        if let Some(g) = self.groups.iter().find(|g| g.name == model) {
            return Some(g.clone());
        }
        self.groups
            .iter()
            .filter_map(|g| {
                let re = g.match_regex.as_deref()?;
                let compiled = regex::Regex::new(re).ok()?;
                compiled.is_match(model).then(|| g.clone())
            })
            .next()
    }

    pub async fn put_group(&self, group: Group) -> Result<()> {
        self.storage.upsert_group(&group).await?;
        self.groups.insert(group.id, group);
        Ok(())
    }

    pub async fn delete_group(&self, id: i64) -> Result<()> {
        self.storage.delete_group(id).await?;
        self.groups.remove(&id);
        Ok(())
    }

    pub fn list_groups(&self) -> Vec<Group> {
        self.groups.iter().map(|e| e.value().clone()).collect()
    }

    /// Select one item per spec section 4.7, excluding items whose channel
    /// is disabled or absent.
    pub fn select_item<'a>(&self, group: &'a Group) -> Option<&'a GroupItem> {
        let eligible: Vec<&GroupItem> = group
            .items
            .iter()
            .filter(|item| self.channel(item.channel_id).map(|c| c.enabled).unwrap_or(false))
            .collect();
        if eligible.is_empty() {
            return None;
        }
        match group.mode {
            SelectionMode::Priority => {
                eligible.into_iter().min_by_key(|item| item.priority)
            }
            SelectionMode::Weighted => {
                let weights: Vec<u32> = eligible.iter().map(|i| i.weight.max(1)).collect();
                let dist = WeightedIndex::new(&weights).ok()?;
                let idx = dist.sample(&mut rand::thread_rng());
                eligible.into_iter().nth(idx)
            }
            SelectionMode::RoundRobin => {
                let cursor = self.round_robin_cursors.entry(group.id).or_insert_with(|| AtomicU64::new(0));
                let idx = cursor.fetch_add(1, Ordering::SeqCst) as usize % eligible.len();
                eligible.into_iter().nth(idx)
            }
        }
    }

    /// `next` after a failed attempt: first eligible item strictly after
    /// `current` in the group's item order, or `None` once exhausted.
    pub fn next_item<'a>(&self, group: &'a Group, current: &GroupItem) -> Option<&'a GroupItem> {
        let pos = group
            .items
            .iter()
            .position(|i| i.channel_id == current.channel_id && i.upstream_model == current.upstream_model)?;
        group.items[pos + 1..]
            .iter()
            .find(|item| self.channel(item.channel_id).map(|c| c.enabled).unwrap_or(false))
    }

    pub fn api_key(&self, key: &str) -> Option<ApiKey> {
        self.api_keys.get(key).map(|k| k.clone())
    }

    pub async fn put_api_key(&self, key: ApiKey) -> Result<()> {
        self.storage.upsert_api_key(&key).await?;
        self.api_keys.insert(key.key.clone(), key);
        Ok(())
    }

    pub async fn delete_api_key(&self, key: &str) -> Result<()> {
        self.storage.delete_api_key(key).await?;
        self.api_keys.remove(key);
        Ok(())
    }

    pub fn list_api_keys(&self) -> Vec<ApiKey> {
        self.api_keys.iter().map(|e| e.value().clone()).collect()
    }

    /// Generates `sk-<app>-<random>` and stores a fresh key record.
    pub async fn create_api_key(&self, app_name: &str, id: i64) -> Result<ApiKey> {
        let random: String = rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
        let key = ApiKey {
            id,
            key: format!("sk-{app_name}-{random}"),
            enabled: true,
            expire_at: 0,
            max_cost: 0.0,
            consumed_cost: 0.0,
            allowed_models: vec![],
        };
        self.put_api_key(key.clone()).await?;
        Ok(key)
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.settings.get(key).map(|v| v.clone())
    }

    pub async fn put_setting(&self, setting: Setting) -> Result<()> {
        self.storage.upsert_setting(&setting).await?;
        self.settings.insert(setting.key, setting.value);
        Ok(())
    }

    pub fn list_settings(&self) -> Vec<Setting> {
        self.settings.iter().map(|e| Setting { key: e.key().clone(), value: e.value().clone() }).collect()
    }

    /// `[SUPPLEMENT]` auto-grouping: for every enabled channel with
    /// `auto_group` set, make sure each model it declares is routable
    /// through a same-named group pointing back at that channel, mirroring
    /// `original_source/internal/task/channel.go`'s periodic sync.
    pub async fn sync_auto_groups(&self) -> Result<()> {
        let channels: Vec<Channel> = self.channels.iter().filter(|c| c.auto_group).map(|c| c.clone()).collect();
        for channel in channels {
            for model in channel.all_models() {
                self.ensure_auto_group(model, &channel).await?;
            }
        }
        Ok(())
    }

    async fn ensure_auto_group(&self, model: &str, channel: &Channel) -> Result<()> {
        if let Some(mut group) = self.groups.iter().find(|g| g.name == model).map(|g| g.clone()) {
            let already_routed = group.items.iter().any(|i| i.channel_id == channel.id && i.upstream_model == model);
            if already_routed {
                return Ok(());
            }
            group.items.push(GroupItem {
                channel_id: channel.id,
                upstream_model: model.to_string(),
                priority: group.items.len() as i32,
                weight: 1,
            });
            return self.put_group(group).await;
        }

        let next_id = self.groups.iter().map(|g| *g.key()).max().unwrap_or(0) + 1;
        let group = Group {
            id: next_id,
            name: model.to_string(),
            match_regex: None,
            mode: SelectionMode::Priority,
            items: vec![GroupItem { channel_id: channel.id, upstream_model: model.to_string(), priority: 0, weight: 1 }],
        };
        self.put_group(group).await
    }
}

pub fn model_not_found(model: &str) -> GatewayError {
    GatewayError::model_not_found(model)
}
