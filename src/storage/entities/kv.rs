//! Flat key-value table backing the durable store.
//!
//! Spec section 1 scopes persistent storage out as "a relational store used
//! as a flat KV-by-primary-key — the core treats it as a durable sink behind
//! in-memory caches". Each entity kind gets its own `namespace`; the row key
//! is that entity's primary key stringified, and `value_json` is the whole
//! serialized record. [`crate::core::cache::EntityCache`] is the only
//! reader/writer of entity semantics; this table has none.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "kv_store")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub namespace: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub value_json: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
