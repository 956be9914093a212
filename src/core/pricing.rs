//! Price table and cost computation (spec section 4.2).
//!
//! Grounded on `original_source/internal/helper/price.go`: entries are
//! auto-created the first time a channel declares a model and removed when
//! a model leaves a channel's list with no recorded price. The table itself
//! is an immutable snapshot swapped atomically on refresh, matching the
//! teacher's `services::pricing` pattern (`parking_lot`/background refresh)
//! but using `arc-swap` so readers never block a writer mid-refresh.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::warn;

use crate::core::types::{PriceEntry, Usage};

#[derive(Debug, Clone, Copy, Default)]
pub struct Price {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

#[derive(Default)]
struct PriceSnapshot {
    /// `(model, channel_id) -> price`.
    per_channel: HashMap<(String, i64), Price>,
    /// `model -> price`, the fallback when no per-channel override exists.
    global: HashMap<String, Price>,
}

/// Process-wide price table, readable without locking via an immutable
/// snapshot swapped on refresh or on individual entry mutation.
pub struct PriceTable {
    snapshot: ArcSwap<PriceSnapshot>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceTable {
    pub fn new() -> Self {
        Self { snapshot: ArcSwap::from_pointee(PriceSnapshot::default()) }
    }

    pub fn load_all(&self, entries: &[PriceEntry]) {
        let mut next = PriceSnapshot::default();
        for e in entries {
            let price = Price {
                input: e.input,
                output: e.output,
                cache_read: e.cache_read,
                cache_write: e.cache_write,
            };
            match e.channel_id {
                Some(channel_id) => {
                    next.per_channel.insert((e.model.clone(), channel_id), price);
                }
                None => {
                    next.global.insert(e.model.clone(), price);
                }
            }
        }
        self.snapshot.store(Arc::new(next));
    }

    /// `price(model, channel)`: per-(model,channel) override, else global
    /// `(model)` price, else `None` (caller should warn and charge zero).
    pub fn price(&self, model: &str, channel_id: i64) -> Option<Price> {
        let snap = self.snapshot.load();
        if let Some(p) = snap.per_channel.get(&(model.to_string(), channel_id)) {
            return Some(*p);
        }
        snap.global.get(model).copied()
    }

    pub fn upsert(&self, entry: &PriceEntry) {
        let mut next = (**self.snapshot.load()).clone_snapshot();
        let price = Price {
            input: entry.input,
            output: entry.output,
            cache_read: entry.cache_read,
            cache_write: entry.cache_write,
        };
        match entry.channel_id {
            Some(channel_id) => {
                next.per_channel.insert((entry.model.clone(), channel_id), price);
            }
            None => {
                next.global.insert(entry.model.clone(), price);
            }
        }
        self.snapshot.store(Arc::new(next));
    }

    /// `original_source/internal/helper/price.go`'s `LLMPriceAddToDB`:
    /// auto-create a zero-priced entry the first time a channel declares a
    /// model, so the entry exists for an operator to fill in later.
    pub fn ensure_channel_model(&self, model: &str, channel_id: i64) {
        let exists = self
            .snapshot
            .load()
            .per_channel
            .contains_key(&(model.to_string(), channel_id));
        if !exists {
            self.upsert(&PriceEntry {
                model: model.to_string(),
                channel_id: Some(channel_id),
                input: 0.0,
                output: 0.0,
                cache_read: 0.0,
                cache_write: 0.0,
            });
        }
    }

    /// `LLMPriceDeleteFromDBWithNoPrice`: drop an override that was
    /// auto-created but never priced, once the model leaves the channel.
    pub fn remove_if_zero(&self, model: &str, channel_id: i64) {
        let mut next = (**self.snapshot.load()).clone_snapshot();
        let key = (model.to_string(), channel_id);
        if let Some(p) = next.per_channel.get(&key)
            && p.input == 0.0
            && p.output == 0.0
            && p.cache_read == 0.0
            && p.cache_write == 0.0
        {
            next.per_channel.remove(&key);
            self.snapshot.store(Arc::new(next));
        }
    }
}

impl PriceSnapshot {
    fn clone_snapshot(&self) -> PriceSnapshot {
        PriceSnapshot { per_channel: self.per_channel.clone(), global: self.global.clone() }
    }
}

/// Result of §4.2's cost formula.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.input_cost + self.output_cost
    }
}

/// `model`/`channel_id` identify the price lookup; `usage` carries the
/// provider-reported token counts and the `anthropic_usage` discriminator.
pub fn compute_cost(table: &PriceTable, model: &str, channel_id: i64, usage: &Usage) -> CostBreakdown {
    let Some(price) = table.price(model, channel_id) else {
        warn!(model, channel_id, "no price entry for model/channel, charging zero cost");
        return CostBreakdown::default();
    };

    let cached = usage.prompt_tokens_details.as_ref().map(|d| d.cached_tokens).unwrap_or(0) as f64;
    let prompt = usage.prompt_tokens as f64;
    let completion = usage.completion_tokens as f64;
    let output_cost = completion * price.output * 1e-6;

    if usage.anthropic_usage {
        let cache_creation = usage.cache_creation_input_tokens as f64;
        let normal = (prompt - cached - cache_creation).max(0.0);
        let input_cost =
            (normal * price.input + cached * price.cache_read + cache_creation * price.cache_write) * 1e-6;
        CostBreakdown { input_cost, output_cost }
    } else {
        let input_cost = (cached * price.cache_read + (prompt - cached) * price.input) * 1e-6;
        CostBreakdown { input_cost, output_cost }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PromptTokensDetails;

    fn price_table_with(model: &str, channel_id: i64, p: Price) -> PriceTable {
        let table = PriceTable::new();
        table.upsert(&PriceEntry {
            model: model.to_string(),
            channel_id: Some(channel_id),
            input: p.input,
            output: p.output,
            cache_read: p.cache_read,
            cache_write: p.cache_write,
        });
        table
    }

    #[test]
    fn anthropic_usage_cost_matches_spec_example() {
        let table = price_table_with(
            "claude-x",
            1,
            Price { input: 1.0, output: 2.0, cache_read: 0.1, cache_write: 1.5 },
        );
        let usage = Usage {
            prompt_tokens: 1000,
            completion_tokens: 500,
            total_tokens: 1500,
            prompt_tokens_details: Some(PromptTokensDetails { cached_tokens: 400 }),
            cache_creation_input_tokens: 100,
            anthropic_usage: true,
        };
        let cost = compute_cost(&table, "claude-x", 1, &usage);
        assert!((cost.input_cost - 6.9e-4).abs() < 1e-12);
        assert!((cost.output_cost - 1e-3).abs() < 1e-12);
        assert!((cost.total() - 1.69e-3).abs() < 1e-12);
    }

    #[test]
    fn non_anthropic_usage_uses_two_way_split() {
        let table = price_table_with(
            "gpt-x",
            1,
            Price { input: 2.0, output: 4.0, cache_read: 0.5, cache_write: 0.0 },
        );
        let usage = Usage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
            prompt_tokens_details: Some(PromptTokensDetails { cached_tokens: 20 }),
            cache_creation_input_tokens: 0,
            anthropic_usage: false,
        };
        let cost = compute_cost(&table, "gpt-x", 1, &usage);
        // (20*0.5 + 80*2.0) * 1e-6 = 170e-6
        assert!((cost.input_cost - 170e-6).abs() < 1e-12);
        assert!((cost.output_cost - 200e-6).abs() < 1e-12);
    }

    #[test]
    fn missing_price_entry_charges_zero() {
        let table = PriceTable::new();
        let cost = compute_cost(&table, "unknown", 1, &Usage::default());
        assert_eq!(cost, CostBreakdown::default());
    }

    #[test]
    fn global_fallback_used_when_no_channel_override() {
        let table = PriceTable::new();
        table.upsert(&PriceEntry {
            model: "gpt-x".into(),
            channel_id: None,
            input: 1.0,
            output: 1.0,
            cache_read: 0.0,
            cache_write: 0.0,
        });
        let usage = Usage { prompt_tokens: 10, completion_tokens: 0, total_tokens: 10, ..Default::default() };
        let cost = compute_cost(&table, "gpt-x", 99, &usage);
        assert!((cost.input_cost - 10e-6).abs() < 1e-12);
    }

    #[test]
    fn ensure_channel_model_is_idempotent_and_zero_priced() {
        let table = PriceTable::new();
        table.ensure_channel_model("gpt-x", 1);
        table.ensure_channel_model("gpt-x", 1);
        assert_eq!(table.price("gpt-x", 1).unwrap().input, 0.0);
    }
}
