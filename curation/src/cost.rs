//! Inference cost accounting.
//!
//! Every inference call is billed against an immutable [`PricingTable`]
//! injected at construction. Unknown model identifiers price at zero rather
//! than failing, and the running total only ever grows for the lifetime of
//! the owning stage.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::inference::Completion;

/// Rates are quoted per this many input/output units.
pub const UNITS_PER_RATE: f64 = 1_000_000.0;
/// Character-to-unit estimate used when a provider reports no usage.
pub const CHARS_PER_UNIT: f64 = 4.0;

/// Per-model input/output rates, in monetary units per million units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRates {
    pub input: f64,
    pub output: f64,
}

impl ModelRates {
    pub const ZERO: Self = Self {
        input: 0.0,
        output: 0.0,
    };
}

/// Immutable model-to-rate registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingTable {
    rates: HashMap<String, ModelRates>,
}

impl PricingTable {
    /// An empty table; every model prices at zero.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or replace a model's rates.
    pub fn with_rate(mut self, model: &str, input: f64, output: f64) -> Self {
        self.rates
            .insert(model.to_string(), ModelRates { input, output });
        self
    }

    /// Rates for a model; unknown identifiers are free.
    pub fn rate(&self, model: &str) -> ModelRates {
        self.rates.get(model).copied().unwrap_or(ModelRates::ZERO)
    }

    /// The stock price list for the providers the engine ships with.
    pub fn standard() -> Self {
        Self::default()
            .with_rate("gemini-3-pro-preview", 2.00, 12.00)
            .with_rate("gemini-3-flash-preview", 0.50, 3.00)
            .with_rate("gemini-2.5-pro", 1.25, 10.00)
            .with_rate("gemini-2.5-flash", 0.30, 2.50)
            .with_rate("gemini-2.5-flash-lite", 0.10, 0.40)
            .with_rate("gemini-2.0-flash", 0.10, 0.40)
            .with_rate("gemini-2.0-flash-lite", 0.075, 0.30)
            .with_rate("claude-opus-4-6", 5.00, 25.00)
    }
}

/// Running cost ledger for one stage.
#[derive(Debug, Clone)]
pub struct CostMeter {
    table: PricingTable,
    total: f64,
}

impl CostMeter {
    pub fn new(table: PricingTable) -> Self {
        Self { table, total: 0.0 }
    }

    /// Bill one call from explicit unit counts; returns the cost of the call.
    pub fn record(&mut self, model: &str, input_units: u64, output_units: u64) -> f64 {
        let rates = self.table.rate(model);
        let cost = (input_units as f64 / UNITS_PER_RATE * rates.input)
            + (output_units as f64 / UNITS_PER_RATE * rates.output);
        self.total += cost;
        cost
    }

    /// Bill one call from a completion, preferring provider-reported usage
    /// and falling back to a character-count estimate.
    pub fn record_completion(&mut self, model: &str, prompt: &str, completion: &Completion) -> f64 {
        match &completion.usage {
            Some(usage) => self.record(model, usage.input_units, usage.output_units),
            None => self.record(
                model,
                estimate_units(prompt),
                estimate_units(&completion.text),
            ),
        }
    }

    /// Accumulated cost; monotonically non-decreasing.
    pub fn total(&self) -> f64 {
        self.total
    }
}

/// Estimate billing units for text a provider did not meter.
pub fn estimate_units(text: &str) -> u64 {
    (text.chars().count() as f64 / CHARS_PER_UNIT).ceil() as u64
}
