use crate::cost::classifier::ModelClass;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Per-million-token rates for one model.
///
/// Cache reads and cache writes are both billed at the input rate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input: f64, output: f64) -> Self {
        Self {
            input_price_per_million: input,
            output_price_per_million: output,
        }
    }

    fn cost(tokens: u64, price_per_million: f64) -> f64 {
        (tokens as f64 / TOKENS_PER_MILLION) * price_per_million
    }

    pub fn calculate_cost(&self, usage: &TokenUsage) -> CostBreakdown {
        CostBreakdown {
            input: Self::cost(usage.input_tokens, self.input_price_per_million),
            output: Self::cost(usage.output_tokens, self.output_price_per_million),
            cache_read: Self::cost(usage.cache_read_tokens, self.input_price_per_million),
            cache_write: Self::cost(usage.cache_write_tokens, self.input_price_per_million),
        }
    }

    fn is_valid(&self) -> bool {
        self.input_price_per_million.is_finite()
            && self.output_price_per_million.is_finite()
            && self.input_price_per_million >= 0.0
            && self.output_price_per_million >= 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            ..Default::default()
        }
    }

    pub fn with_cache(mut self, read: u64, write: u64) -> Self {
        self.cache_read_tokens = read;
        self.cache_write_tokens = write;
        self
    }

    /// Saturates at `u64::MAX` rather than overflowing.
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_tokens)
            .saturating_add(self.cache_write_tokens)
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_write_tokens = self.cache_write_tokens.saturating_add(other.cache_write_tokens);
    }
}

/// Dollar cost split by token kind. Never rounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostBreakdown {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.input + self.output + self.cache_read + self.cache_write
    }

    pub fn add(&mut self, other: &CostBreakdown) {
        self.input += other.input;
        self.output += other.output;
        self.cache_read += other.cache_read;
        self.cache_write += other.cache_write;
    }
}

/// Optional price overrides for the class fallback table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassPrices {
    pub haiku: Option<ModelPrice>,
    pub sonnet: Option<ModelPrice>,
    pub opus: Option<ModelPrice>,
}

impl ClassPrices {
    pub fn get(&self, class: ModelClass) -> Option<ModelPrice> {
        match class {
            ModelClass::Haiku => self.haiku,
            ModelClass::Sonnet => self.sonnet,
            ModelClass::Opus => self.opus,
        }
    }
}

/// Static price table: exact model ids first, then the classification tier.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    prices: HashMap<String, ModelPrice>,
    class_prices: HashMap<ModelClass, ModelPrice>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self {
            prices: Self::embedded_defaults(),
            class_prices: Self::class_defaults(),
        }
    }

    fn embedded_defaults() -> HashMap<String, ModelPrice> {
        HashMap::from([
            ("claude-3-5-haiku".to_string(), ModelPrice::new(0.25, 1.25)),
            ("claude-3-5-sonnet".to_string(), ModelPrice::new(3.0, 15.0)),
            ("claude-3-5-opus".to_string(), ModelPrice::new(15.0, 75.0)),
            ("claude-3-haiku".to_string(), ModelPrice::new(0.25, 1.25)),
            ("claude-3-sonnet".to_string(), ModelPrice::new(3.0, 15.0)),
            ("claude-3-opus".to_string(), ModelPrice::new(15.0, 75.0)),
        ])
    }

    fn class_defaults() -> HashMap<ModelClass, ModelPrice> {
        HashMap::from([
            (ModelClass::Haiku, ModelPrice::new(0.25, 1.25)),
            (ModelClass::Sonnet, ModelPrice::new(3.0, 15.0)),
            (ModelClass::Opus, ModelPrice::new(15.0, 75.0)),
        ])
    }

    /// Builds the default table with settings overrides layered on top.
    pub fn with_overrides(models: &HashMap<String, ModelPrice>, classes: &ClassPrices) -> Self {
        let mut table = Self::new();

        for (model, price) in models {
            table.prices.insert(model.clone(), *price);
        }

        for class in ModelClass::ALL {
            if let Some(price) = classes.get(class) {
                table.class_prices.insert(class, price);
            }
        }

        table
    }

    pub fn get_price(&self, model: &str) -> Option<&ModelPrice> {
        self.prices.get(model)
    }

    pub fn class_price(&self, class: ModelClass) -> ModelPrice {
        self.class_prices.get(&class).copied().unwrap_or_default()
    }

    /// Never misses: unknown ids resolve through their classification.
    pub fn price_for(&self, model: &str) -> ModelPrice {
        match self.get_price(model) {
            Some(price) => *price,
            None => {
                let class = ModelClass::classify(model);
                tracing::trace!(model = %model, %class, "No exact price, using class fallback");
                self.class_price(class)
            }
        }
    }

    pub fn invalid_entries(&self) -> Vec<String> {
        let models = self
            .prices
            .iter()
            .filter(|(_, price)| !price.is_valid())
            .map(|(model, _)| model.clone());
        let classes = self
            .class_prices
            .iter()
            .filter(|(_, price)| !price.is_valid())
            .map(|(class, _)| class.to_string());

        let mut invalid: Vec<String> = models.chain(classes).collect();
        invalid.sort();
        invalid
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}
