use crate::cost::pricing::{CostBreakdown, PricingTable, TokenUsage};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

const MESSAGE_RECORD_TYPE: &str = "message";
const UNKNOWN_MODEL: &str = "unknown";

/// One usage-bearing log line after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEntry {
    /// As recorded by the producer, offset included. `None` when absent or unparseable.
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub model: String,
    pub tokens: TokenUsage,
    pub cost: CostBreakdown,
    /// Producer total when the record carried one, otherwise the component sum.
    pub total_cost: f64,
    pub session_id: String,
    pub message_id: String,
}

impl UsageEntry {
    /// Calendar date in the timestamp's own offset.
    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date_naive())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub record_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<RawMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub model: Option<String>,
    #[serde(rename = "sessionId", default, deserialize_with = "lenient")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub usage: Option<RawUsage>,
}

/// Token counts under every spelling producers have used for the cache fields.
#[derive(Debug, Default, Deserialize)]
pub struct RawUsage {
    #[serde(default, deserialize_with = "token_count")]
    pub input: u64,
    #[serde(default, deserialize_with = "token_count")]
    pub output: u64,
    #[serde(rename = "cacheRead", default, deserialize_with = "token_count")]
    pub cache_read_camel: u64,
    #[serde(rename = "cache_read", default, deserialize_with = "token_count")]
    pub cache_read_snake: u64,
    #[serde(rename = "cacheWrite", default, deserialize_with = "token_count")]
    pub cache_write_camel: u64,
    #[serde(rename = "cache_write", default, deserialize_with = "token_count")]
    pub cache_write_snake: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub cost: Option<RawCost>,
}

impl RawUsage {
    fn tokens(&self) -> TokenUsage {
        TokenUsage::new(self.input, self.output).with_cache(
            first_nonzero(self.cache_read_camel, self.cache_read_snake),
            first_nonzero(self.cache_write_camel, self.cache_write_snake),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCost {
    #[serde(default, deserialize_with = "amount")]
    pub input: f64,
    #[serde(default, deserialize_with = "amount")]
    pub output: f64,
    #[serde(rename = "cacheRead", default, deserialize_with = "amount")]
    pub cache_read: f64,
    #[serde(rename = "cacheWrite", default, deserialize_with = "amount")]
    pub cache_write: f64,
    #[serde(default, deserialize_with = "optional_amount")]
    pub total: Option<f64>,
}

fn first_nonzero(preferred: u64, fallback: u64) -> u64 {
    if preferred > 0 {
        preferred
    } else {
        fallback
    }
}

/// Any value that does not fit `T` becomes `None` instead of failing the record.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn token_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let count = match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f > 0.0)
                .map_or(0, |f| f as u64)
        }),
        _ => 0,
    };
    Ok(count)
}

fn non_negative(value: &serde_json::Value) -> Option<f64> {
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.max(0.0))
}

fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(non_negative(&value).unwrap_or(0.0))
}

fn optional_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(non_negative(&value))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }

    // Offset-less timestamps are taken at face value.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Turns a decoded record into a usage entry, or `None` when the record
/// carries no usage.
pub fn normalize(record: RawRecord, pricing: &PricingTable) -> Option<UsageEntry> {
    if record.record_type.as_deref() != Some(MESSAGE_RECORD_TYPE) {
        return None;
    }

    let message = record.message?;
    let usage = message.usage?;

    let model = message.model.unwrap_or_else(|| UNKNOWN_MODEL.to_string());
    let tokens = usage.tokens();

    let (cost, total_cost) = match usage.cost {
        Some(RawCost {
            input,
            output,
            cache_read,
            cache_write,
            total: Some(total),
        }) => (
            CostBreakdown {
                input,
                output,
                cache_read,
                cache_write,
            },
            total,
        ),
        _ => {
            let cost = pricing.price_for(&model).calculate_cost(&tokens);
            (cost, cost.total())
        }
    };

    Some(UsageEntry {
        timestamp: record.timestamp.as_deref().and_then(parse_timestamp),
        model,
        tokens,
        cost,
        total_cost,
        session_id: message.session_id.unwrap_or_default(),
        message_id: record.id.unwrap_or_default(),
    })
}
