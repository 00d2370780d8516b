mod aggregator;
mod classifier;
mod entry;
mod pricing;
mod reader;
mod report;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use classifier::ModelClass;
pub use pricing::{ClassPrices, ModelPrice, PricingTable};
pub use reader::DEFAULT_CHUNK_SIZE;
