//! Transformer trait and the CPU statistics transformer

use crate::model::{Indicator, NormalizedRecord, RawMetricRecord};

/// Transformer trait for mapping one extracted item to one output item
///
/// Transformation cannot fail: garbled input must degrade to a usable value
/// rather than drop the record.
pub trait Transformer: Send + Sync {
    /// Input item type
    type Input: Send;

    /// Output item type after transformation
    type Output: Send;

    /// Transform a single item
    fn transform(&self, input: Self::Input) -> Self::Output;

    /// Transform multiple items (default batch implementation)
    fn transform_many(&self, inputs: Vec<Self::Input>) -> Vec<Self::Output> {
        inputs.into_iter().map(|i| self.transform(i)).collect()
    }
}

/// Indicator names in emission order.
pub const INDICATOR_ORDER: [&str; 5] = ["utilization", "nice", "user", "system", "irq"];

/// Turns raw CPU percentages into indicators
///
/// Emits `utilization = 100 - idle` followed by nice, user, system and irq, always
/// in [`INDICATOR_ORDER`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuTransformer;

impl CpuTransformer {
    pub fn new() -> Self {
        Self
    }
}

/// Parse a percentage string, mapping anything unusable to 0.0.
///
/// Non-finite values are rejected too since they have no JSON representation.
fn parse_percent(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

impl Transformer for CpuTransformer {
    type Input = RawMetricRecord;
    type Output = NormalizedRecord;

    fn transform(&self, input: Self::Input) -> Self::Output {
        let idle = parse_percent(&input.idle);
        let values = [
            100.0 - idle,
            parse_percent(&input.nice),
            parse_percent(&input.user),
            parse_percent(&input.system),
            parse_percent(&input.irq),
        ];

        let indicators = INDICATOR_ORDER
            .iter()
            .zip(values)
            .map(|(name, value)| Indicator::new(*name, value))
            .collect();

        NormalizedRecord {
            name: input.name,
            cpu_number: input.cpu_number,
            timestamp: input.timestamp,
            indicators,
        }
    }
}
