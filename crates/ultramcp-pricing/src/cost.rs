//! Tiered cost math and display formatting

use serde::{Deserialize, Serialize};

use crate::catalog::ModelPricing;

/// Token count above which the above-200k rates apply.
pub const TIER_THRESHOLD_TOKENS: u64 = 200_000;

/// Resolved cost for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    /// True iff the above-threshold rate fired for input or output
    pub tiered_applied: bool,
}

/// Compute the cost of `(input_tokens, output_tokens)` under `pricing`.
///
/// Returns `None` when the entry has no base token prices (image-only
/// entries cannot price a text call). The tiered branch fires for a
/// dimension only when its count exceeds the threshold AND the entry
/// carries an above-threshold rate for that dimension; a count of exactly
/// 200 000 tokens uses the base rate alone.
pub fn calculate(pricing: &ModelPricing, input_tokens: u64, output_tokens: u64) -> Option<CostBreakdown> {
    let input_rate = pricing.input_cost_per_token?;
    let output_rate = pricing.output_cost_per_token?;

    let (input_cost, input_tiered) = dimension_cost(
        input_tokens,
        input_rate,
        pricing.input_cost_per_token_above_200k,
    );
    let (output_cost, output_tiered) = dimension_cost(
        output_tokens,
        output_rate,
        pricing.output_cost_per_token_above_200k,
    );

    Some(CostBreakdown {
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
        tiered_applied: input_tiered || output_tiered,
    })
}

fn dimension_cost(tokens: u64, base_rate: f64, above_rate: Option<f64>) -> (f64, bool) {
    match above_rate {
        Some(above) if tokens > TIER_THRESHOLD_TOKENS => {
            let below = TIER_THRESHOLD_TOKENS as f64 * base_rate;
            let over = (tokens - TIER_THRESHOLD_TOKENS) as f64 * above;
            (below + over, true)
        }
        _ => (tokens as f64 * base_rate, false),
    }
}

/// Format a USD amount for display.
///
/// Sub-cent values get 6 decimals, sub-dollar 4, everything else 2.
pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("${cost:.6}")
    } else if cost < 1.0 {
        format!("${cost:.4}")
    } else {
        format!("${cost:.2}")
    }
}
