//! Validates a proposed signal's fields before admission.
//
//  This module is deliberately pure: no async, no IO, no clock.

use thiserror::Error;

use crate::model::{Direction, SignalCandidate};

/// Bounds applied during validation. `min_risk_reward` is optional: when
/// unset, risk/reward is computed for broadcast but never rejects.
#[derive(Debug, Clone)]
pub struct ValidationLimits {
    pub max_symbol_len: usize,
    pub min_risk_reward: Option<f64>,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_symbol_len: 32,
            min_risk_reward: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("symbol exceeds {max} characters")]
    SymbolTooLong { max: usize },

    #[error("{field} must be a positive number")]
    NonPositivePrice { field: &'static str },

    #[error("TP must be greater than entry price for BUY")]
    BuyTakeProfitBelowEntry,

    #[error("SL must be less than entry price for BUY")]
    BuyStopLossAboveEntry,

    #[error("TP must be less than entry price for SELL")]
    SellTakeProfitAboveEntry,

    #[error("SL must be greater than entry price for SELL")]
    SellStopLossBelowEntry,

    #[error("risk/reward {actual:.2} below required minimum {min:.2}")]
    RiskRewardTooLow { actual: f64, min: f64 },
}

/// Check a candidate against field and ordering invariants.
///
/// For BUY: take_profit > entry_price > stop_loss.
/// For SELL: take_profit < entry_price < stop_loss.
///
/// Returns the derived risk/reward ratio on success; the caller attaches
/// it to the admitted signal.
pub fn validate(
    candidate: &SignalCandidate,
    limits: &ValidationLimits,
) -> Result<f64, ValidationError> {
    if candidate.symbol.trim().is_empty() {
        return Err(ValidationError::EmptySymbol);
    }
    if candidate.symbol.len() > limits.max_symbol_len {
        return Err(ValidationError::SymbolTooLong {
            max: limits.max_symbol_len,
        });
    }

    for (field, value) in [
        ("price", candidate.entry_price),
        ("sl", candidate.stop_loss),
        ("tp", candidate.take_profit),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::NonPositivePrice { field });
        }
    }

    let entry = candidate.entry_price;
    let sl = candidate.stop_loss;
    let tp = candidate.take_profit;

    match candidate.direction {
        Direction::Buy => {
            if tp <= entry {
                return Err(ValidationError::BuyTakeProfitBelowEntry);
            }
            if sl >= entry {
                return Err(ValidationError::BuyStopLossAboveEntry);
            }
        }
        Direction::Sell => {
            if tp >= entry {
                return Err(ValidationError::SellTakeProfitAboveEntry);
            }
            if sl <= entry {
                return Err(ValidationError::SellStopLossBelowEntry);
            }
        }
    }

    // Ordering above guarantees entry != sl, so the denominator is nonzero.
    let risk_reward = (tp - entry).abs() / (entry - sl).abs();

    if let Some(min) = limits.min_risk_reward {
        if risk_reward < min {
            return Err(ValidationError::RiskRewardTooLow {
                actual: risk_reward,
                min,
            });
        }
    }

    Ok(risk_reward)
}
