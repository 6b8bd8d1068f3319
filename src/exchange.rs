//! Calories → cups exchange

use serde::Serialize;

use crate::config::ExchangeTerms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExchangeOutcome {
    /// Whole exchanges performed; 0 means the balance was too low
    pub exchanges: i64,
    pub calories_spent: i64,
    pub cups_gained: i64,
    pub calories_left: i64,
    pub cups_total: i64,
}

impl ExchangeOutcome {
    pub fn is_insufficient(&self) -> bool {
        self.exchanges == 0
    }
}

/// Plan an exchange of whole units only; never debits below zero
pub fn plan_exchange(calories: i64, cups: i64, terms: &ExchangeTerms) -> ExchangeOutcome {
    let exchanges = if terms.rate > 0 && calories > 0 {
        calories / terms.rate
    } else {
        0
    };
    let calories_spent = exchanges * terms.rate;
    let cups_gained = exchanges * terms.cups_per_exchange;

    ExchangeOutcome {
        exchanges,
        calories_spent,
        cups_gained,
        calories_left: calories - calories_spent,
        cups_total: cups + cups_gained,
    }
}

/// True when adding `added` calories lifts the balance across the exchange rate
pub fn crossed_exchange_threshold(balance_after: i64, added: i64, terms: &ExchangeTerms) -> bool {
    added > 0 && balance_after >= terms.rate && balance_after - added < terms.rate
}
