use crate::config::AllocationMode;
use crate::models::{Allocation, Candidate};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    #[error("budget must be a finite amount >= 0 (value: {0})")]
    InvalidBudget(f64),

    #[error("price for {ticker} must be a finite amount > 0 (value: {price})")]
    InvalidPrice { ticker: String, price: f64 },

    #[error("ticker {0} appears more than once")]
    DuplicateTicker(String),
}

/// One allocatable ticker: its share price and the momentum used as a weight.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedTicker {
    pub ticker: String,
    pub price: f64,
    pub momentum_pct: f64,
}

impl From<&Candidate> for PricedTicker {
    fn from(candidate: &Candidate) -> Self {
        Self {
            ticker: candidate.ticker.clone(),
            price: candidate.latest_price,
            momentum_pct: candidate.momentum_pct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinglePosition {
    pub qty: u64,
    pub cost: f64,
}

/// Whole shares of one ticker that fit in `budget`.
pub fn allocate_single(budget: f64, price: f64) -> Result<SinglePosition, AllocationError> {
    validate_budget(budget)?;
    if !(price.is_finite() && price > 0.0) {
        return Err(AllocationError::InvalidPrice {
            ticker: String::new(),
            price,
        });
    }
    let qty = affordable_quantity(budget, price);
    Ok(SinglePosition {
        qty,
        cost: qty as f64 * price,
    })
}

pub fn allocate(
    mode: AllocationMode,
    budget: f64,
    tickers: &[PricedTicker],
) -> Result<Allocation, AllocationError> {
    match mode {
        AllocationMode::Minimum => allocate_minimum(budget, tickers),
        AllocationMode::MaxProfit => allocate_max_profit(budget, tickers),
    }
}

/// Round-robin one share at a time from the cheapest ticker up, spreading the
/// budget over as many tickers as possible.
pub fn allocate_minimum(
    budget: f64,
    tickers: &[PricedTicker],
) -> Result<Allocation, AllocationError> {
    validate(budget, tickers)?;
    let order = by_price(tickers);
    let mut book = Book::new(budget, tickers);

    loop {
        let mut bought = false;
        for entry in &order {
            if book.buy(entry, 1) {
                bought = true;
            }
        }
        if !bought {
            break;
        }
    }

    Ok(book.finish())
}

/// Budget split in proportion to positive momentum (evenly when none is
/// positive), then the remainder is swept from the cheapest ticker up.
pub fn allocate_max_profit(
    budget: f64,
    tickers: &[PricedTicker],
) -> Result<Allocation, AllocationError> {
    validate(budget, tickers)?;
    let mut book = Book::new(budget, tickers);

    for (entry, target) in tickers.iter().zip(proportional_targets(budget, tickers)) {
        let qty = affordable_quantity(target.min(book.remaining), entry.price);
        book.buy(entry, qty);
    }

    for entry in by_price(tickers) {
        let qty = affordable_quantity(book.remaining, entry.price);
        book.buy(entry, qty);
    }

    Ok(book.finish())
}

/// Cash earmarked per ticker before truncation to whole shares.
pub fn proportional_targets(budget: f64, tickers: &[PricedTicker]) -> Vec<f64> {
    if tickers.is_empty() {
        return Vec::new();
    }
    let weights: Vec<f64> = tickers
        .iter()
        .map(|t| {
            if t.momentum_pct.is_finite() {
                t.momentum_pct.max(0.0)
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        let even = budget / tickers.len() as f64;
        return vec![even; tickers.len()];
    }
    weights.iter().map(|w| budget * w / total).collect()
}

fn affordable_quantity(cash: f64, price: f64) -> u64 {
    if cash <= 0.0 {
        return 0;
    }
    let mut qty = (cash / price).floor().max(0.0) as u64;
    // Guard against the quotient rounding up across an integer boundary.
    while qty > 0 && qty as f64 * price > cash {
        qty -= 1;
    }
    qty
}

fn by_price(tickers: &[PricedTicker]) -> Vec<&PricedTicker> {
    let mut order: Vec<&PricedTicker> = tickers.iter().collect();
    order.sort_by(|a, b| {
        a.price
            .total_cmp(&b.price)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    order
}

fn validate_budget(budget: f64) -> Result<(), AllocationError> {
    if !(budget.is_finite() && budget >= 0.0) {
        return Err(AllocationError::InvalidBudget(budget));
    }
    Ok(())
}

fn validate(budget: f64, tickers: &[PricedTicker]) -> Result<(), AllocationError> {
    validate_budget(budget)?;
    let mut seen = HashSet::new();
    for entry in tickers {
        if !(entry.price.is_finite() && entry.price > 0.0) {
            return Err(AllocationError::InvalidPrice {
                ticker: entry.ticker.clone(),
                price: entry.price,
            });
        }
        if !seen.insert(entry.ticker.as_str()) {
            return Err(AllocationError::DuplicateTicker(entry.ticker.clone()));
        }
    }
    Ok(())
}

struct Book {
    shares: BTreeMap<String, u64>,
    spent: f64,
    remaining: f64,
}

impl Book {
    fn new(budget: f64, tickers: &[PricedTicker]) -> Self {
        Self {
            shares: tickers.iter().map(|t| (t.ticker.clone(), 0)).collect(),
            spent: 0.0,
            remaining: budget,
        }
    }

    /// Buys `qty` shares if they fit in the remaining cash.
    fn buy(&mut self, entry: &PricedTicker, qty: u64) -> bool {
        if qty == 0 {
            return false;
        }
        let cost = qty as f64 * entry.price;
        if cost > self.remaining {
            return false;
        }
        self.remaining -= cost;
        self.spent += cost;
        *self.shares.entry(entry.ticker.clone()).or_insert(0) += qty;
        true
    }

    fn finish(self) -> Allocation {
        Allocation {
            shares: self.shares,
            spent: self.spent,
            leftover: self.remaining.max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced(ticker: &str, price: f64, momentum_pct: f64) -> PricedTicker {
        PricedTicker {
            ticker: ticker.to_string(),
            price,
            momentum_pct,
        }
    }

    fn spent(allocation: &Allocation, tickers: &[PricedTicker]) -> f64 {
        tickers
            .iter()
            .map(|t| allocation.quantity(&t.ticker) as f64 * t.price)
            .sum()
    }

    #[test]
    fn minimum_policy_round_robins_from_cheapest() {
        let tickers = vec![
            priced("MID", 400.0, 0.0),
            priced("LOW", 250.0, 0.0),
            priced("HIGH", 600.0, 0.0),
        ];
        let allocation = allocate_minimum(1_000.0, &tickers).unwrap();
        assert_eq!(allocation.quantity("LOW"), 2);
        assert_eq!(allocation.quantity("MID"), 1);
        assert_eq!(allocation.quantity("HIGH"), 0);
        assert!(allocation.shares.contains_key("HIGH"));
        assert!((allocation.leftover - 100.0).abs() < 1e-9);
        assert!((allocation.spent - 900.0).abs() < 1e-9);
    }

    #[test]
    fn minimum_policy_never_overspends_and_leaves_no_affordable_share() {
        let price_sets: Vec<Vec<f64>> = vec![
            vec![3.7, 12.25, 99.99],
            vec![0.25, 0.5],
            vec![1_500.0],
            vec![17.0, 17.0, 33.3, 41.0, 8.8],
            vec![250.0, 400.0, 600.0],
        ];
        let budgets = [0.0, 1.0, 99.0, 1_000.0, 12_345.67];

        for prices in &price_sets {
            let tickers: Vec<PricedTicker> = prices
                .iter()
                .enumerate()
                .map(|(idx, price)| priced(&format!("T{idx}"), *price, 0.0))
                .collect();
            let cheapest = prices.iter().cloned().fold(f64::INFINITY, f64::min);
            for budget in budgets {
                let allocation = allocate_minimum(budget, &tickers).unwrap();
                let total = spent(&allocation, &tickers);
                assert!(total <= budget + 1e-6, "overspent {total} of {budget}");
                assert!(
                    budget - total < cheapest + 1e-6,
                    "left {} unspent with cheapest {cheapest}",
                    budget - total
                );
                assert!(allocation.leftover >= 0.0);
            }
        }
    }

    #[test]
    fn max_profit_even_split_when_no_positive_momentum() {
        let tickers = vec![
            priced("A", 100.0, -2.0),
            priced("B", 150.0, 0.0),
            priced("C", 300.0, -0.5),
        ];
        let targets = proportional_targets(900.0, &tickers);
        assert_eq!(targets, vec![300.0, 300.0, 300.0]);

        let allocation = allocate_max_profit(900.0, &tickers).unwrap();
        assert_eq!(allocation.quantity("A"), 3);
        assert_eq!(allocation.quantity("B"), 2);
        assert_eq!(allocation.quantity("C"), 1);
        assert!(allocation.leftover.abs() < 1e-9);
    }

    #[test]
    fn max_profit_weights_by_positive_momentum_then_sweeps_remainder() {
        let tickers = vec![
            priced("FAST", 100.0, 3.0),
            priced("SLOW", 30.0, 1.0),
            priced("DOWN", 10.0, -4.0),
        ];
        // FAST earmarks 750 -> 7 shares, SLOW earmarks 250 -> 8 shares (240),
        // DOWN earmarks nothing; 60 left is swept into DOWN (cheapest) as 6 shares.
        let allocation = allocate_max_profit(1_000.0, &tickers).unwrap();
        assert_eq!(allocation.quantity("FAST"), 7);
        assert_eq!(allocation.quantity("SLOW"), 8);
        assert_eq!(allocation.quantity("DOWN"), 6);
        assert!(allocation.leftover.abs() < 1e-9);
    }

    #[test]
    fn max_profit_never_overspends() {
        let tickers = vec![
            priced("A", 33.33, 1.7),
            priced("B", 7.77, 0.2),
            priced("C", 512.0, 9.9),
        ];
        for budget in [0.0, 5.0, 777.77, 10_000.0] {
            let allocation = allocate_max_profit(budget, &tickers).unwrap();
            let total = spent(&allocation, &tickers);
            assert!(total <= budget + 1e-6);
            assert!(budget - total < 7.77 + 1e-6);
        }
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert_eq!(
            allocate_minimum(-1.0, &[]),
            Err(AllocationError::InvalidBudget(-1.0))
        );
        assert!(matches!(
            allocate_max_profit(100.0, &[priced("BAD", 0.0, 1.0)]),
            Err(AllocationError::InvalidPrice { .. })
        ));
        assert_eq!(
            allocate_minimum(100.0, &[priced("X", 1.0, 0.0), priced("X", 2.0, 0.0)]),
            Err(AllocationError::DuplicateTicker("X".to_string()))
        );
    }

    #[test]
    fn empty_ticker_set_keeps_whole_budget() {
        let allocation = allocate(AllocationMode::MaxProfit, 500.0, &[]).unwrap();
        assert_eq!(allocation.total_shares(), 0);
        assert_eq!(allocation.leftover, 500.0);
    }

    #[test]
    fn single_allocation_floors_to_whole_shares() {
        let position = allocate_single(10_000.0, 104.0).unwrap();
        assert_eq!(position.qty, 96);
        assert!((position.cost - 9_984.0).abs() < 1e-9);
        assert_eq!(allocate_single(50.0, 104.0).unwrap().qty, 0);
    }
}
