//! Virtual-portfolio accounting.
//!
//! Pure operations over one participant's portfolio: confidence-sized buys,
//! whole-position sells, and revaluation at current prices. All monetary
//! quantities are plain f64 USD. Invariants: cash never goes negative, a
//! position with zero amount is deleted, and `trades = wins + losses +
//! open positions opened so far`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sell-side fee rate; buys use the round's configured fee.
const SELL_FEE_RATE: f64 = 0.001;
/// Buys below this fraction of pre-trade cash are skipped.
const MIN_POSITION_FRACTION: f64 = 0.05;

/// Sizing and fee knobs taken from the round settings.
#[derive(Debug, Clone, Copy)]
pub struct TradePolicy {
    /// Fraction of cash a single position may consume at confidence 10.
    pub max_position_size: f64,
    /// Fee rate applied to buy notional.
    pub trading_fee: f64,
}

impl Default for TradePolicy {
    fn default() -> Self {
        Self {
            max_position_size: 0.3,
            trading_fee: 0.001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub amount: f64,
    pub avg_entry_price: f64,
    pub total_invested: f64,
    pub current_value: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub cash: f64,
    pub starting_balance: f64,
    pub positions: HashMap<String, Position>,
    pub total_value: f64,
    pub realized_pnl: f64,
    pub pnl_percent: f64,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
    pub last_update: i64,
}

impl Portfolio {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            cash: starting_balance,
            starting_balance,
            positions: HashMap::new(),
            total_value: starting_balance,
            realized_pnl: 0.0,
            pnl_percent: 0.0,
            trades: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            last_update: crate::models::now_ms(),
        }
    }

    /// Open or extend a position. Size is `cash × max_position_size ×
    /// min(confidence/10, 1)`, skipped when below 5% of pre-trade cash or
    /// when notional plus fee exceeds cash. Returns whether it executed.
    pub fn apply_buy(
        &mut self,
        symbol: &str,
        price: f64,
        confidence: f64,
        policy: &TradePolicy,
    ) -> bool {
        if !(price.is_finite() && price > 0.0) {
            return false;
        }

        let max_position_value = self.cash * policy.max_position_size;
        let position_value = max_position_value * (confidence / 10.0).min(1.0);

        if position_value < self.cash * MIN_POSITION_FRACTION {
            return false;
        }
        let fee = position_value * policy.trading_fee;
        if position_value + fee > self.cash {
            return false;
        }

        self.cash -= position_value + fee;

        let amount = position_value / price;
        let entry = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position {
                symbol: symbol.to_string(),
                amount: 0.0,
                avg_entry_price: price,
                total_invested: 0.0,
                current_value: 0.0,
                unrealized_pnl: 0.0,
            });

        let new_invested = entry.total_invested + position_value;
        let new_amount = entry.amount + amount;
        entry.total_invested = new_invested;
        entry.amount = new_amount;
        entry.avg_entry_price = if new_amount > 0.0 {
            new_invested / new_amount
        } else {
            price
        };

        self.trades += 1;
        self.last_update = crate::models::now_ms();
        true
    }

    /// Close the entire position at `price` (no partial sells). Realized
    /// P&L is net proceeds minus invested; counts a win or a loss and
    /// deletes the position. Returns whether it executed.
    pub fn apply_sell(&mut self, symbol: &str, price: f64) -> bool {
        if !(price.is_finite() && price > 0.0) {
            return false;
        }
        let Some(position) = self.positions.get(symbol) else {
            return false;
        };
        if position.amount <= 0.0 {
            self.positions.remove(symbol);
            return false;
        }

        let sell_value = position.amount * price;
        let fee = sell_value * SELL_FEE_RATE;
        let net_proceeds = sell_value - fee;
        let realized = net_proceeds - position.total_invested;

        self.cash += net_proceeds;
        self.realized_pnl += realized;
        if realized > 0.0 {
            self.wins += 1;
        } else {
            self.losses += 1;
        }

        self.positions.remove(symbol);
        self.trades += 1;
        self.last_update = crate::models::now_ms();
        true
    }

    /// Mark every position at the supplied prices and refresh the derived
    /// fields. Positions whose symbol is missing from `prices` keep their
    /// previous mark.
    pub fn revalue(&mut self, prices: &HashMap<String, f64>) {
        let mut positions_value = 0.0;
        for position in self.positions.values_mut() {
            if let Some(price) = prices.get(&position.symbol) {
                position.current_value = position.amount * price;
                position.unrealized_pnl = position.current_value - position.total_invested;
            }
            positions_value += position.current_value;
        }

        self.total_value = self.cash + positions_value;
        self.pnl_percent = if self.starting_balance > 0.0 {
            (self.total_value - self.starting_balance) / self.starting_balance * 100.0
        } else {
            0.0
        };
        self.win_rate = if self.trades > 0 {
            self.wins as f64 / self.trades as f64 * 100.0
        } else {
            0.0
        };
        self.last_update = crate::models::now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TradePolicy {
        TradePolicy::default()
    }

    #[test]
    fn buy_conserves_cash() {
        let mut pf = Portfolio::new(10_000.0);
        let cash_before = pf.cash;
        assert!(pf.apply_buy("ETH", 3000.0, 7.0, &policy()));

        let position = &pf.positions["ETH"];
        let fee = position.total_invested * 0.001;
        assert!((pf.cash + fee + position.total_invested - cash_before).abs() < 1e-9);
    }

    #[test]
    fn buy_sizes_by_confidence() {
        let mut pf = Portfolio::new(10_000.0);
        assert!(pf.apply_buy("ETH", 3000.0, 7.0, &policy()));

        // 10_000 * 0.3 * 0.7 = 2_100 notional, 0.7 ETH at 3_000.
        let position = &pf.positions["ETH"];
        assert!((position.total_invested - 2_100.0).abs() < 1e-9);
        assert!((position.amount - 0.7).abs() < 1e-9);
        assert!((pf.cash - (10_000.0 - 2_100.0 - 2.1)).abs() < 1e-9);
    }

    #[test]
    fn confidence_caps_at_full_allocation() {
        let mut pf = Portfolio::new(10_000.0);
        assert!(pf.apply_buy("ETH", 3000.0, 15.0, &policy()));
        let position = &pf.positions["ETH"];
        assert!((position.total_invested - 3_000.0).abs() < 1e-9);
    }

    #[test]
    fn tiny_buys_are_skipped() {
        let mut pf = Portfolio::new(10_000.0);
        // 0.3 * 0.1 = 3% of cash, below the 5% floor.
        assert!(!pf.apply_buy("ETH", 3000.0, 1.0, &policy()));
        assert!(pf.positions.is_empty());
        assert_eq!(pf.trades, 0);
        assert_eq!(pf.cash, 10_000.0);
    }

    #[test]
    fn sell_conserves_cash_and_removes_position() {
        let mut pf = Portfolio::new(10_000.0);
        assert!(pf.apply_buy("ETH", 3000.0, 7.0, &policy()));
        let amount = pf.positions["ETH"].amount;
        let cash_before = pf.cash;

        assert!(pf.apply_sell("ETH", 3300.0));

        let sell_value = amount * 3300.0;
        let fee = sell_value * 0.001;
        assert!((pf.cash - (cash_before + sell_value - fee)).abs() < 1e-9);
        // No zero-amount ghost.
        assert!(!pf.positions.contains_key("ETH"));
    }

    #[test]
    fn profitable_sell_counts_a_win() {
        let mut pf = Portfolio::new(10_000.0);
        pf.apply_buy("ETH", 3000.0, 7.0, &policy());
        pf.apply_sell("ETH", 3300.0);
        assert_eq!(pf.wins, 1);
        assert_eq!(pf.losses, 0);
        assert!(pf.realized_pnl > 0.0);
        assert_eq!(pf.trades, 2);
    }

    #[test]
    fn losing_sell_counts_a_loss() {
        let mut pf = Portfolio::new(10_000.0);
        pf.apply_buy("ETH", 3000.0, 7.0, &policy());
        pf.apply_sell("ETH", 2700.0);
        assert_eq!(pf.wins, 0);
        assert_eq!(pf.losses, 1);
        assert!(pf.realized_pnl < 0.0);
    }

    #[test]
    fn sell_without_position_is_noop() {
        let mut pf = Portfolio::new(10_000.0);
        assert!(!pf.apply_sell("ETH", 3000.0));
        assert_eq!(pf.trades, 0);
        assert_eq!(pf.cash, 10_000.0);
    }

    #[test]
    fn revalue_matches_cash_plus_marked_positions() {
        let mut pf = Portfolio::new(10_000.0);
        pf.apply_buy("ETH", 3000.0, 7.0, &policy());
        pf.apply_buy("TOSHI", 0.0001, 7.0, &policy());

        let mut prices = HashMap::new();
        prices.insert("ETH".to_string(), 3100.0);
        prices.insert("TOSHI".to_string(), 0.00009);
        pf.revalue(&prices);

        let expected: f64 = pf.cash
            + pf.positions
                .values()
                .map(|p| p.amount * prices[&p.symbol])
                .sum::<f64>();
        assert!((pf.total_value - expected).abs() < 1e-6);
    }

    #[test]
    fn revalue_derives_percent_pnl_and_win_rate() {
        let mut pf = Portfolio::new(10_000.0);
        pf.apply_buy("ETH", 3000.0, 7.0, &policy());
        pf.apply_sell("ETH", 3300.0);
        pf.revalue(&HashMap::new());

        assert!(pf.pnl_percent > 0.0);
        assert!((pf.win_rate - 50.0).abs() < 1e-9);
        assert_eq!(pf.trades, pf.wins + pf.losses);
    }

    #[test]
    fn averaging_in_updates_entry_price() {
        let mut pf = Portfolio::new(10_000.0);
        pf.apply_buy("ETH", 3000.0, 7.0, &policy());
        pf.apply_buy("ETH", 4000.0, 7.0, &policy());

        let position = &pf.positions["ETH"];
        let expected_avg = position.total_invested / position.amount;
        assert!((position.avg_entry_price - expected_avg).abs() < 1e-9);
        assert!(position.avg_entry_price > 3000.0);
        assert!(position.avg_entry_price < 4000.0);
    }
}
