//! Running balance and drawdown over closed trades.

use chrono::NaiveDateTime;

use super::trade::Trade;

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub close_ts: NaiveDateTime,
    pub balance_before: f64,
    pub profit: f64,
    pub balance_after: f64,
    pub peak: f64,
    pub drawdown_abs: f64,
    pub drawdown_pct: f64,
    /// `|profit| / balance_before * 100` for losing trades with a positive
    /// balance before the close.
    pub relative_loss_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityCurve {
    pub starting_balance: f64,
    pub points: Vec<EquityPoint>,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub max_consecutive_stop_losses: usize,
}

impl EquityCurve {
    /// Folds trades in close order. Ties keep the order they were given in.
    pub fn build(trades: &[Trade], starting_balance: f64) -> Self {
        let mut ordered: Vec<&Trade> = trades.iter().collect();
        ordered.sort_by_key(|t| t.close.ts);

        let mut balance = starting_balance;
        let mut peak = starting_balance;
        let mut points = Vec::with_capacity(ordered.len());

        for trade in &ordered {
            let balance_before = balance;
            balance += trade.profit;
            peak = peak.max(balance);

            let drawdown_abs = peak - balance;
            let drawdown_pct = if peak > 0.0 {
                drawdown_abs / peak * 100.0
            } else {
                0.0
            };
            let relative_loss_pct = (trade.is_loss() && balance_before > 0.0)
                .then(|| trade.profit.abs() / balance_before * 100.0);

            points.push(EquityPoint {
                close_ts: trade.close.ts,
                balance_before,
                profit: trade.profit,
                balance_after: balance,
                peak,
                drawdown_abs,
                drawdown_pct,
                relative_loss_pct,
            });
        }

        EquityCurve {
            starting_balance,
            max_consecutive_wins: longest_run(ordered.iter().map(|t| t.is_win())),
            max_consecutive_losses: longest_run(ordered.iter().map(|t| t.is_loss())),
            max_consecutive_stop_losses: longest_run(
                ordered.iter().map(|t| t.is_stop_loss_exit()),
            ),
            points,
        }
    }

    pub fn final_balance(&self) -> f64 {
        self.points
            .last()
            .map(|p| p.balance_after)
            .unwrap_or(self.starting_balance)
    }

    pub fn max_drawdown_abs(&self) -> f64 {
        self.points.iter().map(|p| p.drawdown_abs).fold(0.0, f64::max)
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        self.points.iter().map(|p| p.drawdown_pct).fold(0.0, f64::max)
    }

    pub fn worst_relative_loss_pct(&self) -> Option<f64> {
        self.points
            .iter()
            .filter_map(|p| p.relative_loss_pct)
            .reduce(f64::max)
    }

    /// Points whose single loss consumed at least `threshold_pct` of the
    /// balance before it.
    pub fn oversized_losses(&self, threshold_pct: f64) -> Vec<&EquityPoint> {
        self.points
            .iter()
            .filter(|p| p.relative_loss_pct.is_some_and(|r| r >= threshold_pct))
            .collect()
    }
}

/// Length of the longest run of `true` values.
pub fn longest_run<I: IntoIterator<Item = bool>>(flags: I) -> usize {
    let mut best = 0;
    let mut current = 0;
    for flag in flags {
        if flag {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{Outcome, Side, TradeClose, TradeOpen};
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, TimeDelta};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn trade(index: i64, profit: f64, reason: &str) -> Trade {
        let opened = base() + TimeDelta::hours(index);
        let open = TradeOpen {
            ts: opened,
            line: index as usize * 2,
            side: Side::Buy,
            price: 100.0,
            volume: 1.0,
            stop_loss: 95.0,
            take_profit: 110.0,
            ticket: None,
        };
        let close = TradeClose {
            ts: opened + TimeDelta::minutes(30),
            line: index as usize * 2 + 1,
            outcome: Outcome::from_profit(profit),
            outcome_inferred: false,
            profit,
            reason: reason.to_string(),
            ticket: None,
        };
        Trade::new(open, close, None)
    }

    fn trades(profits: &[f64]) -> Vec<Trade> {
        profits
            .iter()
            .enumerate()
            .map(|(i, &p)| trade(i as i64, p, if p > 0.0 { "Take Profit" } else { "Stop Loss" }))
            .collect()
    }

    #[test]
    fn single_winning_trade() {
        let curve = EquityCurve::build(&trades(&[8.0]), 100.0);
        let point = &curve.points[0];
        assert_relative_eq!(point.balance_before, 100.0);
        assert_relative_eq!(point.balance_after, 108.0);
        assert_relative_eq!(point.peak, 108.0);
        assert_relative_eq!(point.drawdown_abs, 0.0);
        assert!(point.relative_loss_pct.is_none());
    }

    #[test]
    fn drawdown_series() {
        let curve = EquityCurve::build(&trades(&[-5.0, -5.0, 3.0, -5.0]), 100.0);
        let balances: Vec<f64> = curve.points.iter().map(|p| p.balance_after).collect();
        let peaks: Vec<f64> = curve.points.iter().map(|p| p.peak).collect();
        let drawdowns: Vec<f64> = curve.points.iter().map(|p| p.drawdown_abs).collect();
        assert_eq!(balances, vec![95.0, 90.0, 93.0, 88.0]);
        assert_eq!(peaks, vec![100.0, 100.0, 100.0, 100.0]);
        assert_eq!(drawdowns, vec![5.0, 10.0, 7.0, 12.0]);
        assert_relative_eq!(curve.max_drawdown_abs(), 12.0);
        assert_relative_eq!(curve.max_drawdown_pct(), 12.0);
        assert_relative_eq!(curve.final_balance(), 88.0);
    }

    #[test]
    fn streaks() {
        let curve = EquityCurve::build(&trades(&[-1.0, -1.0, 2.0, -1.0, -1.0, -1.0]), 100.0);
        assert_eq!(curve.max_consecutive_losses, 3);
        assert_eq!(curve.max_consecutive_wins, 1);
        assert_eq!(curve.max_consecutive_stop_losses, 3);
    }

    #[test]
    fn stop_loss_streak_requires_reason() {
        let sequence = vec![
            trade(0, -1.0, "Stop Loss"),
            trade(1, -1.0, "Manual"),
            trade(2, -1.0, "Stop Loss"),
        ];
        let curve = EquityCurve::build(&sequence, 100.0);
        assert_eq!(curve.max_consecutive_losses, 3);
        assert_eq!(curve.max_consecutive_stop_losses, 1);
    }

    #[test]
    fn folds_in_close_order() {
        let mut late = trade(0, -10.0, "Stop Loss");
        late.close.ts = base() + TimeDelta::hours(5);
        let early = trade(1, 20.0, "Take Profit");
        let curve = EquityCurve::build(&[late, early], 100.0);
        assert_relative_eq!(curve.points[0].profit, 20.0);
        assert_relative_eq!(curve.points[1].balance_before, 120.0);
        assert_relative_eq!(curve.points[1].drawdown_abs, 10.0);
    }

    #[test]
    fn relative_loss_and_oversized_flags() {
        let curve = EquityCurve::build(&trades(&[-2.0, -9.8]), 100.0);
        assert_relative_eq!(curve.points[0].relative_loss_pct.unwrap(), 2.0);
        assert_relative_eq!(curve.points[1].relative_loss_pct.unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(curve.worst_relative_loss_pct().unwrap(), 10.0, epsilon = 1e-9);
        assert_eq!(curve.oversized_losses(5.0).len(), 1);
        assert_eq!(curve.oversized_losses(1.0).len(), 2);
    }

    #[test]
    fn zero_balance_has_no_percentages() {
        let curve = EquityCurve::build(&trades(&[-5.0, 2.0]), 0.0);
        assert!(curve.points[0].relative_loss_pct.is_none());
        assert_relative_eq!(curve.points[0].drawdown_pct, 0.0);
        assert_relative_eq!(curve.points[0].drawdown_abs, 5.0);
    }

    #[test]
    fn empty_curve() {
        let curve = EquityCurve::build(&[], 250.0);
        assert!(curve.points.is_empty());
        assert_relative_eq!(curve.final_balance(), 250.0);
        assert_relative_eq!(curve.max_drawdown_abs(), 0.0);
        assert!(curve.worst_relative_loss_pct().is_none());
        assert_eq!(curve.max_consecutive_losses, 0);
    }

    #[test]
    fn longest_run_counts() {
        assert_eq!(longest_run(Vec::new()), 0);
        assert_eq!(longest_run([true, true, false, true]), 2);
        assert_eq!(longest_run([false, false]), 0);
    }
}
