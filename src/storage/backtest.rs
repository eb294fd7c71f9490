//! Persistence for `backtest_results` (§4.10), one row per
//! `(strategy, variant, market, window)` backtest run.

use chrono::Utc;
use rusqlite::params;

use super::Store;
use crate::domain::{BacktestResult, ConfidenceTier, Market};
use crate::error::Result;

pub fn insert(store: &Store, result: &BacktestResult) -> Result<i64> {
    let conn = store.lock();
    conn.execute(
        "INSERT INTO backtest_results
         (strategy_name, variant_name, market, window_start, window_end, bets_count, wins,
          win_rate, roi_at_minus_110, roi_using_actual_odds, drawdown, confidence_tier,
          sample_sufficient, computed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            result.strategy_name,
            result.variant_name,
            result.market.as_str(),
            result.window_start.to_rfc3339(),
            result.window_end.to_rfc3339(),
            result.bets_count,
            result.wins,
            result.win_rate,
            result.roi_at_minus_110,
            result.roi_using_actual_odds,
            result.drawdown,
            tier_str(result.confidence_tier),
            result.sample_sufficient,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn latest_for_variant(
    store: &Store,
    strategy_name: &str,
    variant_name: &str,
    market: Market,
) -> Result<Option<BacktestResult>> {
    let conn = store.lock();
    let row = conn.query_row(
        "SELECT strategy_name, variant_name, market, window_start, window_end, bets_count, wins,
                win_rate, roi_at_minus_110, roi_using_actual_odds, drawdown, confidence_tier,
                sample_sufficient
         FROM backtest_results
         WHERE strategy_name = ?1 AND variant_name = ?2 AND market = ?3
         ORDER BY window_end DESC LIMIT 1",
        params![strategy_name, variant_name, market.as_str()],
        row_to_result,
    );
    Ok(row.ok())
}

fn tier_str(tier: ConfidenceTier) -> &'static str {
    match tier {
        ConfidenceTier::High => "HIGH",
        ConfidenceTier::Medium => "MEDIUM",
        ConfidenceTier::Low => "LOW",
        ConfidenceTier::VeryLow => "VERY_LOW",
    }
}

fn parse_tier(s: &str) -> ConfidenceTier {
    match s {
        "HIGH" => ConfidenceTier::High,
        "MEDIUM" => ConfidenceTier::Medium,
        "LOW" => ConfidenceTier::Low,
        _ => ConfidenceTier::VeryLow,
    }
}

fn row_to_result(row: &rusqlite::Row) -> rusqlite::Result<BacktestResult> {
    let market_str: String = row.get(2)?;
    let window_start_str: String = row.get(3)?;
    let window_end_str: String = row.get(4)?;
    let tier_str_val: String = row.get(11)?;
    Ok(BacktestResult {
        strategy_name: row.get(0)?,
        variant_name: row.get(1)?,
        market: market_str.parse::<Market>().unwrap_or(Market::Moneyline),
        window_start: chrono::DateTime::parse_from_rfc3339(&window_start_str)
            .unwrap()
            .with_timezone(&Utc),
        window_end: chrono::DateTime::parse_from_rfc3339(&window_end_str)
            .unwrap()
            .with_timezone(&Utc),
        bets_count: row.get(5)?,
        wins: row.get(6)?,
        win_rate: row.get(7)?,
        roi_at_minus_110: row.get(8)?,
        roi_using_actual_odds: row.get(9)?,
        drawdown: row.get(10)?,
        confidence_tier: parse_tier(&tier_str_val),
        sample_sufficient: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_fetch_latest_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let result = BacktestResult {
            strategy_name: "sharp_action".into(),
            variant_name: "SHARP_STRONG".into(),
            market: Market::Moneyline,
            window_start: now - chrono::Duration::days(30),
            window_end: now,
            bets_count: 40,
            wins: 24,
            win_rate: 0.6,
            roi_at_minus_110: 0.08,
            roi_using_actual_odds: None,
            drawdown: 0.05,
            confidence_tier: ConfidenceTier::Medium,
            sample_sufficient: true,
        };
        insert(&store, &result).unwrap();
        let fetched = latest_for_variant(&store, "sharp_action", "SHARP_STRONG", Market::Moneyline)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.bets_count, 40);
        assert_eq!(fetched.confidence_tier, ConfidenceTier::Medium);
    }
}
