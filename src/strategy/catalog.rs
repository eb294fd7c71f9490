//! Strategy Catalog (C8, §4.7): an in-memory, restart-persisted registry of
//! [`StrategyVariant`] rows. Built-in strategies are seeded on first open;
//! operators may add further variants of the same 12 strategies with
//! different thresholds (§4.7: "Variant — a specific parameterization of a
//! strategy").

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::params;

use crate::domain::{Market, StrategyVariant, VariantStatus};
use crate::error::Result;
use crate::storage::Store;

/// The 12 built-in strategy names (§4.7), in catalog order. Detector
/// dispatch in [`super::detectors`] matches on these exact strings.
pub const BUILTIN_STRATEGIES: &[&str] = &[
    "sharp_action",
    "line_movement",
    "book_conflicts",
    "public_fade",
    "consensus",
    "opposing_markets",
    "late_sharp_flip",
    "total_sweet_spots",
    "underdog_ml_value",
    "team_market_bias",
    "timing_patterns",
    "signal_combinations",
];

fn thresholds(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Default variant definitions for every built-in strategy, thresholds taken
/// verbatim from §4.9.
pub fn builtin_variants() -> Vec<StrategyVariant> {
    let all_markets = vec![Market::Moneyline, Market::Spread, Market::Total];
    vec![
        StrategyVariant {
            strategy_name: "sharp_action".into(),
            variant_name: "SHARP_STRONG".into(),
            description: "Money-vs-bet differential, STRONG tier".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[("min_differential", 15.0), ("min_volume", 100.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 1.0,
        },
        StrategyVariant {
            strategy_name: "sharp_action".into(),
            variant_name: "SHARP_MODERATE".into(),
            description: "Money-vs-bet differential, MODERATE tier".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[("min_differential", 10.0), ("min_volume", 100.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.8,
        },
        StrategyVariant {
            strategy_name: "sharp_action".into(),
            variant_name: "SHARP_WEAK".into(),
            description: "Money-vs-bet differential, WEAK tier".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[("min_differential", 5.0), ("min_volume", 100.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.5,
        },
        StrategyVariant {
            strategy_name: "line_movement".into(),
            variant_name: "BIG_MOVE_FOLLOW".into(),
            description: "Opening-to-closing move, follow variant".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[("min_move_ml", 10.0), ("min_move_points", 1.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.9,
        },
        StrategyVariant {
            strategy_name: "book_conflicts".into(),
            variant_name: "BOOK_CONFLICT_HIGH".into(),
            description: "Cross-book sharp-tag divergence".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[("min_distinct_tags", 2.0), ("min_stddev", 10.0), ("min_volume", 100.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.85,
        },
        StrategyVariant {
            strategy_name: "public_fade".into(),
            variant_name: "FADE_HEAVY".into(),
            description: "Heavy public consensus fade, ≥85% across ≥2 books".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[("heavy_pct", 85.0), ("min_books", 2.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.75,
        },
        StrategyVariant {
            strategy_name: "public_fade".into(),
            variant_name: "FADE_MODERATE".into(),
            description: "Moderate public consensus fade, ≥75% across ≥3 books".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[("moderate_pct", 75.0), ("min_single_book_pct", 70.0), ("min_books", 3.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.6,
        },
        StrategyVariant {
            strategy_name: "consensus".into(),
            variant_name: "CONSENSUS_HEAVY".into(),
            description: "Money and bets both ≥90 (or ≤10)".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[("heavy_money", 90.0), ("heavy_bet", 90.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.7,
        },
        StrategyVariant {
            strategy_name: "consensus".into(),
            variant_name: "CONSENSUS_MIXED".into(),
            description: "Money ≥80 AND bets ≥60".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[("mixed_money", 80.0), ("mixed_bet", 60.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.55,
        },
        StrategyVariant {
            strategy_name: "opposing_markets".into(),
            variant_name: "ML_SPREAD_OPPOSED".into(),
            description: "Moneyline and spread point to opposite teams".into(),
            markets: vec![Market::Moneyline, Market::Spread],
            thresholds: thresholds(&[("min_differential", 5.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.65,
        },
        StrategyVariant {
            strategy_name: "late_sharp_flip".into(),
            variant_name: "FOLLOW_EARLY".into(),
            description: "Early strong signal contradicted late; follow early (§9 canonical)".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[
                ("early_min_differential", 15.0),
                ("early_hours_before", 6.0),
                ("late_hours_before", 3.0),
            ]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.7,
        },
        StrategyVariant {
            strategy_name: "total_sweet_spots".into(),
            variant_name: "KEY_TOTAL_SWEET_SPOT".into(),
            description: "Bias at key totals {7.5, 8.5, 9.5}".into(),
            markets: vec![Market::Total],
            thresholds: thresholds(&[("min_public_pct", 65.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.8,
        },
        StrategyVariant {
            strategy_name: "underdog_ml_value".into(),
            variant_name: "DOG_VALUE".into(),
            description: "Public heavy on favorite; back the dog".into(),
            markets: vec![Market::Moneyline],
            thresholds: thresholds(&[("min_public_pct_favorite", 65.0), ("favorite_odds_ceiling", -100.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.7,
        },
        StrategyVariant {
            strategy_name: "team_market_bias".into(),
            variant_name: "TEAM_HISTORICAL_BIAS".into(),
            description: "Per-team historical over/underbet pattern".into(),
            markets: all_markets.clone(),
            thresholds: thresholds(&[("min_sample_games", 20.0), ("min_bias_pct", 5.0)]),
            min_sample_size: 20,
            status: VariantStatus::Shadow,
            last_tuned_at: None,
            edge_weight: 0.5,
        },
        StrategyVariant {
            strategy_name: "timing_patterns".into(),
            variant_name: "STEAM_AND_RLM".into(),
            description: "Early-persistent, late-developing, steam, RLM patterns".into(),
            markets: all_markets,
            thresholds: thresholds(&[("steam_window_minutes", 15.0), ("min_differential", 10.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.75,
        },
        StrategyVariant {
            strategy_name: "signal_combinations".into(),
            variant_name: "TRIPLE_ALIGNMENT".into(),
            description: "Multi-market consensus / fade-conflict / triple alignment".into(),
            markets: vec![Market::Moneyline, Market::Spread, Market::Total],
            thresholds: thresholds(&[("min_markets_aligned", 2.0)]),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 0.9,
        },
    ]
}

/// Load the catalog, seeding built-ins on an empty table.
pub fn load_or_seed(store: &Store) -> Result<Vec<StrategyVariant>> {
    let existing = load_all(store)?;
    if !existing.is_empty() {
        return Ok(existing);
    }
    for variant in builtin_variants() {
        upsert(store, &variant)?;
    }
    load_all(store)
}

pub fn load_all(store: &Store) -> Result<Vec<StrategyVariant>> {
    let conn = store.lock();
    let mut stmt = conn.prepare(
        "SELECT strategy_name, variant_name, description, markets_json, thresholds_json,
                min_sample_size, status, last_tuned_at, edge_weight
         FROM strategy_variants
         ORDER BY strategy_name, variant_name",
    )?;
    let rows = stmt.query_map([], row_to_variant)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn upsert(store: &Store, variant: &StrategyVariant) -> Result<()> {
    let conn = store.lock();
    conn.execute(
        "INSERT INTO strategy_variants
         (strategy_name, variant_name, description, markets_json, thresholds_json,
          min_sample_size, status, last_tuned_at, edge_weight)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(strategy_name, variant_name) DO UPDATE SET
            description=excluded.description,
            markets_json=excluded.markets_json,
            thresholds_json=excluded.thresholds_json,
            min_sample_size=excluded.min_sample_size,
            status=excluded.status,
            last_tuned_at=excluded.last_tuned_at,
            edge_weight=excluded.edge_weight",
        params![
            variant.strategy_name,
            variant.variant_name,
            variant.description,
            serde_json::to_string(&variant.markets).unwrap_or_default(),
            serde_json::to_string(&variant.thresholds).unwrap_or_default(),
            variant.min_sample_size,
            status_str(variant.status),
            variant.last_tuned_at.map(|t| t.to_rfc3339()),
            variant.edge_weight,
        ],
    )?;
    Ok(())
}

/// Operator control: enable/disable/shadow a variant by key (§6 Inbound
/// Interface: "override a variant status").
pub fn set_status(
    store: &Store,
    strategy_name: &str,
    variant_name: &str,
    status: VariantStatus,
) -> Result<()> {
    let conn = store.lock();
    conn.execute(
        "UPDATE strategy_variants SET status = ?1, last_tuned_at = ?2
         WHERE strategy_name = ?3 AND variant_name = ?4",
        params![status_str(status), Utc::now().to_rfc3339(), strategy_name, variant_name],
    )?;
    Ok(())
}

fn status_str(status: VariantStatus) -> &'static str {
    match status {
        VariantStatus::Active => "ACTIVE",
        VariantStatus::Shadow => "SHADOW",
        VariantStatus::Disabled => "DISABLED",
    }
}

fn parse_status(s: &str) -> VariantStatus {
    match s {
        "SHADOW" => VariantStatus::Shadow,
        "DISABLED" => VariantStatus::Disabled,
        _ => VariantStatus::Active,
    }
}

fn row_to_variant(row: &rusqlite::Row) -> rusqlite::Result<StrategyVariant> {
    let markets_json: String = row.get(3)?;
    let thresholds_json: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    let last_tuned_str: Option<String> = row.get(7)?;
    Ok(StrategyVariant {
        strategy_name: row.get(0)?,
        variant_name: row.get(1)?,
        description: row.get(2)?,
        markets: serde_json::from_str(&markets_json).unwrap_or_default(),
        thresholds: serde_json::from_str(&thresholds_json).unwrap_or_default(),
        min_sample_size: row.get(5)?,
        status: parse_status(&status_str),
        last_tuned_at: last_tuned_str.and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }),
        edge_weight: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_all_twelve_builtin_strategies() {
        let store = Store::open_in_memory().unwrap();
        let variants = load_or_seed(&store).unwrap();
        let strategies: std::collections::BTreeSet<_> =
            variants.iter().map(|v| v.strategy_name.clone()).collect();
        assert_eq!(strategies.len(), BUILTIN_STRATEGIES.len());
    }

    #[test]
    fn set_status_persists_across_reload() {
        let store = Store::open_in_memory().unwrap();
        load_or_seed(&store).unwrap();
        set_status(&store, "sharp_action", "SHARP_STRONG", VariantStatus::Disabled).unwrap();
        let variants = load_all(&store).unwrap();
        let v = variants
            .iter()
            .find(|v| v.variant_name == "SHARP_STRONG")
            .unwrap();
        assert_eq!(v.status, VariantStatus::Disabled);
    }
}
