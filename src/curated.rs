//! Curated Builder (C6, §4.5): consumes STAGING rows for one
//! `(game, source, book, market)` series and produces the authoritative,
//! enriched CURATED time series — sharp tag, quality score, timing bucket,
//! book credibility weight, and the closing snapshot every strategy reads.

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::domain::{CuratedPoint, Market, SharpTag, TimingBucket};
use crate::error::Result;
use crate::storage::{curated as curated_store, staging as staging_store, Store};

/// Fraction of `{money_pct, bet_pct, split_value}` present, per §4.5:
/// "quality_score = fraction of expected fields present".
fn quality_score(money_pct: Option<f64>, bet_pct: Option<f64>, split_value: &Option<String>) -> f64 {
    let present = [money_pct.is_some(), bet_pct.is_some(), split_value.is_some()]
        .iter()
        .filter(|p| **p)
        .count();
    present as f64 / 3.0
}

/// Build (or extend) the CURATED series for one `(game_id, source, book,
/// market)` from its STAGING rows, enriching each with the derived fields
/// §4.4/§4.5 ask for. Idempotent via `curated_points`' unique constraint.
pub fn build_series(
    store: &Store,
    config: &AppConfig,
    game_id: i64,
    market: Market,
    game_start_utc: DateTime<Utc>,
) -> Result<Vec<i64>> {
    let staged = staging_store::for_game_market(store, game_id, market)?;
    let mut inserted_ids = Vec::new();

    // Track previous point per (source, book) for line_movement_from_prev.
    use std::collections::HashMap;
    let mut prev_split: HashMap<(String, String), Option<String>> = HashMap::new();

    for row in staged {
        let money_minus_bet = match (row.money_pct, row.bet_pct) {
            (Some(m), Some(b)) => Some(m - b),
            _ => None,
        };
        let sharp_tag = money_minus_bet
            .map(SharpTag::from_differential)
            .unwrap_or(SharpTag::None);

        let hours_before = (game_start_utc - row.collected_at).num_seconds() as f64 / 3600.0;
        let timing_bucket = TimingBucket::from_hours_before(hours_before.max(0.0));

        let credibility_weight = config.book_credibility.weight(&row.book);
        let quality = quality_score(row.money_pct, row.bet_pct, &row.split_value);

        let key = (row.source.clone(), row.book.clone());
        let line_movement = match (prev_split.get(&key), &row.split_value) {
            (Some(Some(prev)), Some(curr)) => {
                match (prev.parse::<f64>(), curr.parse::<f64>()) {
                    (Ok(p), Ok(c)) => Some(c - p),
                    _ => None,
                }
            }
            _ => None,
        };
        prev_split.insert(key, row.split_value.clone());

        let point = CuratedPoint {
            id: None,
            game_id: row.game_id,
            source: row.source,
            book: row.book,
            market: row.market,
            collected_at: row.collected_at,
            money_pct: row.money_pct,
            bet_pct: row.bet_pct,
            money_minus_bet,
            sharp_tag,
            timing_bucket,
            quality_score: quality,
            split_value: row.split_value,
            line_movement_from_prev: line_movement,
            book_credibility_weight: credibility_weight,
        };

        if let Some(id) = curated_store::insert_point(store, &point)? {
            inserted_ids.push(id);
        }
    }

    Ok(inserted_ids)
}

/// Closing snapshot: the point whose `collected_at` is closest to
/// `closing_snapshot_target_minutes` pre-game, tie-broken by latest
/// `collected_at` (§4.5).
pub fn closing_snapshot(
    store: &Store,
    config: &AppConfig,
    game_id: i64,
    market: Market,
    game_start_utc: DateTime<Utc>,
) -> Result<Vec<CuratedPoint>> {
    let points = curated_store::for_game(store, game_id, market)?;
    let target = chrono::Duration::minutes(config.defaults.closing_snapshot_target_minutes);
    let target_time = game_start_utc - target;

    use std::collections::HashMap;
    let mut best: HashMap<(String, String), CuratedPoint> = HashMap::new();
    for point in points {
        let key = (point.source.clone(), point.book.clone());
        let dist = (point.collected_at - target_time).num_seconds().abs();
        match best.get(&key) {
            None => {
                best.insert(key, point);
            }
            Some(existing) => {
                let existing_dist = (existing.collected_at - target_time).num_seconds().abs();
                if dist < existing_dist
                    || (dist == existing_dist && point.collected_at > existing.collected_at)
                {
                    best.insert(key, point);
                }
            }
        }
    }

    let mut out: Vec<CuratedPoint> = best.into_values().collect();
    out.sort_by(|a, b| a.source.cmp(&b.source).then(a.book.cmp(&b.book)));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Daypart, Game, MarketSizeTag};

    fn setup_game(store: &Store, start: DateTime<Utc>) -> i64 {
        let game = Game {
            game_id: 0,
            home_team_canonical: "New York Yankees".into(),
            away_team_canonical: "Boston Red Sox".into(),
            game_date_eastern: start.date_naive(),
            game_start_utc: start,
            park: "Yankee Stadium".into(),
            market_size_tag: MarketSizeTag::Large,
            daypart: Daypart::Night,
            home_score: None,
            away_score: None,
            home_win: None,
            home_cover_spread: None,
            over: None,
            resolved_at: None,
        };
        curated_store::upsert_game(store, &game).unwrap()
    }

    #[test]
    fn sharp_tag_follows_differential_thresholds() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let start = Utc::now() + chrono::Duration::hours(2);
        let game_id = setup_game(&store, start);

        let point = staging_store::StagingPoint {
            id: None,
            game_id,
            source: "vsin".into(),
            book: "Circa".into(),
            market: Market::Moneyline,
            collected_at: start - chrono::Duration::minutes(30),
            money_pct: Some(80.0),
            bet_pct: Some(60.0),
            split_value: Some("-150".into()),
            ingestion_sequence: 0,
        };
        staging_store::insert(&store, &point).unwrap();

        let ids = build_series(&store, &config, game_id, Market::Moneyline, start).unwrap();
        assert_eq!(ids.len(), 1);

        let curated_points = curated_store::for_game(&store, game_id, Market::Moneyline).unwrap();
        assert_eq!(curated_points[0].sharp_tag, SharpTag::StrongHome);
        assert_eq!(curated_points[0].timing_bucket, TimingBucket::ClosingHour);
    }

    #[test]
    fn closing_snapshot_picks_point_nearest_target() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let start = Utc::now() + chrono::Duration::hours(2);
        let game_id = setup_game(&store, start);

        for (minutes_before, money) in [(60, 70.0), (6, 75.0), (1, 78.0)] {
            let point = staging_store::StagingPoint {
                id: None,
                game_id,
                source: "vsin".into(),
                book: "Circa".into(),
                market: Market::Moneyline,
                collected_at: start - chrono::Duration::minutes(minutes_before),
                money_pct: Some(money),
                bet_pct: Some(50.0),
                split_value: Some("-150".into()),
                ingestion_sequence: 0,
            };
            staging_store::insert(&store, &point).unwrap();
        }
        build_series(&store, &config, game_id, Market::Moneyline, start).unwrap();

        let snapshot = closing_snapshot(&store, &config, game_id, Market::Moneyline, start).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].money_pct, Some(75.0));
    }
}
