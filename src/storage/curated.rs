//! CURATED zone persistence (§4.5): the authoritative, enriched time series
//! plus the `games` dimension table that RAW/STAGING/CURATED all key off of.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::Store;
use crate::domain::{CuratedPoint, Daypart, Game, Market, MarketSizeTag, SharpTag, TimingBucket};
use crate::error::Result;

pub fn upsert_game(store: &Store, game: &Game) -> Result<i64> {
    let conn = store.lock();
    conn.execute(
        "INSERT INTO games
         (home_team_canonical, away_team_canonical, game_date_eastern, game_start_utc, park,
          market_size_tag, daypart, home_score, away_score, home_win, home_cover_spread, over, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(home_team_canonical, away_team_canonical, game_date_eastern) DO UPDATE SET
            game_start_utc=excluded.game_start_utc,
            park=excluded.park,
            market_size_tag=excluded.market_size_tag,
            daypart=excluded.daypart,
            home_score=excluded.home_score,
            away_score=excluded.away_score,
            home_win=excluded.home_win,
            home_cover_spread=excluded.home_cover_spread,
            over=excluded.over,
            resolved_at=excluded.resolved_at",
        params![
            game.home_team_canonical,
            game.away_team_canonical,
            game.game_date_eastern.to_string(),
            game.game_start_utc.to_rfc3339(),
            game.park,
            format!("{:?}", game.market_size_tag),
            format!("{:?}", game.daypart),
            game.home_score,
            game.away_score,
            game.home_win,
            game.home_cover_spread,
            game.over,
            game.resolved_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    let game_id: i64 = conn.query_row(
        "SELECT game_id FROM games WHERE home_team_canonical = ?1 AND away_team_canonical = ?2 AND game_date_eastern = ?3",
        params![game.home_team_canonical, game.away_team_canonical, game.game_date_eastern.to_string()],
        |row| row.get(0),
    )?;
    Ok(game_id)
}

pub fn get_game(store: &Store, game_id: i64) -> Result<Option<Game>> {
    let conn = store.lock();
    let mut stmt = conn.prepare_cached(
        "SELECT game_id, home_team_canonical, away_team_canonical, game_date_eastern, game_start_utc,
                park, market_size_tag, daypart, home_score, away_score, home_win, home_cover_spread,
                over, resolved_at
         FROM games WHERE game_id = ?1",
    )?;
    let mut rows = stmt.query(params![game_id])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    Ok(Some(row_to_game(row)?))
}

/// Games whose start time has passed but carry no outcome yet — the Game
/// Outcome Resolver's (C7) polling set (§4.6).
pub fn unresolved_past_start(store: &Store, now: DateTime<Utc>) -> Result<Vec<Game>> {
    let conn = store.lock();
    let mut stmt = conn.prepare_cached(
        "SELECT game_id, home_team_canonical, away_team_canonical, game_date_eastern, game_start_utc,
                park, market_size_tag, daypart, home_score, away_score, home_win, home_cover_spread,
                over, resolved_at
         FROM games
         WHERE resolved_at IS NULL AND game_start_utc < ?1",
    )?;
    let rows = stmt.query_map(params![now.to_rfc3339()], row_to_game)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Games whose `game_start_utc` falls in `[start, end)`, the shared window
/// query the Backtester (§4.10) and the live Detector Engine (§4.8) both use
/// to decide which games a window covers.
pub fn games_starting_in_window(store: &Store, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Game>> {
    let conn = store.lock();
    let mut stmt = conn.prepare_cached(
        "SELECT game_id, home_team_canonical, away_team_canonical, game_date_eastern, game_start_utc,
                park, market_size_tag, daypart, home_score, away_score, home_win, home_cover_spread,
                over, resolved_at
         FROM games
         WHERE game_start_utc >= ?1 AND game_start_utc < ?2
         ORDER BY game_id",
    )?;
    let rows = stmt.query_map(params![start.to_rfc3339(), end.to_rfc3339()], row_to_game)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn row_to_game(row: &rusqlite::Row) -> rusqlite::Result<Game> {
    let market_size_str: String = row.get(6)?;
    let daypart_str: String = row.get(7)?;
    let game_start_str: String = row.get(4)?;
    let resolved_str: Option<String> = row.get(13)?;
    Ok(Game {
        game_id: row.get(0)?,
        home_team_canonical: row.get(1)?,
        away_team_canonical: row.get(2)?,
        game_date_eastern: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
        game_start_utc: DateTime::parse_from_rfc3339(&game_start_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        park: row.get(5)?,
        market_size_tag: parse_market_size(&market_size_str),
        daypart: parse_daypart(&daypart_str),
        home_score: row.get(8)?,
        away_score: row.get(9)?,
        home_win: row.get(10)?,
        home_cover_spread: row.get(11)?,
        over: row.get(12)?,
        resolved_at: resolved_str.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }),
    })
}

fn parse_market_size(s: &str) -> MarketSizeTag {
    match s {
        "Large" => MarketSizeTag::Large,
        "Medium" => MarketSizeTag::Medium,
        _ => MarketSizeTag::Small,
    }
}

fn parse_daypart(s: &str) -> Daypart {
    match s {
        "Day" => Daypart::Day,
        "Twilight" => Daypart::Twilight,
        "Primetime" => Daypart::Primetime,
        _ => Daypart::Night,
    }
}

pub fn insert_point(store: &Store, point: &CuratedPoint) -> Result<Option<i64>> {
    let conn = store.lock();
    let changes = conn.execute(
        "INSERT OR IGNORE INTO curated_points
         (game_id, source, book, market, collected_at, money_pct, bet_pct, money_minus_bet,
          sharp_tag, timing_bucket, quality_score, split_value, line_movement_from_prev,
          book_credibility_weight)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            point.game_id,
            point.source,
            point.book,
            point.market.as_str(),
            point.collected_at.to_rfc3339(),
            point.money_pct,
            point.bet_pct,
            point.money_minus_bet,
            format!("{:?}", point.sharp_tag),
            format!("{:?}", point.timing_bucket),
            point.quality_score,
            point.split_value,
            point.line_movement_from_prev,
            point.book_credibility_weight,
        ],
    )?;
    if changes == 0 {
        return Ok(None);
    }
    Ok(Some(conn.last_insert_rowid()))
}

pub fn for_game(store: &Store, game_id: i64, market: Market) -> Result<Vec<CuratedPoint>> {
    let conn = store.lock();
    let mut stmt = conn.prepare_cached(
        "SELECT id, game_id, source, book, market, collected_at, money_pct, bet_pct,
                money_minus_bet, sharp_tag, timing_bucket, quality_score, split_value,
                line_movement_from_prev, book_credibility_weight
         FROM curated_points
         WHERE game_id = ?1 AND market = ?2
         ORDER BY collected_at",
    )?;
    let rows = stmt.query_map(params![game_id, market.as_str()], row_to_point)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// The most recent closing snapshot per (source, book) for a game/market —
/// used by the Detector Engine's line-movement features (§4.5 GLOSSARY:
/// "closing snapshot").
pub fn closing_snapshot(store: &Store, game_id: i64, market: Market) -> Result<Vec<CuratedPoint>> {
    let conn = store.lock();
    let mut stmt = conn.prepare_cached(
        "SELECT id, game_id, source, book, market, collected_at, money_pct, bet_pct,
                money_minus_bet, sharp_tag, timing_bucket, quality_score, split_value,
                line_movement_from_prev, book_credibility_weight
         FROM curated_points c
         WHERE game_id = ?1 AND market = ?2
           AND collected_at = (
               SELECT MAX(collected_at) FROM curated_points
               WHERE game_id = c.game_id AND market = c.market AND source = c.source AND book = c.book
           )",
    )?;
    let rows = stmt.query_map(params![game_id, market.as_str()], row_to_point)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Per-game average `bet_pct` for every prior game (before `before`, and not
/// `exclude_game_id`) where `team` was the home team in this market — the
/// historical read Team/Market Bias (§4.9) needs to separate a team's
/// persistent public-bet draw from this game's one-off reading.
pub fn team_historical_bet_pct(
    store: &Store,
    team: &str,
    market: Market,
    before: DateTime<Utc>,
    exclude_game_id: i64,
) -> Result<Vec<f64>> {
    let conn = store.lock();
    let mut stmt = conn.prepare_cached(
        "SELECT AVG(cp.bet_pct)
         FROM curated_points cp
         JOIN games g ON g.game_id = cp.game_id
         WHERE g.home_team_canonical = ?1
           AND cp.market = ?2
           AND g.game_start_utc < ?3
           AND g.game_id != ?4
           AND cp.bet_pct IS NOT NULL
           AND cp.collected_at = (
               SELECT MAX(collected_at) FROM curated_points
               WHERE game_id = cp.game_id AND market = cp.market AND source = cp.source AND book = cp.book
           )
         GROUP BY g.game_id",
    )?;
    let rows = stmt.query_map(params![team, market.as_str(), before.to_rfc3339(), exclude_game_id], |row| {
        row.get::<_, f64>(0)
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn row_to_point(row: &rusqlite::Row) -> rusqlite::Result<CuratedPoint> {
    let market_str: String = row.get(4)?;
    let collected_at_str: String = row.get(5)?;
    let sharp_tag_str: String = row.get(9)?;
    let timing_bucket_str: String = row.get(10)?;
    Ok(CuratedPoint {
        id: row.get(0)?,
        game_id: row.get(1)?,
        source: row.get(2)?,
        book: row.get(3)?,
        market: market_str.parse().unwrap_or(Market::Moneyline),
        collected_at: DateTime::parse_from_rfc3339(&collected_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        money_pct: row.get(6)?,
        bet_pct: row.get(7)?,
        money_minus_bet: row.get(8)?,
        sharp_tag: parse_sharp_tag(&sharp_tag_str),
        timing_bucket: parse_timing_bucket(&timing_bucket_str),
        quality_score: row.get(11)?,
        split_value: row.get(12)?,
        line_movement_from_prev: row.get(13)?,
        book_credibility_weight: row.get(14)?,
    })
}

fn parse_sharp_tag(s: &str) -> SharpTag {
    match s {
        "StrongHome" => SharpTag::StrongHome,
        "ModerateHome" => SharpTag::ModerateHome,
        "WeakHome" => SharpTag::WeakHome,
        "WeakAway" => SharpTag::WeakAway,
        "ModerateAway" => SharpTag::ModerateAway,
        "StrongAway" => SharpTag::StrongAway,
        _ => SharpTag::None,
    }
}

fn parse_timing_bucket(s: &str) -> TimingBucket {
    match s {
        "Opening" => TimingBucket::Opening,
        "Early" => TimingBucket::Early,
        "SameDay" => TimingBucket::SameDay,
        "Late" => TimingBucket::Late,
        "Closing2h" => TimingBucket::Closing2h,
        "ClosingHour" => TimingBucket::ClosingHour,
        _ => TimingBucket::UltraLate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Daypart, MarketSizeTag};

    fn sample_game() -> Game {
        Game {
            game_id: 0,
            home_team_canonical: "New York Yankees".into(),
            away_team_canonical: "Boston Red Sox".into(),
            game_date_eastern: "2026-07-01".parse().unwrap(),
            game_start_utc: Utc::now(),
            park: "Yankee Stadium".into(),
            market_size_tag: MarketSizeTag::Large,
            daypart: Daypart::Night,
            home_score: None,
            away_score: None,
            home_win: None,
            home_cover_spread: None,
            over: None,
            resolved_at: None,
        }
    }

    #[test]
    fn upsert_game_is_idempotent_by_teams_and_date() {
        let store = Store::open_in_memory().unwrap();
        let id1 = upsert_game(&store, &sample_game()).unwrap();
        let id2 = upsert_game(&store, &sample_game()).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn unresolved_past_start_finds_pending_games() {
        let store = Store::open_in_memory().unwrap();
        let mut game = sample_game();
        game.game_start_utc = Utc::now() - chrono::Duration::hours(5);
        upsert_game(&store, &game).unwrap();

        let pending = unresolved_past_start(&store, Utc::now()).unwrap();
        assert_eq!(pending.len(), 1);
    }
}
