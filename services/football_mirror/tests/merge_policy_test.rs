//! Update behavior per entity. League, team, venue and fixture rows take the
//! upstream payload wholesale, so a value the upstream stops sending becomes
//! null. Player and fixture statistics rows only change where the upstream
//! sends a value.

mod common;

use common::*;
use football_mirror::{
    entities::{fixture, fixture_player_stats, league, player, team},
    store::MergePolicy,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use test_log::test;

#[test]
fn test_policy_table() {
    assert_eq!(league::TABLE.policy, MergePolicy::Overwrite);
    assert_eq!(team::TABLE.policy, MergePolicy::Overwrite);
    assert_eq!(team::VENUE_TABLE.policy, MergePolicy::Overwrite);
    assert_eq!(fixture::TABLE.policy, MergePolicy::Overwrite);
    assert_eq!(player::TABLE.policy, MergePolicy::Selective);
    assert_eq!(fixture_player_stats::TABLE.policy, MergePolicy::Selective);
}

#[test(tokio::test)]
async fn test_league_overwrite_drops_missing_values() {
    let env = TestEnv::new().await;
    let mut tx = env.store.begin().await.unwrap();

    let with_logo = league::payload(&league_item(LEAGUE, "Premier League", Some("39.png")), LEAGUE, SEASON);
    let (row, created) = league::upsert(&mut tx, LEAGUE, SEASON, &with_logo).await.unwrap();
    assert!(created);
    assert_eq!(row.logo.as_deref(), Some("39.png"));
    assert_eq!(row.season_start.as_deref(), Some("2024-08-16"));

    let without_logo = league::payload(&league_item(LEAGUE, "Premier League", None), LEAGUE, SEASON);
    let (row, created) = league::upsert(&mut tx, LEAGUE, SEASON, &without_logo).await.unwrap();
    assert!(!created);
    assert_eq!(row.logo, None);
    tx.commit().await.unwrap();

    assert_eq!(env.count("league").await, 1);
}

#[test(tokio::test)]
async fn test_team_overwrite_and_single_venue() {
    let env = TestEnv::new().await;
    let mut tx = env.store.begin().await.unwrap();

    let first = team_item(33, "Manchester United", Some("MUN"), 556);
    team::upsert(&mut tx, 33, SEASON, &team::payload(&first, LEAGUE)).await.unwrap();
    let (venue, created) = team::upsert_venue(&mut tx, 33, &team::venue_payload(&first).unwrap())
        .await
        .unwrap();
    assert!(created);
    assert_eq!(venue.id, Some(556));

    // Code dropped upstream, venue moved
    let second = team_item(33, "Manchester United", None, 19_939);
    let (row, created) = team::upsert(&mut tx, 33, SEASON, &team::payload(&second, LEAGUE)).await.unwrap();
    assert!(!created);
    assert_eq!(row.code, None);
    let (venue, created) = team::upsert_venue(&mut tx, 33, &team::venue_payload(&second).unwrap())
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(venue.team_id, 33);
    assert_eq!(venue.id, Some(19_939));
    assert_eq!(venue.name.as_deref(), Some("Ground 19939"));
    tx.commit().await.unwrap();

    assert_eq!(env.count("venue").await, 1);
    let stored = team::venue(env.store.pool(), 33).await.unwrap().unwrap();
    assert_eq!(stored.id, Some(19_939));
}

#[test(tokio::test)]
async fn test_fixture_overwrite_drops_referee() {
    let env = TestEnv::new().await;
    let mut tx = env.store.begin().await.unwrap();

    let assigned = fixture_item(1001, 1_723_834_800, 33, 50, Some("M. Oliver"));
    let (row, _) = fixture::upsert(&mut tx, 1001, &fixture::payload(&assigned, LEAGUE, SEASON))
        .await
        .unwrap();
    assert_eq!(row.referee.as_deref(), Some("M. Oliver"));
    assert_eq!(row.status_short.as_deref(), Some("FT"));

    let unassigned = fixture_item(1001, 1_723_834_800, 33, 50, None);
    let (row, created) = fixture::upsert(&mut tx, 1001, &fixture::payload(&unassigned, LEAGUE, SEASON))
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(row.referee, None);
    assert_eq!(row.goals_home, Some(1));
    tx.commit().await.unwrap();
}

#[test(tokio::test)]
async fn test_player_selective_update_keeps_known_goals() {
    let env = TestEnv::new().await;
    let mut tx = env.store.begin().await.unwrap();
    let key = player::PlayerKey {
        id: 1100,
        team_id: 50,
        season: SEASON,
    };

    let scored = player::parse_record(&player_item(1100, "Haaland", Some(50), Some(LEAGUE), Some(18)), Some(LEAGUE))
        .unwrap()
        .with_league(LEAGUE);
    let (row, created) = player::upsert(&mut tx, key, &scored.payload).await.unwrap();
    assert!(created);
    assert_eq!(row.goals, 18);

    let unknown = player::parse_record(&player_item(1100, "Haaland", Some(50), Some(LEAGUE), None), Some(LEAGUE))
        .unwrap()
        .with_league(LEAGUE);
    let (row, created) = player::upsert(&mut tx, key, &unknown.payload).await.unwrap();
    assert!(!created);
    assert_eq!(row.goals, 18);
    assert_eq!(row.assists, 2);
    tx.commit().await.unwrap();
}

#[test(tokio::test)]
async fn test_new_player_defaults_missing_stats_to_zero() {
    let env = TestEnv::new().await;
    let mut tx = env.store.begin().await.unwrap();
    let record = player::parse_record(
        &json!({"player": {"id": 77, "name": "Unknown"}, "statistics": [{"team": {"id": 33}, "league": {"id": 39}}]}),
        Some(LEAGUE),
    )
    .unwrap()
    .with_league(LEAGUE);
    let key = player::PlayerKey {
        id: 77,
        team_id: 33,
        season: SEASON,
    };
    let (row, _) = player::upsert(&mut tx, key, &record.payload).await.unwrap();
    assert_eq!((row.goals, row.minutes, row.appearances), (0, 0, 0));
    assert_eq!(row.rating, None);
    tx.commit().await.unwrap();
}

#[test(tokio::test)]
async fn test_fixture_stats_selective_update() {
    let env = TestEnv::new().await;
    let mut tx = env.store.begin().await.unwrap();

    let entry = json!({
        "player": {"id": 882, "name": "David de Gea"},
        "statistics": [{"games": {"minutes": 90, "position": "G"}, "goals": {"conceded": 0, "saves": 5}}]
    });
    let row = fixture_player_stats::parse_player(&entry, LEAGUE, SEASON).unwrap();
    let (stats, created) = fixture_player_stats::upsert(&mut tx, 1001, 33, &row).await.unwrap();
    assert!(created);
    assert!(stats.clean_sheet);
    assert_eq!(stats.saves, 5);

    let partial = json!({"player": {"id": 882, "name": "David de Gea"}, "statistics": [{"games": {"rating": "7.9"}}]});
    let row = fixture_player_stats::parse_player(&partial, LEAGUE, SEASON).unwrap();
    let (stats, created) = fixture_player_stats::upsert(&mut tx, 1001, 33, &row).await.unwrap();
    assert!(!created);
    assert!(stats.clean_sheet);
    assert_eq!(stats.saves, 5);
    assert_eq!(stats.rating.as_deref(), Some("7.9"));
    tx.commit().await.unwrap();

    let rows = fixture_player_stats::for_fixture(env.store.pool(), 1001).await.unwrap();
    assert_eq!(rows.len(), 1);
}
