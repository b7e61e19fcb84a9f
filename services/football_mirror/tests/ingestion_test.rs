mod common;

use common::*;
use mockito::Mock;
use football_mirror::{
    config::IngestionConfig,
    error::MirrorError,
    ingestion::{IngestionService, Stage},
    lease::IngestionLease,
    status::get_ingestion_status,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use test_log::test;

fn service(env: &TestEnv) -> IngestionService {
    IngestionService::new(Arc::clone(&env.api), env.store.clone(), &IngestionConfig::default())
}

fn page_query(page: i64) -> Vec<(&'static str, String)> {
    let mut query = scope_query(LEAGUE, SEASON);
    query.push(("page", page.to_string()));
    query
}

/// League with two teams, three players over two pages, two fixtures.
/// Returns the player page mocks.
async fn mock_small_league(env: &mut TestEnv, runs: usize) -> Vec<Mock> {
    env.mock_get(
        "/leagues",
        &[("id", LEAGUE.to_string())],
        envelope("leagues", vec![league_item(LEAGUE, "Premier League", Some("39.png"))], 1, 1),
        runs,
    )
    .await;
    env.mock_get(
        "/teams",
        &scope_query(LEAGUE, SEASON),
        envelope(
            "teams",
            vec![
                team_item(33, "Manchester United", Some("MUN"), 556),
                team_item(50, "Manchester City", Some("MCI"), 555),
            ],
            1,
            1,
        ),
        runs,
    )
    .await;
    let page_one = env.mock_get(
        "/players",
        &page_query(1),
        envelope(
            "players",
            vec![
                player_item(882, "de Gea", Some(33), Some(LEAGUE), Some(0)),
                player_item(1100, "Haaland", Some(50), Some(LEAGUE), Some(27)),
            ],
            1,
            2,
        ),
        runs,
    )
    .await;
    let page_two = env.mock_get(
        "/players",
        &page_query(2),
        envelope(
            "players",
            vec![player_item(909, "Rashford", Some(33), Some(LEAGUE), Some(7))],
            2,
            2,
        ),
        runs,
    )
    .await;
    env.mock_get(
        "/fixtures",
        &scope_query(LEAGUE, SEASON),
        envelope(
            "fixtures",
            vec![
                fixture_item(1001, 1_723_834_800, 33, 50, Some("M. Oliver")),
                fixture_item(1002, 1_724_439_600, 50, 33, None),
            ],
            1,
            1,
        ),
        runs,
    )
    .await;
    for fixture_id in [1001, 1002] {
        env.mock_get(
            "/fixtures/players",
            &[("fixture", fixture_id.to_string())],
            envelope(
                "fixtures/players",
                vec![fixture_players_block(33, &[882, 909]), fixture_players_block(50, &[1100])],
                1,
                1,
            ),
            runs,
        )
        .await;
    }
    vec![page_one, page_two]
}

#[test(tokio::test)]
async fn test_ingestion_is_idempotent() {
    let mut env = TestEnv::new().await;
    mock_small_league(&mut env, 2).await;
    let service = service(&env);

    let first = service.ingest_league_data(LEAGUE, SEASON).await.unwrap();
    assert!(first.league.as_ref().unwrap().created);
    assert_eq!(first.teams.as_ref().unwrap().created_teams, 2);
    assert_eq!(first.players.as_ref().unwrap().created_players, 3);
    assert_eq!(first.players.as_ref().unwrap().pages, 2);
    assert_eq!(first.fixtures.as_ref().unwrap().created_fixtures, 2);
    assert_eq!(first.player_stats.as_ref().unwrap().created_player_stats, 6);
    assert!(first.finished_at.is_some());

    let counts_after_first = get_ingestion_status(&env.store, LEAGUE, SEASON).await.unwrap();

    let second = service.ingest_league_data(LEAGUE, SEASON).await.unwrap();
    assert!(!second.league.as_ref().unwrap().created);
    assert_eq!(second.teams.as_ref().unwrap().created_teams, 0);
    assert_eq!(second.teams.as_ref().unwrap().ingested_teams, 2);
    assert_eq!(second.players.as_ref().unwrap().created_players, 0);
    assert_eq!(second.fixtures.as_ref().unwrap().created_fixtures, 0);
    assert_eq!(second.player_stats.as_ref().unwrap().created_player_stats, 0);
    assert_eq!(second.player_stats_count(), 6);

    let counts_after_second = get_ingestion_status(&env.store, LEAGUE, SEASON).await.unwrap();
    assert_eq!(counts_after_first.teams_count, counts_after_second.teams_count);
    assert_eq!(counts_after_first.players_count, counts_after_second.players_count);
    assert_eq!(counts_after_first.fixtures_count, counts_after_second.fixtures_count);
    assert_eq!(
        counts_after_first.player_stats_count,
        counts_after_second.player_stats_count
    );
    assert_eq!(counts_after_second.teams_count, 2);
    assert_eq!(counts_after_second.players_count, 3);
    assert_eq!(env.count("venue").await, 2);

    assert!(!IngestionLease::is_held(&env.store, LEAGUE, SEASON).await.unwrap());
}

#[test(tokio::test)]
async fn test_player_pages_each_requested_once() {
    let mut env = TestEnv::new().await;
    let page_mocks = mock_small_league(&mut env, 1).await;
    let service = service(&env);

    let report = service.ingest_league_data(LEAGUE, SEASON).await.unwrap();
    let players = report.players.unwrap();
    assert_eq!(players.total_players, 3);

    let mut ingested = players.player_ids.clone();
    ingested.sort_unstable();
    let mut stored: Vec<i64> = sqlx::query_scalar("SELECT id FROM player WHERE league_id = ? AND season = ?")
        .bind(LEAGUE)
        .bind(SEASON)
        .fetch_all(env.store.pool())
        .await
        .unwrap();
    stored.sort_unstable();
    assert_eq!(ingested, vec![882, 909, 1100]);
    assert_eq!(stored, ingested);

    for mock in page_mocks {
        mock.assert_async().await;
    }
}

#[test(tokio::test)]
async fn test_failed_fixture_does_not_stop_the_others() {
    let mut env = TestEnv::new().await;
    let fixture_ids: Vec<i64> = (1..=10).map(|n| 2000 + n).collect();
    let failing = fixture_ids[2];

    env.mock_get(
        "/leagues",
        &[("id", LEAGUE.to_string())],
        envelope("leagues", vec![league_item(LEAGUE, "Premier League", None)], 1, 1),
        1,
    )
    .await;
    env.mock_get("/teams", &scope_query(LEAGUE, SEASON), envelope("teams", vec![], 1, 1), 1)
        .await;
    env.mock_get("/players", &page_query(1), envelope("players", vec![], 1, 1), 1)
        .await;
    let fixtures = fixture_ids
        .iter()
        .enumerate()
        .map(|(i, id)| fixture_item(*id, 1_723_834_800 + i as i64 * 3600, 33, 50, None))
        .collect();
    env.mock_get("/fixtures", &scope_query(LEAGUE, SEASON), envelope("fixtures", fixtures, 1, 1), 1)
        .await;

    let mut mocks = Vec::new();
    for id in &fixture_ids {
        let query = [("fixture", id.to_string())];
        let mock = if *id == failing {
            env.mock_failure("/fixtures/players", &query, 500, 1).await
        } else {
            env.mock_get(
                "/fixtures/players",
                &query,
                envelope("fixtures/players", vec![fixture_players_block(33, &[*id + 10_000])], 1, 1),
                1,
            )
            .await
        };
        mocks.push(mock);
    }

    let report = service(&env).ingest_league_data(LEAGUE, SEASON).await.unwrap();
    let stats = report.player_stats.unwrap();
    assert_eq!(stats.total_fixtures, 10);
    assert_eq!(stats.processed_fixtures, 9);
    assert_eq!(stats.failed_fixtures, vec![failing]);
    assert_eq!(stats.ingested_player_stats, 9);
    assert_eq!(env.count("fixture_player_stats").await, 9);

    for mock in mocks {
        mock.assert_async().await;
    }
}

#[test(tokio::test)]
async fn test_empty_league_fails_first_stage() {
    let mut env = TestEnv::new().await;
    env.mock_get("/leagues", &[("id", "40".to_string())], envelope("leagues", vec![], 1, 1), 1)
        .await;
    let teams = env
        .mock_get("/teams", &scope_query(40, SEASON), envelope("teams", vec![], 1, 1), 0)
        .await;

    let err = service(&env).ingest_league_data(40, SEASON).await.unwrap_err();
    match err {
        MirrorError::StageFailed { stage, report, source } => {
            assert_eq!(stage, Stage::League);
            assert!(report.league.is_none());
            assert!(matches!(*source, MirrorError::UpstreamData(_)));
        }
        other => panic!("unexpected error: {}", other),
    }

    teams.assert_async().await;
    assert_eq!(env.count("league").await, 0);
    assert!(!IngestionLease::is_held(&env.store, 40, SEASON).await.unwrap());
}

#[test(tokio::test)]
async fn test_stage_failure_keeps_earlier_stages() {
    let mut env = TestEnv::new().await;
    env.mock_get(
        "/leagues",
        &[("id", LEAGUE.to_string())],
        envelope("leagues", vec![league_item(LEAGUE, "Premier League", None)], 1, 1),
        1,
    )
    .await;
    env.mock_get(
        "/teams",
        &scope_query(LEAGUE, SEASON),
        envelope("teams", vec![team_item(33, "Manchester United", Some("MUN"), 556)], 1, 1),
        1,
    )
    .await;
    env.mock_get(
        "/players",
        &page_query(1),
        envelope("players", vec![player_item(882, "de Gea", Some(33), Some(LEAGUE), Some(0))], 1, 2),
        1,
    )
    .await;
    env.mock_failure("/players", &page_query(2), 503, 1).await;

    let err = service(&env).ingest_league_data(LEAGUE, SEASON).await.unwrap_err();
    let MirrorError::StageFailed { stage, report, source } = err else {
        panic!("expected a stage failure");
    };
    assert_eq!(stage, Stage::Players);
    assert_eq!(report.teams.as_ref().map(|t| t.ingested_teams), Some(1));
    assert!(matches!(*source, MirrorError::UpstreamUnavailable(_)));

    // Teams committed, the aborted players stage wrote nothing
    assert_eq!(env.count("team").await, 1);
    assert_eq!(env.count("player").await, 0);
    assert!(!IngestionLease::is_held(&env.store, LEAGUE, SEASON).await.unwrap());
}

#[test(tokio::test)]
async fn test_held_lease_blocks_ingestion() {
    let mut env = TestEnv::new().await;
    let leagues = env
        .mock_get("/leagues", &[("id", LEAGUE.to_string())], envelope("leagues", vec![], 1, 1), 0)
        .await;

    let lease = IngestionLease::acquire(&env.store, LEAGUE, SEASON, 3600).await.unwrap();
    let err = service(&env).ingest_league_data(LEAGUE, SEASON).await.unwrap_err();
    assert!(matches!(
        err,
        MirrorError::ConcurrentIngestion { league_id: LEAGUE, season: SEASON }
    ));
    leagues.assert_async().await;

    lease.release(&env.store).await.unwrap();
    assert!(!IngestionLease::is_held(&env.store, LEAGUE, SEASON).await.unwrap());
}

#[test(tokio::test)]
async fn test_bad_items_are_counted_not_fatal() {
    let mut env = TestEnv::new().await;
    env.mock_get(
        "/leagues",
        &[("id", LEAGUE.to_string())],
        envelope("leagues", vec![league_item(LEAGUE, "Premier League", None)], 1, 1),
        1,
    )
    .await;
    let teams: Vec<Value> = vec![
        team_item(33, "Manchester United", Some("MUN"), 556),
        json!({"team": {"name": "No Id FC"}, "venue": {}}),
    ];
    env.mock_get("/teams", &scope_query(LEAGUE, SEASON), envelope("teams", teams, 1, 1), 1)
        .await;
    let players = vec![
        player_item(882, "de Gea", Some(33), Some(LEAGUE), Some(0)),
        player_item(883, "Teamless", None, Some(LEAGUE), Some(0)),
        json!({"player": {"name": "No Id"}, "statistics": []}),
    ];
    env.mock_get("/players", &page_query(1), envelope("players", players, 1, 1), 1)
        .await;
    let fixtures = vec![
        fixture_item(1001, 1_723_834_800, 33, 50, None),
        json!({"fixture": {"referee": "nobody"}}),
    ];
    env.mock_get("/fixtures", &scope_query(LEAGUE, SEASON), envelope("fixtures", fixtures, 1, 1), 1)
        .await;
    env.mock_get(
        "/fixtures/players",
        &[("fixture", "1001".to_string())],
        envelope(
            "fixtures/players",
            vec![fixture_players_block(33, &[882]), json!({"team": {}, "players": []})],
            1,
            1,
        ),
        1,
    )
    .await;

    let report = service(&env).ingest_league_data(LEAGUE, SEASON).await.unwrap();
    let teams = report.teams.unwrap();
    assert_eq!((teams.ingested_teams, teams.errors), (1, 1));
    assert_eq!(teams.venues, 1);
    let players = report.players.unwrap();
    assert_eq!((players.ingested_players, players.errors), (1, 2));
    let fixtures = report.fixtures.unwrap();
    assert_eq!((fixtures.ingested_fixtures, fixtures.errors), (1, 1));
    let stats = report.player_stats.unwrap();
    assert_eq!((stats.ingested_player_stats, stats.errors), (1, 1));
}

#[test(tokio::test)]
async fn test_error_envelope_fails_the_stage() {
    let mut env = TestEnv::new().await;
    env.mock_get(
        "/leagues",
        &[("id", LEAGUE.to_string())],
        envelope("leagues", vec![league_item(LEAGUE, "Premier League", None)], 1, 1),
        1,
    )
    .await;
    let mut limited = envelope("teams", vec![team_item(33, "Manchester United", Some("MUN"), 556)], 1, 1);
    limited["errors"] = json!({"requests": "You have reached the request limit for the day"});
    env.mock_get("/teams", &scope_query(LEAGUE, SEASON), limited, 1).await;
    let players = env
        .mock_get("/players", &page_query(1), envelope("players", vec![], 1, 1), 0)
        .await;

    let err = service(&env).ingest_league_data(LEAGUE, SEASON).await.unwrap_err();
    let MirrorError::StageFailed { stage, report, source } = err else {
        panic!("expected a stage failure");
    };
    assert_eq!(stage, Stage::Teams);
    assert!(report.league.is_some());
    assert!(source.to_string().contains("request limit"));
    assert!(matches!(*source, MirrorError::UpstreamUnavailable(_)));

    // The league committed, the teams in the rejected envelope were not stored
    assert_eq!(env.count("league").await, 1);
    assert_eq!(env.count("team").await, 0);
    players.assert_async().await;
    assert!(!IngestionLease::is_held(&env.store, LEAGUE, SEASON).await.unwrap());
}
