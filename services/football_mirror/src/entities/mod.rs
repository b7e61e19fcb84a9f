//! Per-entity field-mapping tables, merge policies and upserts.
//!
//! | Entity               | Natural key                      | Policy    |
//! |----------------------|----------------------------------|-----------|
//! | league               | (id, season)                     | Overwrite |
//! | team                 | (id, season)                     | Overwrite |
//! | venue                | team_id                          | Overwrite |
//! | player               | (id, team_id, season)            | Selective |
//! | fixture              | id                               | Overwrite |
//! | fixture_player_stats | (fixture_id, player_id, team_id) | Selective |

pub mod fixture;
pub mod fixture_player_stats;
pub mod league;
pub mod player;
pub mod team;
