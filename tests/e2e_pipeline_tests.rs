//! End-to-end tests of the load pipeline against a real database file.

mod common;

use common::*;
use sparkify_etl::etl::{execute, EtlError, Operation, Progress};
use sparkify_etl::warehouse::SchemaAction;

fn run(warehouse: &TestWarehouse, operation: Operation) -> Result<sparkify_etl::etl::OperationOutcome, EtlError> {
    execute(operation, &warehouse.settings, &Progress::silent())
}

#[test]
fn test_song_play_is_loaded_and_resolved() {
    let warehouse = TestWarehouse::new();
    warehouse.write_song("A/A/A/TRAAAAW128F429D538.json", SONG_X_RECORD);
    warehouse.write_log("2018/11/2018-11-02-events.json", &song_x_log());

    let outcome = run(&warehouse, Operation::ResetAndLoad).unwrap();
    let report = outcome.report.unwrap();
    assert_eq!(report.song_files, 1);
    assert_eq!(report.log_files, 1);
    assert_eq!(report.events, 2);
    assert_eq!(report.songplays, 1);
    assert_eq!(report.resolved_songplays, 1);

    assert_eq!(report.counts.artists, 1);
    assert_eq!(report.counts.songs, 1);
    assert_eq!(report.counts.users, 1);
    assert_eq!(report.counts.time, 1);
    assert_eq!(report.counts.songplays, 1);

    let conn = warehouse.connect();
    let (start_time, user_id, song_id, artist_id, session_id): (String, i64, String, String, i64) = conn
        .query_row(
            "SELECT start_time, user_id, song_id, artist_id, session_id FROM songplays",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .unwrap();
    assert_eq!(start_time, PLAY_START_TIME);
    assert_eq!(user_id, USER_1_ID);
    assert_eq!(song_id, SONG_1_ID);
    assert_eq!(artist_id, ARTIST_1_ID);
    assert_eq!(session_id, 172);

    let (hour, day, week, month, year, weekday): (i64, i64, i64, i64, i64, i64) = conn
        .query_row(
            "SELECT hour, day, week, month, year, weekday FROM time WHERE start_time = ?1",
            [PLAY_START_TIME],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
        )
        .unwrap();
    assert_eq!((hour, day, week, month, year, weekday), (1, 2, 44, 11, 2018, 4));
}

#[test]
fn test_rerun_without_reset_duplicates_only_facts() {
    let warehouse = TestWarehouse::new();
    warehouse.write_song("A/A/A/TRAAAAW128F429D538.json", SONG_X_RECORD);
    warehouse.write_log("2018/11/2018-11-02-events.json", &song_x_log());

    let first = run(&warehouse, Operation::Pipeline).unwrap();
    assert_eq!(first.schema, Some(SchemaAction::Created));
    let second = run(&warehouse, Operation::Pipeline).unwrap();
    assert_eq!(second.schema, Some(SchemaAction::AlreadyPresent));

    assert_eq!(warehouse.count("songplays"), 2);
    assert_eq!(warehouse.count("artists"), 1);
    assert_eq!(warehouse.count("songs"), 1);
    assert_eq!(warehouse.count("users"), 1);
    assert_eq!(warehouse.count("time"), 1);
}

#[test]
fn test_reset_and_load_starts_from_empty_tables() {
    let warehouse = TestWarehouse::new();
    warehouse.write_song("A/A/A/TRAAAAW128F429D538.json", SONG_X_RECORD);
    warehouse.write_log("2018/11/2018-11-02-events.json", &song_x_log());

    run(&warehouse, Operation::ResetAndLoad).unwrap();
    run(&warehouse, Operation::ResetAndLoad).unwrap();
    assert_eq!(warehouse.count("songplays"), 1);

    run(&warehouse, Operation::CreateTables).unwrap();
    for table in ["songplays", "users", "songs", "artists", "time"] {
        assert_eq!(warehouse.count(table), 0, "{} not empty", table);
    }
}

#[test]
fn test_unmatched_play_has_null_references() {
    let warehouse = TestWarehouse::new();
    warehouse.write_song("A/A/A/TRAAAAW128F429D538.json", SONG_X_RECORD);
    // Duration differs from the catalog entry.
    warehouse.write_log(
        "events.json",
        &log_event("NextSong", SONG_1_TITLE, ARTIST_1_NAME, 200.4, USER_1_ID, PLAY_TS),
    );

    let report = run(&warehouse, Operation::ResetAndLoad)
        .unwrap()
        .report
        .unwrap();
    assert_eq!(report.songplays, 1);
    assert_eq!(report.resolved_songplays, 0);

    let nulls: i64 = warehouse
        .connect()
        .query_row(
            "SELECT COUNT(*) FROM songplays WHERE song_id IS NULL AND artist_id IS NULL",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(nulls, 1);
}

#[test]
fn test_non_song_events_produce_no_rows() {
    let warehouse = TestWarehouse::new();
    warehouse.write_log(
        "events.json",
        &format!(
            "[{}, {}]",
            log_event("Home", "", "", 0.0, 3, PLAY_TS),
            log_event("Logout", "", "", 0.0, 4, PLAY_TS + 1)
        ),
    );

    let report = run(&warehouse, Operation::ResetAndLoad)
        .unwrap()
        .report
        .unwrap();
    assert_eq!(report.events, 2);
    assert_eq!(report.songplays, 0);
    assert_eq!(warehouse.count("users"), 0);
    assert_eq!(warehouse.count("time"), 0);
}

#[test]
fn test_catalog_reprocessing_keeps_last_values() {
    let warehouse = TestWarehouse::new();
    warehouse.write_song("A/a.json", SONG_X_RECORD);
    warehouse.write_song(
        "B/b.json",
        &SONG_X_RECORD.replace("Memphis, TN", "Nashville, TN"),
    );

    run(&warehouse, Operation::ResetAndLoad).unwrap();
    run(&warehouse, Operation::Etl).unwrap();

    assert_eq!(warehouse.count("artists"), 1);
    assert_eq!(warehouse.count("songs"), 1);
    let location: String = warehouse
        .connect()
        .query_row("SELECT location FROM artists WHERE artist_id = 'A1'", [], |r| {
            r.get(0)
        })
        .unwrap();
    assert_eq!(location, "Nashville, TN");
}

#[test]
fn test_level_follows_file_order() {
    let warehouse = TestWarehouse::new();
    let free = log_event("NextSong", "a", "b", 1.0, 7, PLAY_TS).replace("\"paid\"", "\"free\"");
    let paid = log_event("NextSong", "a", "b", 1.0, 7, PLAY_TS + 60_000);
    warehouse.write_log("2018-11-01-events.json", &free);
    warehouse.write_log("2018-11-02-events.json", &paid);

    run(&warehouse, Operation::ResetAndLoad).unwrap();
    let level: String = warehouse
        .connect()
        .query_row("SELECT level FROM users WHERE user_id = 7", [], |r| r.get(0))
        .unwrap();
    assert_eq!(level, "paid");
    assert_eq!(warehouse.count("songplays"), 2);
}

#[test]
fn test_malformed_file_rolls_back_only_itself() {
    let warehouse = TestWarehouse::new();
    warehouse.write_song("A/a.json", SONG_X_RECORD);
    // Sorted after A/a.json; S3 is written before the second record fails.
    warehouse.write_song(
        "B/b.json",
        &format!(
            "{}\n{{\"song_id\": \"S2\", \"title\": \"No Artist\"}}\n",
            SONG_X_RECORD.replace("\"S1\"", "\"S3\"")
        ),
    );
    warehouse.write_song("C/c.json", &SONG_X_RECORD.replace("\"S1\"", "\"S4\""));

    let err = run(&warehouse, Operation::ResetAndLoad).unwrap_err();
    match err {
        EtlError::MalformedRecord { path, .. } => assert!(path.ends_with("B/b.json")),
        other => panic!("unexpected error: {}", other),
    }

    let ids: Vec<String> = {
        let conn = warehouse.connect();
        let mut stmt = conn.prepare("SELECT song_id FROM songs ORDER BY song_id").unwrap();
        let rows = stmt
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap();
        rows
    };
    assert_eq!(ids, vec!["S1".to_string()]);
}

#[test]
fn test_missing_required_catalog_field_is_fatal() {
    let warehouse = TestWarehouse::new();
    warehouse.write_song("a.json", &SONG_X_RECORD.replace("\"artist_name\"", "\"name\""));

    let err = run(&warehouse, Operation::ResetAndLoad).unwrap_err();
    assert!(err.to_string().contains("artist_name"), "{}", err);
    assert_eq!(warehouse.count("artists"), 0);
}

#[test]
fn test_missing_data_roots_load_nothing() {
    let warehouse = TestWarehouse::new();
    let report = run(&warehouse, Operation::Pipeline)
        .unwrap()
        .report
        .unwrap();
    assert_eq!(report.song_files, 0);
    assert_eq!(report.log_files, 0);
    assert_eq!(report.counts.songplays, 0);
}

#[test]
fn test_etl_without_schema_writes_nothing() {
    let warehouse = TestWarehouse::new();
    warehouse.write_song("a.json", SONG_X_RECORD);

    let err = run(&warehouse, Operation::Etl).unwrap_err();
    assert!(matches!(err, EtlError::Schema(_)));
    let tables: i64 = warehouse
        .connect()
        .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |r| {
            r.get(0)
        })
        .unwrap();
    assert_eq!(tables, 0);
}
