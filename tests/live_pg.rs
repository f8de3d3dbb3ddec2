//! Round trips against a live PostgreSQL server.
//!
//! Gated on `DOLMEN_TEST_DSN`, which must point at a scratch database the
//! tests may clobber, e.g.
//! `host=localhost user=postgres password=postgres dbname=dolmen_test`.
//! Every test is a no-op when the variable is unset.

use postgres::NoTls;

const SCHEMA_SQL: &str = r#"
    DROP SCHEMA IF EXISTS app CASCADE;
    CREATE SCHEMA app;
    CREATE TABLE app.parent (
        id int PRIMARY KEY,
        label text NOT NULL
    );
    CREATE TABLE app.child (
        id int PRIMARY KEY,
        parent_id int NOT NULL REFERENCES app.parent (id),
        payload bytea
    );
    CREATE TABLE app.untouched (
        id int PRIMARY KEY
    );
"#;

const DATA_SQL: &str = r#"
    INSERT INTO app.parent (id, label)
    SELECT n, 'parent ' || n FROM generate_series(1, 5) AS n;
    INSERT INTO app.child (id, parent_id, payload)
    SELECT n, n, decode(md5(n::text), 'hex') FROM generate_series(1, 5) AS n;
"#;

fn dsn() -> Option<String> {
    match std::env::var("DOLMEN_TEST_DSN") {
        Ok(dsn) => Some(dsn),
        Err(_) => {
            eprintln!("DOLMEN_TEST_DSN not set; skipping live test");
            None
        }
    }
}

fn seeded_client(dsn: &str) -> postgres::Client {
    let config: postgres::Config = dsn.parse().unwrap();
    let mut client = config.connect(NoTls).unwrap();
    client.batch_execute(SCHEMA_SQL).unwrap();
    client.batch_execute(DATA_SQL).unwrap();
    client
}

#[test]
fn live_backup_restore_backup_is_byte_identical() {
    let Some(dsn) = dsn() else { return };
    let config: postgres::Config = dsn.parse().unwrap();
    let mut client = seeded_client(&dsn);

    for (segment_size, buffer_size) in [(1usize, 1usize), (8, 3), (64, 32767), (8192, 64)] {
        let mut first = Vec::new();
        dolmen::blocking::backup(&config, &mut first, segment_size).unwrap();
        assert!(!first.is_empty());

        client
            .batch_execute("DELETE FROM app.child; DELETE FROM app.parent;")
            .unwrap();
        dolmen::blocking::restore(&config, &first[..], buffer_size).unwrap();

        let mut second = Vec::new();
        dolmen::blocking::backup(&config, &mut second, segment_size).unwrap();
        assert_eq!(
            first, second,
            "segment_size={segment_size} buffer_size={buffer_size}"
        );
    }
}

#[test]
fn live_empty_tables_are_pruned_and_order_is_safe() {
    let Some(dsn) = dsn() else { return };
    let config: postgres::Config = dsn.parse().unwrap();
    let _client = seeded_client(&dsn);

    let mut dump = Vec::new();
    dolmen::blocking::backup(&config, &mut dump, 512).unwrap();

    let mut reader = dolmen::segment::SegmentReader::new(&dump[..]);
    let mut names = Vec::new();
    while let Some(json) = reader.read_string().unwrap() {
        let header = dolmen::TableHeader::from_json(&json).unwrap();
        names.push(format!("{}.{}", header.schema, header.table));
        let mut block = reader.block_reader(1024).unwrap();
        std::io::copy(&mut block, &mut std::io::sink()).unwrap();
    }
    // app.untouched has no rows: no header, no block. Parent precedes child.
    assert_eq!(names, vec!["app.parent", "app.child"]);
}

#[test]
fn live_unknown_column_fails_and_rolls_back() {
    let Some(dsn) = dsn() else { return };
    let config: postgres::Config = dsn.parse().unwrap();
    let mut client = seeded_client(&dsn);

    let mut dump = Vec::new();
    dolmen::blocking::backup(&config, &mut dump, 256).unwrap();

    // Append a pair whose header names a column the table lacks.
    let mut writer = dolmen::segment::SegmentWriter::new(&mut dump);
    let bogus = dolmen::TableHeader {
        schema: "app".into(),
        table: "parent".into(),
        columns: vec!["does_not_exist".into()],
    };
    writer.write_string(&bogus.to_json().unwrap()).unwrap();
    writer
        .copy_from_reader(&mut std::io::empty(), 256)
        .unwrap();
    drop(writer);

    client
        .batch_execute("DELETE FROM app.child; DELETE FROM app.parent;")
        .unwrap();
    let err = dolmen::blocking::restore(&config, &dump[..], 1024).unwrap_err();
    assert!(matches!(err, dolmen::Error::Db(_)));

    // The valid tables restored before the failure must be gone too.
    let count: i64 = client
        .query_one("SELECT count(*) FROM app.parent", &[])
        .unwrap()
        .get(0);
    assert_eq!(count, 0, "failed restore left partial rows behind");
}

#[tokio::test]
async fn live_async_engine_matches_blocking() {
    let Some(dsn) = dsn() else { return };
    let config: tokio_postgres::Config = dsn.parse().unwrap();

    let (client, connection) = config.connect(tokio_postgres::NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client.batch_execute(SCHEMA_SQL).await.unwrap();
    client.batch_execute(DATA_SQL).await.unwrap();

    let mut async_dump = Vec::new();
    dolmen::backup(&config, &mut async_dump, 777).await.unwrap();

    let blocking_dump = tokio::task::spawn_blocking({
        let dsn = dsn.clone();
        move || {
            let config: postgres::Config = dsn.parse().unwrap();
            let mut dump = Vec::new();
            dolmen::blocking::backup(&config, &mut dump, 777).unwrap();
            dump
        }
    })
    .await
    .unwrap();
    assert_eq!(async_dump, blocking_dump);

    // Async restore then a fresh async backup reproduces the dump.
    client
        .batch_execute("DELETE FROM app.child; DELETE FROM app.parent;")
        .await
        .unwrap();
    let summary = dolmen::restore(&config, &async_dump[..], 333).await.unwrap();
    assert_eq!(summary.tables, 2);
    assert_eq!(summary.rows, 10);

    let mut again = Vec::new();
    dolmen::backup(&config, &mut again, 777).await.unwrap();
    assert_eq!(async_dump, again);
}

#[tokio::test]
async fn live_cancelled_token_aborts_before_any_output() {
    let Some(dsn) = dsn() else { return };
    let config: tokio_postgres::Config = dsn.parse().unwrap();

    let (client, connection) = config.connect(tokio_postgres::NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client.batch_execute(SCHEMA_SQL).await.unwrap();
    client.batch_execute(DATA_SQL).await.unwrap();

    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();

    let mut out = Vec::new();
    let err = dolmen::backup_cancellable(&config, &mut out, 64, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, dolmen::Error::Cancelled));
    assert!(out.is_empty());

    // Restore checks the token after each header read, before touching the
    // destination table.
    let mut dump = Vec::new();
    let mut writer = dolmen::segment::SegmentWriter::new(&mut dump);
    let header = dolmen::TableHeader {
        schema: "app".into(),
        table: "parent".into(),
        columns: vec!["id".into(), "label".into()],
    };
    writer.write_string(&header.to_json().unwrap()).unwrap();
    writer
        .copy_from_reader(&mut std::io::empty(), 64)
        .unwrap();
    drop(writer);

    let err = dolmen::restore_cancellable(&config, &dump[..], 64, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, dolmen::Error::Cancelled));
}
