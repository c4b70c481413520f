//! Live round trip against a Postgres server.
//!
//! Skipped unless `EASQL_TEST_HOST` is set (a `.env` file is honored).
//! The other settings come from `EASQL_TEST_PORT`, `EASQL_TEST_DB`,
//! `EASQL_TEST_USER` and `EASQL_TEST_PASSWORD`.

use easql::{
    CallOptions, Config, Database, Decimal, Error, FromRow, NameMapper, Queryer, Result, qb,
};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, PartialEq, FromRow)]
struct Person {
    id: i64,
    full_name: String,
    nickname: Option<String>,
}

fn config_from_env() -> Option<Config> {
    dotenvy::dotenv().ok();
    let host = std::env::var("EASQL_TEST_HOST").ok()?;
    let var = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());

    Some(
        Config::new()
            .host(host)
            .port(var("EASQL_TEST_PORT", "5432").parse().expect("EASQL_TEST_PORT"))
            .database(var("EASQL_TEST_DB", "postgres"))
            .user(var("EASQL_TEST_USER", "postgres"))
            .password(var("EASQL_TEST_PASSWORD", ""))
            .max_open_conns(4)
            .max_idle_conns(1)
            .mapper(NameMapper::snake_case()),
    )
}

async fn batch(db: &Database, sql: &str) {
    let client = db.raw().pool().get().await.expect("checkout");
    client.batch_execute(sql).await.expect("batch_execute");
}

#[tokio::test]
async fn postgres_round_trip() -> Result<()> {
    let Some(config) = config_from_env() else {
        eprintln!("EASQL_TEST_HOST is not set; skipping postgres_round_trip");
        return Ok(());
    };

    let db = Database::open(&config).await?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before UNIX_EPOCH")
        .as_nanos();
    let table = format!("easql_test_people_{}_{}", std::process::id(), nanos);
    batch(
        &db,
        &format!(
            "CREATE TABLE {table} (id BIGINT PRIMARY KEY, full_name TEXT NOT NULL, nickname TEXT)"
        ),
    )
    .await;

    let res = db
        .insert(
            &qb::insert(&table)
                .columns(&["id", "full_name"])
                .values(vec![qb::Param::new(1_i64), qb::Param::new("Ann Lee")])
                .values(vec![qb::Param::new(2_i64), qb::Param::new("Bo Chen")]),
        )
        .await?;
    assert_eq!(res.rows_affected(), 2);
    assert_eq!(res.last_insert_id(), None);

    let mut person = Person {
        id: 0,
        full_name: String::new(),
        nickname: Some("stale".to_string()),
    };
    let by_id = qb::select(&table)
        .select("id, full_name, nickname")
        .eq("id", 1_i64);
    db.get(&mut person, &by_id).await?;
    assert_eq!(
        person,
        Person {
            id: 1,
            full_name: "Ann Lee".to_string(),
            nickname: None,
        }
    );

    // committed update is visible afterwards
    let tx = db.begin().await?;
    tx.update(&qb::update(&table).set("nickname", "annie").eq("id", 1_i64))
        .await?;
    tx.commit().await?;

    let mut nickname: Option<String> = None;
    db.get(&mut nickname, &qb::select(&table).select("nickname").eq("id", 1_i64))
        .await?;
    assert_eq!(nickname.as_deref(), Some("annie"));

    // rolled back delete is not
    let tx = db.begin().await?;
    let res = tx.delete(&qb::delete(&table).eq("id", 2_i64)).await?;
    assert_eq!(res.rows_affected(), 1);
    tx.rollback().await?;

    let mut ids: Vec<i64> = Vec::new();
    db.select(&mut ids, &qb::select(&table).select("id").order_by("id"))
        .await?;
    assert_eq!(ids, vec![1, 2]);

    // columns the destination never reads do not need a Rust type
    let mixed = || {
        qb::select("(SELECT 1::int8 AS id, 2.50::numeric AS price, ARRAY[1, 2] AS tags) t")
            .select("id, price, tags")
    };
    let mut id = 0_i64;
    db.get(&mut id, &mixed()).await?;
    assert_eq!(id, 1);
    let mut priced: (i64, Decimal) = (0, Decimal::ZERO);
    db.get(&mut priced, &mixed()).await?;
    assert_eq!(priced, (1, Decimal::new(250, 2)));
    let mut tagged: Vec<(i64, Decimal, String)> = Vec::new();
    let err = db.select(&mut tagged, &mixed()).await.unwrap_err();
    assert!(matches!(err, Error::Mapping { op: "select", .. }), "{err}");
    assert!(tagged.is_empty());

    let err = db
        .get(&mut ids[0], &qb::select(&table).select("id").eq("id", 99_i64))
        .await
        .unwrap_err();
    assert!(err.is_no_rows());

    let err = db
        .get_with(
            CallOptions::new().timeout(Duration::from_millis(50)),
            &mut nickname,
            &qb::select("pg_sleep(2)").select("NULL::text"),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");

    let err = db
        .insert(&qb::insert(&table).set("id", 1_i64).set("full_name", "dup"))
        .await
        .unwrap_err();
    let db_err = err.as_db_error().expect("server error");
    assert_eq!(db_err.code(), &tokio_postgres::error::SqlState::UNIQUE_VIOLATION);

    batch(&db, &format!("DROP TABLE {table}")).await;

    db.close()?;
    assert!(matches!(db.close(), Err(Error::Close(_))));
    Ok(())
}

fn sleep_query(seconds: f64) -> qb::SelectQb {
    qb::select(&format!("pg_sleep({seconds})")).select("1::int8")
}

#[tokio::test]
async fn postgres_pool_limits() -> Result<()> {
    let Some(config) = config_from_env() else {
        eprintln!("EASQL_TEST_HOST is not set; skipping postgres_pool_limits");
        return Ok(());
    };
    let db = Database::open(&config.max_open_conns(4).max_idle_conns(1)).await?;

    // concurrent calls open several connections; only one stays idle
    let (mut a, mut b, mut c, mut d) = (0_i64, 0_i64, 0_i64, 0_i64);
    let q = sleep_query(0.2);
    let (ra, rb, rc, rd) = tokio::join!(
        db.get(&mut a, &q),
        db.get(&mut b, &q),
        db.get(&mut c, &q),
        db.get(&mut d, &q),
    );
    ra?;
    rb?;
    rc?;
    rd?;
    let status = db.raw().pool().status();
    assert!(status.available <= 1, "{status:?}");
    assert!(status.size <= 1, "{status:?}");

    // an open transaction that is dropped gives its connection up
    let tx = db.begin().await?;
    let before = db.raw().pool().status().size;
    drop(tx);
    assert_eq!(db.raw().pool().status().size, before - 1);

    db.close()?;
    Ok(())
}

#[tokio::test]
async fn postgres_deadline_frees_the_connection() -> Result<()> {
    let Some(config) = config_from_env() else {
        eprintln!("EASQL_TEST_HOST is not set; skipping postgres_deadline_frees_the_connection");
        return Ok(());
    };
    let db = Database::open(&config.max_open_conns(1)).await?;

    let mut one = 0_i64;
    let err = db
        .get_with(
            CallOptions::new().timeout(Duration::from_millis(50)),
            &mut one,
            &sleep_query(3.0),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");

    // the only pool slot is usable again right away
    let started = Instant::now();
    db.get(&mut one, &qb::select("(SELECT 1::int8 AS one) t").select("one"))
        .await?;
    assert_eq!(one, 1);
    assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());

    // inside a transaction the timed-out statement is cancelled, so the
    // rollback does not wait for it
    let tx = db.begin().await?;
    let err = tx
        .get_with(
            CallOptions::new().timeout(Duration::from_millis(50)),
            &mut one,
            &sleep_query(3.0),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");
    let started = Instant::now();
    tx.rollback().await?;
    assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());

    db.close()?;
    Ok(())
}
