use std::sync::Arc;
use std::time::{Duration, Instant};

use insights_core::config::QueryConfig;
use insights_core::errors::{ExecutionError, QueryError};
use insights_core::guard::GuardError;
use insights_db::{
    connect_read_only, connect_with_settings, migrations, DemoDataset, QueryExecutor,
    SqliteReadOnlySource,
};
use serde_json::json;
use tempfile::TempDir;

type TestResult<T = ()> = Result<T, String>;

struct SeededDatabase {
    _dir: TempDir,
    url: String,
}

async fn seeded_database() -> TestResult<SeededDatabase> {
    let dir = TempDir::new().map_err(|error| format!("tempdir: {error}"))?;
    let url = format!("sqlite://{}", dir.path().join("analytics.db").display());

    let owner = connect_with_settings(&url, 1, 30).await.map_err(|error| error.to_string())?;
    migrations::run_pending(&owner).await.map_err(|error| error.to_string())?;
    DemoDataset::load(&owner).await.map_err(|error| error.to_string())?;
    owner.close().await;

    Ok(SeededDatabase { _dir: dir, url })
}

async fn executor(database: &SeededDatabase, config: QueryConfig) -> TestResult<QueryExecutor> {
    let pool = connect_read_only(&database.url, 2, 5).await.map_err(|error| error.to_string())?;
    Ok(QueryExecutor::new(Arc::new(SqliteReadOnlySource::new(pool)), &config))
}

#[tokio::test]
async fn sample_join_returns_typed_rows() -> TestResult {
    let database = seeded_database().await?;
    let executor = executor(&database, QueryConfig::default()).await?;

    let (sanitized, result) = executor
        .run_sql_text(
            "SELECT t.year, f.value, i.unit FROM fact_measure f \
             JOIN dim_indicator i ON f.indicator_id = i.id \
             JOIN dim_time t ON f.time_id = t.id \
             WHERE i.slug = 'forest_cover_area' ORDER BY t.year",
        )
        .await
        .map_err(|error| error.to_string())?;

    if !sanitized.as_str().ends_with("LIMIT 5000") {
        return Err(format!("limit was not injected: {sanitized}"));
    }
    if result.columns != ["year", "value", "unit"] {
        return Err(format!("unexpected columns {:?}", result.columns));
    }
    if result.rows.first() != Some(&vec![json!(2019), json!(15420.5), json!("hectares")]) {
        return Err(format!("unexpected first row {:?}", result.rows.first()));
    }
    if result.row_count != 3 {
        return Err(format!("expected 3 rows, got {}", result.row_count));
    }
    Ok(())
}

#[tokio::test]
async fn empty_result_still_reports_columns() -> TestResult {
    let database = seeded_database().await?;
    let executor = executor(&database, QueryConfig::default()).await?;

    let (_, result) = executor
        .run_sql_text("SELECT district, ward FROM dim_geo WHERE state = 'Nowhere'")
        .await
        .map_err(|error| error.to_string())?;

    if result.columns != ["district", "ward"] || result.row_count != 0 {
        return Err(format!("unexpected result {result:?}"));
    }
    Ok(())
}

#[tokio::test]
async fn nulls_and_blobs_map_to_json() -> TestResult {
    let database = seeded_database().await?;
    let executor = executor(&database, QueryConfig::default()).await?;

    let (_, result) = executor
        .run_sql_text("SELECT zone, X'0AFF' AS raw FROM dim_geo WHERE id = 1")
        .await
        .map_err(|error| error.to_string())?;

    if result.rows != vec![vec![json!(null), json!("0aff")]] {
        return Err(format!("unexpected rows {:?}", result.rows));
    }
    Ok(())
}

#[tokio::test]
async fn row_cap_applies_to_database_results() -> TestResult {
    let database = seeded_database().await?;
    let config = QueryConfig { max_rows_returned: 4, max_preview_rows: 2, ..QueryConfig::default() };
    let executor = executor(&database, config).await?;

    let (sanitized, result) = executor
        .run_sql_text("SELECT * FROM fact_measure LIMIT 100")
        .await
        .map_err(|error| error.to_string())?;

    if sanitized.as_str() != "SELECT * FROM fact_measure LIMIT 4" {
        return Err(format!("limit was not clamped: {sanitized}"));
    }
    if result.row_count != 4 {
        return Err(format!("expected 4 rows, got {}", result.row_count));
    }
    Ok(())
}

#[tokio::test]
async fn unknown_table_is_rejected_before_execution() -> TestResult {
    let database = seeded_database().await?;
    let executor = executor(&database, QueryConfig::default()).await?;

    match executor.run_sql_text("SELECT name FROM sqlite_master").await {
        Err(QueryError::Guard(GuardError::UnauthorizedTable { tables })) if tables == ["sqlite_master"] => {
            Ok(())
        }
        other => Err(format!("expected unauthorized table, got {other:?}")),
    }
}

#[tokio::test]
async fn database_errors_surface_as_execution_errors() -> TestResult {
    let database = seeded_database().await?;
    let executor = executor(&database, QueryConfig::default()).await?;

    match executor.run_sql_text("SELECT no_such_column FROM dim_time").await {
        Err(error @ QueryError::Execution(_)) if error.error_class() == "execution.database" => Ok(()),
        other => Err(format!("expected database error, got {other:?}")),
    }
}

#[tokio::test]
async fn runaway_statement_is_interrupted_and_frees_its_connection() -> TestResult {
    let database = seeded_database().await?;
    let pool = connect_read_only(&database.url, 1, 5).await.map_err(|error| error.to_string())?;
    let config = QueryConfig { statement_timeout_secs: 1, ..QueryConfig::default() };
    let executor = QueryExecutor::new(Arc::new(SqliteReadOnlySource::new(pool)), &config);

    let started = Instant::now();
    let outcome = executor
        .run_sql_text(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM (SELECT 1) AS o, c \
             WHERE x < 3000000000) SELECT max(x) FROM (SELECT 1) AS o, c",
        )
        .await;
    if !matches!(outcome, Err(QueryError::Execution(ExecutionError::Timeout { seconds: 1 }))) {
        return Err(format!("expected a statement timeout, got {outcome:?}"));
    }
    if started.elapsed() > Duration::from_secs(3) {
        return Err(format!("interrupt took {:?}", started.elapsed()));
    }

    // The pool holds a single connection, so this only runs if the runaway
    // statement actually stopped.
    let started = Instant::now();
    let (_, result) = executor
        .run_sql_text("SELECT year FROM dim_time ORDER BY year")
        .await
        .map_err(|error| format!("follow-up query failed: {error}"))?;
    if result.row_count != 3 {
        return Err(format!("expected 3 years, got {}", result.row_count));
    }
    if started.elapsed() > Duration::from_millis(900) {
        return Err(format!("follow-up query waited {:?}", started.elapsed()));
    }
    Ok(())
}
