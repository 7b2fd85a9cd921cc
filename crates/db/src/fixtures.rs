use crate::connection::DbPool;

/// Row counts the demo fixture guarantees, keyed by table.
const EXPECTED_ROWS: &[(&str, i64)] = &[
    ("dim_geo", 3),
    ("dim_time", 3),
    ("dim_indicator", 2),
    ("fact_measure", 6),
    ("dataset_registry", 1),
    ("dataset_indicator", 1),
    ("extended_fact_measure", 3),
];

/// Small deterministic dataset: forest cover and fish production for Ranchi
/// district (2019-2021) plus one state GDP dataset.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Loads the fixture on the owner pool. Reloading is a no-op.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(SeedResult { tables_seeded: EXPECTED_ROWS.iter().map(|(table, _)| *table).collect() })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, sqlx::Error> {
        let mut checks = Vec::with_capacity(EXPECTED_ROWS.len());
        for (table, expected) in EXPECTED_ROWS {
            let count: i64 =
                sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}")).fetch_one(pool).await?;
            checks.push((*table, count == *expected));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        // Children before parents.
        for (table, _) in EXPECTED_ROWS.iter().rev() {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub tables_seeded: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
