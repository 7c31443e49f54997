use crate::database::Database;
use anyhow::Context;
use uuid::Uuid;

/// Tracks the refresh-sweep job's identity across process restarts, the same single-row
/// upsert pattern the rest of this codebase uses wherever exactly one row is meaningful.
impl Database {
    /// Returns the previous process's refresh job id, if one was ever recorded.
    pub async fn refresh_job_id(&self) -> anyhow::Result<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT scheduler_job_id FROM scheduler_refresh_job WHERE id")
                .fetch_optional(&self.pool)
                .await
                .with_context(|| "Failed to fetch refresh job id.")?;
        Ok(row.map(|(id,)| id))
    }

    /// Records the current process's refresh job id, replacing any previous one.
    pub async fn set_refresh_job_id(&self, scheduler_job_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_refresh_job (id, scheduler_job_id) VALUES (TRUE, $1)
            ON CONFLICT (id) DO UPDATE SET scheduler_job_id = EXCLUDED.scheduler_job_id
            "#,
        )
        .bind(scheduler_job_id)
        .execute(&self.pool)
        .await
        .with_context(|| "Failed to record refresh job id.")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;
    use sqlx::PgPool;
    use uuid::Uuid;

    #[sqlx::test]
    async fn records_and_replaces_the_refresh_job_id(pool: PgPool) -> anyhow::Result<()> {
        let db = Database::create(pool).await?;
        assert!(db.refresh_job_id().await?.is_none());

        let first = Uuid::now_v7();
        db.set_refresh_job_id(first).await?;
        assert_eq!(db.refresh_job_id().await?, Some(first));

        let second = Uuid::now_v7();
        db.set_refresh_job_id(second).await?;
        assert_eq!(db.refresh_job_id().await?, Some(second));

        Ok(())
    }
}
