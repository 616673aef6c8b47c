use crate::domain::report::ReportTag;
use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the guard keeps the connection that took
// the lock until release. Used to keep two scheduled runs for the same tag from racing.
const LOCK_NAMESPACE: i64 = 0x4F55_544C_4F4F; // "OUTLOO"

fn lock_key_for_tag(tag: ReportTag) -> i64 {
    let discriminant = match tag {
        ReportTag::WeeklyMacro => 1,
        ReportTag::MonthlyPortfolio => 2,
    };
    LOCK_NAMESPACE ^ discriminant
}

#[derive(Debug)]
pub struct TagLock {
    conn: PoolConnection<Postgres>,
    tag: ReportTag,
    key: i64,
}

impl TagLock {
    pub fn tag(&self) -> ReportTag {
        self.tag
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={key})"))?;
        Ok(())
    }
}

/// Returns `None` when another session already holds the lock for `tag`.
pub async fn try_acquire_tag_lock(
    pool: &sqlx::PgPool,
    tag: ReportTag,
) -> anyhow::Result<Option<TagLock>> {
    let key = lock_key_for_tag(tag);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for advisory lock")?;
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

    Ok(acquired.0.then_some(TagLock { conn, tag, key }))
}
