use crate::storage::RawInput;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// `processed` is always written as false; nothing in this service reads it back.
pub async fn archive_raw_input(pool: &sqlx::PgPool, input: &RawInput) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let received_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO raw_email_inputs (id, texto, asunto, fecha, received_at, processed) \
         VALUES ($1, $2, $3, $4, $5, FALSE)",
    )
    .bind(id)
    .bind(&input.texto)
    .bind(&input.asunto)
    .bind(&input.fecha)
    .bind(received_at)
    .execute(pool)
    .await
    .context("insert raw_email_inputs failed")?;

    Ok(id)
}
