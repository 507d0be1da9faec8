use sqlx::PgPool;
use tracing::error;
use wingdesk_core::HistorySink;
use wingdesk_shared::models::HistoryEvent;

/// Writes audit history to the `history` table in the background. A failed
/// write is logged and dropped; the business operation has already committed.
#[derive(Clone)]
pub struct PgHistorySink {
    pool: PgPool,
}

impl PgHistorySink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(pool: &PgPool, event: &HistoryEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO history (id, entity, entity_id, action, actor_id, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(event.entity.as_str())
        .bind(event.entity_id)
        .bind(event.action.as_str())
        .bind(event.actor_id)
        .bind(&event.detail)
        .bind(event.timestamp)
        .execute(pool)
        .await?;
        Ok(())
    }
}

impl HistorySink for PgHistorySink {
    fn record(&self, event: HistoryEvent) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = PgHistorySink::insert(&pool, &event).await {
                error!(
                    entity = event.entity.as_str(),
                    entity_id = %event.entity_id,
                    "Failed to write history: {}",
                    e
                );
            }
        });
    }
}
