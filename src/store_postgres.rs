//! Postgres-backed store. Stage transitions commit inside one database
//! transaction with a `WHERE version = $n` guard, so two concurrent
//! transitions on the same document can never both apply from the same
//! starting stage.

use crate::store::{DocumentStore, StageTransition, StoreError};
use crate::types::{DecreeAssignment, Document, StageInstance, StageState};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id                 UUID PRIMARY KEY,
    correlative_number TEXT NOT NULL,
    direction          TEXT NOT NULL,
    stage              TEXT NOT NULL,
    current_instance   UUID NOT NULL,
    expediente_id      UUID,
    version            BIGINT NOT NULL,
    created_at         TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS stage_instances (
    id             UUID PRIMARY KEY,
    document_id    UUID NOT NULL,
    stage          TEXT NOT NULL,
    sequence       BIGINT NOT NULL,
    entered_at     TIMESTAMPTZ NOT NULL,
    due_at         TIMESTAMPTZ,
    completed_at   TIMESTAMPTZ,
    notes          TEXT,
    metadata       JSONB NOT NULL DEFAULT '{}'::jsonb,
    attachment_ids JSONB NOT NULL DEFAULT '[]'::jsonb,
    skipped        BOOLEAN NOT NULL DEFAULT FALSE,
    skip_reason    TEXT
);
CREATE INDEX IF NOT EXISTS idx_stage_instances_document
    ON stage_instances (document_id, sequence);
CREATE INDEX IF NOT EXISTS idx_stage_instances_due
    ON stage_instances (due_at) WHERE completed_at IS NULL;

CREATE TABLE IF NOT EXISTS decree_assignments (
    id            UUID PRIMARY KEY,
    document_id   UUID NOT NULL,
    department_id UUID NOT NULL,
    due_at        TIMESTAMPTZ NOT NULL,
    notes         TEXT,
    created_at    TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decree_assignments_document
    ON decree_assignments (document_id);
"#;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ─── Row mapping ──────────────────────────────────────────────

fn document_from_row(row: &PgRow) -> Result<Document> {
    let direction: String = row.try_get("direction")?;
    let stage: String = row.try_get("stage")?;
    Ok(Document {
        id: row.try_get("id")?,
        correlative_number: row.try_get("correlative_number")?,
        direction: direction
            .parse()
            .map_err(|_| anyhow!("bad direction column {direction:?}"))?,
        stage: stage.parse().map_err(|e: String| anyhow!(e))?,
        current_instance: row.try_get("current_instance")?,
        expediente_id: row.try_get("expediente_id")?,
        version: row.try_get::<i64, _>("version")? as u64,
        created_at: row.try_get("created_at")?,
    })
}

fn instance_from_row(row: &PgRow) -> Result<StageInstance> {
    let stage: String = row.try_get("stage")?;
    let metadata: serde_json::Value = row.try_get("metadata")?;
    let attachment_ids: serde_json::Value = row.try_get("attachment_ids")?;
    Ok(StageInstance {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        stage: stage.parse().map_err(|e: String| anyhow!(e))?,
        sequence: row.try_get::<i64, _>("sequence")? as u32,
        entered_at: row.try_get("entered_at")?,
        due_at: row.try_get("due_at")?,
        completed_at: row.try_get("completed_at")?,
        notes: row.try_get("notes")?,
        metadata: serde_json::from_value(metadata).context("metadata column")?,
        attachment_ids: serde_json::from_value(attachment_ids).context("attachment_ids column")?,
        skipped: row.try_get("skipped")?,
        skip_reason: row.try_get("skip_reason")?,
    })
}

fn assignment_from_row(row: &PgRow) -> Result<DecreeAssignment> {
    Ok(DecreeAssignment {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        department_id: row.try_get("department_id")?,
        due_at: row.try_get("due_at")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn upsert_instance<'e, E>(executor: E, instance: &StageInstance) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO stage_instances
            (id, document_id, stage, sequence, entered_at, due_at, completed_at,
             notes, metadata, attachment_ids, skipped, skip_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO UPDATE SET
            due_at = EXCLUDED.due_at,
            completed_at = EXCLUDED.completed_at,
            notes = EXCLUDED.notes,
            metadata = EXCLUDED.metadata,
            attachment_ids = EXCLUDED.attachment_ids,
            skipped = EXCLUDED.skipped,
            skip_reason = EXCLUDED.skip_reason
        "#,
    )
    .bind(instance.id)
    .bind(instance.document_id)
    .bind(instance.stage.to_string())
    .bind(instance.sequence as i64)
    .bind(instance.entered_at)
    .bind(instance.due_at)
    .bind(instance.completed_at)
    .bind(&instance.notes)
    .bind(serde_json::to_value(&instance.metadata)?)
    .bind(serde_json::to_value(&instance.attachment_ids)?)
    .bind(instance.skipped)
    .bind(&instance.skip_reason)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn insert_document(
        &self,
        document: &Document,
        first_instance: &StageInstance,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, correlative_number, direction, stage, current_instance,
                 expediente_id, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(document.id)
        .bind(&document.correlative_number)
        .bind(document.direction.to_string())
        .bind(document.stage.to_string())
        .bind(document.current_instance)
        .bind(document.expediente_id)
        .bind(document.version as i64)
        .bind(document.created_at)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;
        upsert_instance(&mut *tx, first_instance).await?;
        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn load_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        row.as_ref().map(document_from_row).transpose().map_err(StoreError::Other)
    }

    async fn load_instance(&self, id: Uuid) -> Result<Option<StageInstance>, StoreError> {
        let row = sqlx::query("SELECT * FROM stage_instances WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        row.as_ref().map(instance_from_row).transpose().map_err(StoreError::Other)
    }

    async fn instances_for(&self, document_id: Uuid) -> Result<Vec<StageInstance>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM stage_instances WHERE document_id = $1 ORDER BY sequence",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        rows.iter()
            .map(instance_from_row)
            .collect::<Result<_>>()
            .map_err(StoreError::Other)
    }

    async fn commit_transition(&self, txn: &StageTransition) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;
        let updated = sqlx::query(
            r#"
            UPDATE documents
            SET stage = $1, current_instance = $2, version = version + 1
            WHERE id = $3 AND version = $4
            "#,
        )
        .bind(txn.new_stage.to_string())
        .bind(txn.opened.id)
        .bind(txn.document_id)
        .bind(txn.expected_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                document_id: txn.document_id,
            });
        }
        upsert_instance(&mut *tx, &txn.closed).await?;
        upsert_instance(&mut *tx, &txn.opened).await?;
        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn update_current_instance(
        &self,
        document_id: Uuid,
        expected_version: u64,
        instance: &StageInstance,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;
        let updated =
            sqlx::query("UPDATE documents SET version = version + 1 WHERE id = $1 AND version = $2")
                .bind(document_id)
                .bind(expected_version as i64)
                .execute(&mut *tx)
                .await
                .map_err(anyhow::Error::from)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict { document_id });
        }
        upsert_instance(&mut *tx, instance).await?;
        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn overdue_instances(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<StageInstance>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM stage_instances
            WHERE completed_at IS NULL AND due_at IS NOT NULL AND due_at < $1
            ORDER BY due_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        rows.iter()
            .map(instance_from_row)
            .collect::<Result<_>>()
            .map_err(StoreError::Other)
    }

    async fn instances_in_state(
        &self,
        state: StageState,
    ) -> Result<Vec<StageInstance>, StoreError> {
        let predicate = match state {
            StageState::Open => "completed_at IS NULL",
            StageState::Completed => "completed_at IS NOT NULL AND NOT skipped",
            StageState::Skipped => "skipped",
        };
        let rows = sqlx::query(&format!(
            "SELECT * FROM stage_instances WHERE {predicate} ORDER BY document_id, sequence"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        rows.iter()
            .map(instance_from_row)
            .collect::<Result<_>>()
            .map_err(StoreError::Other)
    }

    async fn insert_assignments(
        &self,
        assignments: &[DecreeAssignment],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;
        for assignment in assignments {
            sqlx::query(
                r#"
                INSERT INTO decree_assignments
                    (id, document_id, department_id, due_at, notes, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(assignment.id)
            .bind(assignment.document_id)
            .bind(assignment.department_id)
            .bind(assignment.due_at)
            .bind(&assignment.notes)
            .bind(assignment.created_at)
            .execute(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;
        }
        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn assignments_for(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<DecreeAssignment>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM decree_assignments WHERE document_id = $1 ORDER BY created_at")
                .bind(document_id)
                .fetch_all(&self.pool)
                .await
                .map_err(anyhow::Error::from)?;
        rows.iter()
            .map(assignment_from_row)
            .collect::<Result<_>>()
            .map_err(StoreError::Other)
    }
}
