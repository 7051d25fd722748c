use anyhow::Result;

use super::schema::Database;
use super::types::PersistedSource;

impl Database {
    // ========================================================================
    // Seen Ledger Operations
    // ========================================================================

    /// Read the whole persisted ledger.
    ///
    /// Returns one entry per source, identifiers ordered oldest to newest.
    /// An empty store yields an empty vec (equivalent to an empty ledger).
    pub async fn load_ledger(&self) -> Result<Vec<PersistedSource>> {
        let sources: Vec<(String, String, Option<i64>, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT source, strategy, last_seen_ts, last_seen_id, updated_at
            FROM seen_sources
            ORDER BY source
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(sources.len());
        for (source, strategy, last_seen_ts, last_seen_id, updated_at_ms) in sources {
            let ids: Vec<(String,)> = sqlx::query_as(
                "SELECT native_id FROM seen_ids WHERE source = ? ORDER BY seq ASC",
            )
            .bind(&source)
            .fetch_all(&self.pool)
            .await?;

            entries.push(PersistedSource {
                source,
                strategy,
                last_seen_ts,
                last_seen_id,
                updated_at_ms,
                ids: ids.into_iter().map(|(id,)| id).collect(),
            });
        }

        Ok(entries)
    }

    /// Rewrite one source's persisted seen-state in a single transaction.
    ///
    /// The whole entry is replaced (upsert the source row, delete and
    /// re-insert its identifier rows) so the durable copy always reflects a
    /// complete in-memory snapshot, never a partial merge of two writers.
    pub async fn replace_source(&self, entry: &PersistedSource) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO seen_sources (source, strategy, last_seen_ts, last_seen_id, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(source) DO UPDATE SET
                strategy = excluded.strategy,
                last_seen_ts = excluded.last_seen_ts,
                last_seen_id = excluded.last_seen_id,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(&entry.source)
        .bind(&entry.strategy)
        .bind(entry.last_seen_ts)
        .bind(&entry.last_seen_id)
        .bind(entry.updated_at_ms)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM seen_ids WHERE source = ?")
            .bind(&entry.source)
            .execute(&mut *tx)
            .await?;

        for (seq, native_id) in entry.ids.iter().enumerate() {
            sqlx::query("INSERT INTO seen_ids (source, seq, native_id) VALUES (?, ?, ?)")
                .bind(&entry.source)
                .bind(seq as i64)
                .bind(native_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Remove every persisted seen-state row.
    pub async fn clear_ledger(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        // seen_ids cascades from seen_sources, but delete explicitly so the
        // clear works even on stores created before foreign keys were on.
        sqlx::query("DELETE FROM seen_ids").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM seen_sources")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
