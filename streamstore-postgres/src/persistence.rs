use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{query, Row};
use streamstore::{
    Commit, CommitAttempt, CommitId, CommitPersistence, CommitSequence, EventEnvelope,
    EventStoreError, EventStoreResult, Operation, Snapshot, StreamHead, StreamId, StreamRevision,
    Timestamp,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::PostgresPersistence;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[async_trait]
impl CommitPersistence for PostgresPersistence {
    #[instrument(
        name = "postgres.append",
        skip(self, attempt),
        fields(
            stream_id = %attempt.stream_id(),
            expected = %attempt.expected_revision(),
            events = attempt.events().len()
        )
    )]
    async fn append(&self, attempt: CommitAttempt) -> EventStoreResult<Commit> {
        let events = serde_json::to_value(attempt.events()).map_err(|error| {
            EventStoreError::SerializationFailed {
                detail: error.to_string(),
            }
        })?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::BeginTransaction))?;

        let duplicate = query(
            "SELECT 1 FROM streamstore_commits WHERE stream_id = $1 AND commit_id = $2",
        )
        .bind(attempt.stream_id().as_ref())
        .bind(commit_uuid(attempt.commit_id()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::Append))?;

        if duplicate.is_some() {
            warn!(
                commit_id = %attempt.commit_id(),
                "[postgres.duplicate_commit] commit id already recorded"
            );
            return Err(duplicate_commit(&attempt));
        }

        let head = query(
            "SELECT stream_revision, commit_sequence FROM streamstore_commits
             WHERE stream_id = $1 ORDER BY commit_sequence DESC LIMIT 1",
        )
        .bind(attempt.stream_id().as_ref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::Append))?;

        let (current, sequence) = match head {
            Some(row) => (
                StreamRevision::new(column_u64(&row, "stream_revision", Operation::Append)?),
                CommitSequence::new(column_u64(&row, "commit_sequence", Operation::Append)?),
            ),
            None => (StreamRevision::initial(), CommitSequence::initial()),
        };

        if current != attempt.expected_revision() {
            warn!(
                current = %current,
                "[postgres.concurrency_conflict] optimistic concurrency check failed"
            );
            return Err(concurrency_conflict(&attempt, current));
        }

        let commit_sequence = sequence.next();
        let start_revision = attempt.expected_revision().next();
        let stream_revision = attempt.expected_revision().advance(attempt.events().len());

        let inserted = query(
            "INSERT INTO streamstore_commits
                 (stream_id, commit_id, commit_sequence, start_revision, stream_revision, events)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING commit_stamp",
        )
        .bind(attempt.stream_id().as_ref())
        .bind(commit_uuid(attempt.commit_id()))
        .bind(to_db(commit_sequence.into_inner()))
        .bind(to_db(start_revision.into_inner()))
        .bind(to_db(stream_revision.into_inner()))
        .bind(Json(events))
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(error) if is_unique_violation(&error) => {
                // A concurrent writer committed between our head check and insert.
                drop(tx);
                return Err(self.classify_lost_race(&attempt).await);
            }
            Err(error) => return Err(map_sqlx_error(error, Operation::Append)),
        };

        let commit_stamp: DateTime<Utc> = row
            .try_get("commit_stamp")
            .map_err(|error| map_sqlx_error(error, Operation::Append))?;

        match tx.commit().await {
            Ok(()) => {}
            Err(error) if is_unique_violation(&error) => {
                return Err(self.classify_lost_race(&attempt).await);
            }
            Err(error) => return Err(map_sqlx_error(error, Operation::CommitTransaction)),
        }

        let commit = attempt.into_commit(commit_sequence, Timestamp::new(commit_stamp));
        info!(
            commit_sequence = %commit.commit_sequence(),
            revision = %commit.stream_revision(),
            "[postgres.append] commit recorded"
        );
        Ok(commit)
    }

    #[instrument(name = "postgres.read_commits", skip(self))]
    async fn read_commits(
        &self,
        stream_id: &StreamId,
        min_revision: StreamRevision,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Vec<Commit>> {
        let rows = query(
            "SELECT commit_id, commit_sequence, stream_revision, commit_stamp, events
             FROM streamstore_commits
             WHERE stream_id = $1 AND stream_revision > $2 AND start_revision <= $3
             ORDER BY commit_sequence ASC",
        )
        .bind(stream_id.as_ref())
        .bind(to_db(min_revision.into_inner()))
        .bind(to_db(max_revision.into_inner()))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::ReadCommits))?;

        let commits = rows
            .iter()
            .map(|row| commit_from_row(stream_id, row))
            .collect::<EventStoreResult<Vec<_>>>()?;

        debug!(
            commit_count = commits.len(),
            "[postgres.read_commits] commits read"
        );
        Ok(commits)
    }

    #[instrument(name = "postgres.stream_head", skip(self))]
    async fn stream_head(&self, stream_id: &StreamId) -> EventStoreResult<Option<StreamHead>> {
        let row = query(
            "SELECT c.stream_revision, c.commit_sequence,
                    COALESCE((SELECT MAX(s.stream_revision) FROM streamstore_snapshots s
                              WHERE s.stream_id = c.stream_id), 0) AS snapshot_revision
             FROM streamstore_commits c
             WHERE c.stream_id = $1
             ORDER BY c.commit_sequence DESC
             LIMIT 1",
        )
        .bind(stream_id.as_ref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::ReadStreamHead))?;

        row.map(|row| head_from_row(stream_id.clone(), &row, Operation::ReadStreamHead))
            .transpose()
    }

    #[instrument(name = "postgres.get_snapshot", skip(self))]
    async fn get_snapshot(
        &self,
        stream_id: &StreamId,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Option<Snapshot>> {
        let row = query(
            "SELECT stream_revision, payload FROM streamstore_snapshots
             WHERE stream_id = $1 AND stream_revision <= $2
             ORDER BY stream_revision DESC
             LIMIT 1",
        )
        .bind(stream_id.as_ref())
        .bind(to_db(max_revision.into_inner()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::GetSnapshot))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let revision = column_u64(&row, "stream_revision", Operation::GetSnapshot)?;
        let payload: Value = row
            .try_get("payload")
            .map_err(|error| map_sqlx_error(error, Operation::GetSnapshot))?;

        Ok(Some(Snapshot::new(
            stream_id.clone(),
            StreamRevision::new(revision),
            payload,
        )))
    }

    #[instrument(
        name = "postgres.add_snapshot",
        skip(self, snapshot),
        fields(stream_id = %snapshot.stream_id(), revision = %snapshot.stream_revision())
    )]
    async fn add_snapshot(&self, snapshot: Snapshot) -> EventStoreResult<bool> {
        // A stream never rewinds, so checking its commits within the insert is enough.
        let result = query(
            "INSERT INTO streamstore_snapshots (stream_id, stream_revision, payload)
             SELECT $1, $2, $3
             WHERE EXISTS (
                 SELECT 1 FROM streamstore_commits
                 WHERE stream_id = $1 AND stream_revision >= $2
             )
             ON CONFLICT (stream_id, stream_revision) DO NOTHING",
        )
        .bind(snapshot.stream_id().as_ref())
        .bind(to_db(snapshot.stream_revision().into_inner()))
        .bind(Json(snapshot.payload()))
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::AddSnapshot))?;

        let added = result.rows_affected() == 1;
        if !added {
            debug!("[postgres.add_snapshot] snapshot exists or is ahead of the stream");
        }
        Ok(added)
    }

    #[instrument(name = "postgres.streams_to_snapshot", skip(self))]
    async fn streams_to_snapshot(&self, threshold: u64) -> EventStoreResult<Vec<StreamHead>> {
        let rows = query(
            r#"
            SELECT h.stream_id, h.stream_revision, h.commit_sequence,
                   COALESCE(s.snapshot_revision, 0) AS snapshot_revision
            FROM (
                SELECT DISTINCT ON (stream_id) stream_id, stream_revision, commit_sequence
                FROM streamstore_commits
                ORDER BY stream_id, commit_sequence DESC
            ) h
            LEFT JOIN (
                SELECT stream_id, MAX(stream_revision) AS snapshot_revision
                FROM streamstore_snapshots
                GROUP BY stream_id
            ) s ON s.stream_id = h.stream_id
            WHERE GREATEST(h.stream_revision - COALESCE(s.snapshot_revision, 0), 0) >= $1
            ORDER BY h.stream_id COLLATE "C"
            "#,
        )
        .bind(to_db(threshold))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::StreamsToSnapshot))?;

        rows.iter()
            .map(|row| {
                let raw: String = row
                    .try_get("stream_id")
                    .map_err(|error| map_sqlx_error(error, Operation::StreamsToSnapshot))?;
                let stream_id = StreamId::try_new(raw).map_err(|error| {
                    EventStoreError::DeserializationFailed {
                        event_type: "stream_id".to_string(),
                        detail: error.to_string(),
                    }
                })?;
                head_from_row(stream_id, row, Operation::StreamsToSnapshot)
            })
            .collect()
    }
}

impl PostgresPersistence {
    /// Works out why an insert lost to a concurrent writer: the same commit id
    /// landing first is a duplicate, anything else moved the stream.
    async fn classify_lost_race(&self, attempt: &CommitAttempt) -> EventStoreError {
        let duplicate = query(
            "SELECT 1 FROM streamstore_commits WHERE stream_id = $1 AND commit_id = $2",
        )
        .bind(attempt.stream_id().as_ref())
        .bind(commit_uuid(attempt.commit_id()))
        .fetch_optional(&self.pool)
        .await;

        match duplicate {
            Ok(Some(_)) => {
                warn!(
                    commit_id = %attempt.commit_id(),
                    "[postgres.duplicate_commit] commit id recorded by a concurrent writer"
                );
                duplicate_commit(attempt)
            }
            Ok(None) => {
                let current = match self.stream_head(attempt.stream_id()).await {
                    Ok(head) => head.map_or_else(StreamRevision::initial, |head| head.revision),
                    Err(error) => return error,
                };
                warn!(
                    current = %current,
                    "[postgres.concurrency_conflict] concurrent commit won the race"
                );
                concurrency_conflict(attempt, current)
            }
            Err(error) => map_sqlx_error(error, Operation::Append),
        }
    }
}

fn commit_from_row(stream_id: &StreamId, row: &PgRow) -> EventStoreResult<Commit> {
    let commit_id: Uuid = row
        .try_get("commit_id")
        .map_err(|error| map_sqlx_error(error, Operation::ReadCommits))?;
    let commit_id =
        CommitId::try_new(commit_id).map_err(|error| EventStoreError::DeserializationFailed {
            event_type: "commit_id".to_string(),
            detail: error.to_string(),
        })?;
    let commit_stamp: DateTime<Utc> = row
        .try_get("commit_stamp")
        .map_err(|error| map_sqlx_error(error, Operation::ReadCommits))?;
    let events: Value = row
        .try_get("events")
        .map_err(|error| map_sqlx_error(error, Operation::ReadCommits))?;
    let events: Vec<EventEnvelope> =
        serde_json::from_value(events).map_err(|error| EventStoreError::DeserializationFailed {
            event_type: "commit events".to_string(),
            detail: error.to_string(),
        })?;

    Ok(Commit::restore(
        stream_id.clone(),
        commit_id,
        CommitSequence::new(column_u64(row, "commit_sequence", Operation::ReadCommits)?),
        StreamRevision::new(column_u64(row, "stream_revision", Operation::ReadCommits)?),
        Timestamp::new(commit_stamp),
        events,
    ))
}

fn head_from_row(
    stream_id: StreamId,
    row: &PgRow,
    operation: Operation,
) -> EventStoreResult<StreamHead> {
    Ok(StreamHead {
        stream_id,
        revision: StreamRevision::new(column_u64(row, "stream_revision", operation)?),
        commit_sequence: CommitSequence::new(column_u64(row, "commit_sequence", operation)?),
        snapshot_revision: StreamRevision::new(column_u64(row, "snapshot_revision", operation)?),
    })
}

fn column_u64(row: &PgRow, column: &str, operation: Operation) -> EventStoreResult<u64> {
    let value: i64 = row
        .try_get(column)
        .map_err(|error| map_sqlx_error(error, operation))?;
    from_db(column, value)
}

fn from_db(column: &str, value: i64) -> EventStoreResult<u64> {
    u64::try_from(value).map_err(|_| {
        error!(
            column,
            value,
            "[postgres.corrupt_row] negative value in a revision column"
        );
        EventStoreError::DeserializationFailed {
            event_type: column.to_string(),
            detail: format!("negative value {value}"),
        }
    })
}

/// Revisions are `u64` in Rust and `BIGINT` in the database; `unbounded()`
/// clamps to the largest storable value.
fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn commit_uuid(commit_id: CommitId) -> Uuid {
    *commit_id.as_ref()
}

fn duplicate_commit(attempt: &CommitAttempt) -> EventStoreError {
    EventStoreError::DuplicateCommit {
        stream_id: attempt.stream_id().clone(),
        commit_id: attempt.commit_id(),
    }
}

fn concurrency_conflict(attempt: &CommitAttempt, current: StreamRevision) -> EventStoreError {
    EventStoreError::ConcurrencyConflict {
        stream_id: attempt.stream_id().clone(),
        expected: attempt.expected_revision(),
        current,
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db_error) if db_error.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}

fn map_sqlx_error(error: sqlx::Error, operation: Operation) -> EventStoreError {
    error!(
        error = %error,
        operation = %operation,
        "[postgres.database_error] database operation failed"
    );
    EventStoreError::StoreFailure { operation }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_revision_clamps_to_bigint_max() {
        assert_eq!(to_db(StreamRevision::unbounded().into_inner()), i64::MAX);
        assert_eq!(to_db(42), 42);
    }

    #[test]
    fn negative_revision_columns_are_rejected() {
        assert_eq!(from_db("stream_revision", 7), Ok(7));
        assert_eq!(
            from_db("stream_revision", -1),
            Err(EventStoreError::DeserializationFailed {
                event_type: "stream_revision".to_string(),
                detail: "negative value -1".to_string(),
            })
        );
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn store_failures_name_the_operation() {
        let error = map_sqlx_error(sqlx::Error::PoolTimedOut, Operation::ReadCommits);

        assert_eq!(
            error,
            EventStoreError::StoreFailure {
                operation: Operation::ReadCommits
            }
        );
    }
}
