use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::error::EvalError;
use crate::eval::ResultSink;
use crate::model::{RetrievalResult, SearchHit};
use crate::util::now_utc_string;

pub struct CheckpointStore {
    connection: Connection,
    run_key: String,
}

impl CheckpointStore {
    pub fn open(db_path: &Path, run_key: impl Into<String>) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            crate::util::ensure_directory(parent)?;
        }

        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;

        Ok(Self {
            connection,
            run_key: run_key.into(),
        })
    }

    #[cfg(test)]
    fn open_in_memory(run_key: &str) -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        ensure_schema(&connection)?;
        Ok(Self {
            connection,
            run_key: run_key.to_string(),
        })
    }

    pub fn append(&self, pair_index: usize, result: &RetrievalResult) -> Result<()> {
        insert_checkpoint(&self.connection, &self.run_key, pair_index, result)
    }

    pub fn reset<'r>(
        &mut self,
        entries: impl IntoIterator<Item = (usize, &'r RetrievalResult)>,
    ) -> Result<()> {
        let tx = self.connection.transaction()?;
        tx.execute(
            "DELETE FROM retrieval_checkpoints WHERE run_key = ?1",
            params![self.run_key],
        )?;
        for (pair_index, result) in entries {
            insert_checkpoint(&tx, &self.run_key, pair_index, result)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<(usize, RetrievalResult)>> {
        let mut statement = self.connection.prepare(
            "
            SELECT pair_index, record_id, question_idx, question, hits_json
            FROM retrieval_checkpoints
            WHERE run_key = ?1
            ORDER BY pair_index ASC
            ",
        )?;

        let mut rows = statement.query(params![self.run_key])?;
        let mut out = Vec::<(usize, RetrievalResult)>::new();

        while let Some(row) = rows.next()? {
            let pair_index = row.get::<_, i64>(0)? as usize;
            let hits_json: String = row.get(4)?;
            let search_results: Vec<SearchHit> = serde_json::from_str(&hits_json)
                .with_context(|| format!("corrupt checkpoint at pair {pair_index}"))?;

            out.push((
                pair_index,
                RetrievalResult {
                    id: row.get(1)?,
                    question_idx: row.get::<_, i64>(2)? as usize,
                    question: row.get(3)?,
                    search_results,
                },
            ));
        }

        Ok(out)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.connection.query_row(
            "SELECT COUNT(*) FROM retrieval_checkpoints WHERE run_key = ?1",
            params![self.run_key],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn clear(&self) -> Result<usize> {
        let removed = self.connection.execute(
            "DELETE FROM retrieval_checkpoints WHERE run_key = ?1",
            params![self.run_key],
        )?;
        Ok(removed)
    }
}

impl ResultSink for CheckpointStore {
    fn record(&mut self, pair_index: usize, result: &RetrievalResult) -> Result<(), EvalError> {
        self.append(pair_index, result)
            .map_err(|err| EvalError::Checkpoint(format!("{err:#}")))
    }
}

fn insert_checkpoint(
    connection: &Connection,
    run_key: &str,
    pair_index: usize,
    result: &RetrievalResult,
) -> Result<()> {
    let hits_json =
        serde_json::to_string(&result.search_results).context("failed to serialize search hits")?;

    connection.execute(
        "
        INSERT INTO retrieval_checkpoints(run_key, pair_index, record_id, question_idx, question, hits_json, recorded_at)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(run_key, pair_index) DO UPDATE SET
          record_id=excluded.record_id,
          question_idx=excluded.question_idx,
          question=excluded.question,
          hits_json=excluded.hits_json,
          recorded_at=excluded.recorded_at
        ",
        params![
            run_key,
            pair_index as i64,
            result.id,
            result.question_idx as i64,
            result.question,
            hits_json,
            now_utc_string(),
        ],
    )?;

    Ok(())
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS retrieval_checkpoints (
          run_key TEXT NOT NULL,
          pair_index INTEGER NOT NULL,
          record_id TEXT NOT NULL,
          question_idx INTEGER NOT NULL,
          question TEXT NOT NULL,
          hits_json TEXT NOT NULL,
          recorded_at TEXT NOT NULL,
          PRIMARY KEY(run_key, pair_index)
        );
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::CheckpointStore;
    use crate::eval::ResultSink;
    use crate::model::{RetrievalResult, SearchHit};

    fn result(id: &str, question_idx: usize) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            question: format!("{id} question {question_idx}"),
            question_idx,
            search_results: vec![SearchHit {
                id: id.to_string(),
                score: 0.75,
                attributes: Default::default(),
            }],
        }
    }

    #[test]
    fn load_returns_results_in_pair_order() {
        let mut store = CheckpointStore::open_in_memory("golden-abc").unwrap();
        store.record(1, &result("R1", 1)).unwrap();
        store.record(0, &result("R1", 0)).unwrap();
        store.record(2, &result("R2", 0)).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(
            loaded,
            vec![
                (0, result("R1", 0)),
                (1, result("R1", 1)),
                (2, result("R2", 0))
            ]
        );
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn load_keeps_pair_indices_across_skipped_pairs() {
        let store = CheckpointStore::open_in_memory("golden-abc").unwrap();
        store.append(0, &result("R1", 0)).unwrap();
        store.append(2, &result("R1", 2)).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(
            loaded.iter().map(|(index, _)| *index).collect::<Vec<usize>>(),
            vec![0, 2]
        );
    }

    #[test]
    fn run_keys_are_isolated_and_clearable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("checkpoints.sqlite");

        let first = CheckpointStore::open(&db_path, "run-a").unwrap();
        first.append(0, &result("R1", 0)).unwrap();
        let second = CheckpointStore::open(&db_path, "run-b").unwrap();
        assert!(second.load().unwrap().is_empty());

        assert_eq!(first.clear().unwrap(), 1);
        assert_eq!(first.count().unwrap(), 0);
    }

    #[test]
    fn reset_replaces_every_checkpoint() {
        let mut store = CheckpointStore::open_in_memory("k").unwrap();
        store.append(0, &result("R1", 0)).unwrap();
        store.append(1, &result("R1", 1)).unwrap();
        store.append(2, &result("R1", 2)).unwrap();

        let kept = [result("R1", 0), result("R1", 2)];
        store.reset([(0, &kept[0]), (2, &kept[1])]).unwrap();
        assert_eq!(
            store.load().unwrap(),
            vec![(0, result("R1", 0)), (2, result("R1", 2))]
        );
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn rewriting_a_pair_replaces_it() {
        let store = CheckpointStore::open_in_memory("k").unwrap();
        store.append(0, &result("R1", 0)).unwrap();
        store.append(0, &result("R9", 3)).unwrap();
        assert_eq!(store.load().unwrap(), vec![(0, result("R9", 3))]);
    }
}
