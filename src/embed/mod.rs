//! Embedding backfill.
//!
//! Nullity of `description_embedding` is the work queue: a run selects every
//! series with a description and no embedding, embeds the descriptions in one
//! batch call, and writes the vectors back in one transaction. Either all
//! selected rows are embedded or none are.

use rusqlite::params;
use tracing::info;

use crate::error::IngestError;
use crate::store::Store;

pub mod hash;

pub use hash::HashEmbedder;

const ORIGIN: &str = "vectorizer";

/// Text-to-vector function used by the backfill.
pub trait Vectorizer {
    /// Stored in `embedding_model` next to each vector.
    fn model_name(&self) -> &str;

    /// One vector per input text, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IngestError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub selected: usize,
    pub embedded: usize,
    /// `None` when nothing was pending and no vectorizer was built.
    pub model: Option<String>,
}

/// Serialize a vector as little-endian `f32`s.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Embed every pending description, at most `batch_size` of them.
///
/// `make_vectorizer` is only called when at least one row is pending.
pub fn backfill<V: Vectorizer>(
    store: &mut Store,
    batch_size: Option<usize>,
    make_vectorizer: impl FnOnce() -> Result<V, IngestError>,
) -> Result<BackfillReport, IngestError> {
    if batch_size == Some(0) {
        return Err(IngestError::config("batch size must be > 0"));
    }
    let limit = batch_size.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));

    store.with_transaction(|tx| {
        let pending: Vec<(String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT series_id, series_description FROM series_metadata
                 WHERE series_description IS NOT NULL AND description_embedding IS NULL
                 ORDER BY series_id
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        if pending.is_empty() {
            info!("embedding_backfill_nothing_pending");
            return Ok(BackfillReport::default());
        }

        let vectorizer = make_vectorizer()?;
        let model = vectorizer.model_name().to_string();
        info!(selected = pending.len(), model = %model, "embedding_backfill_started");

        let texts: Vec<&str> = pending.iter().map(|(_, text)| text.as_str()).collect();
        let vectors = vectorizer.embed_batch(&texts)?;
        if vectors.len() != pending.len() {
            return Err(IngestError::malformed(
                ORIGIN,
                format!("expected {} vectors, got {}", pending.len(), vectors.len()),
            ));
        }

        let mut update = tx.prepare(
            "UPDATE series_metadata
             SET description_embedding = ?2, embedding_model = ?3
             WHERE series_id = ?1
               AND series_description IS NOT NULL AND description_embedding IS NULL",
        )?;
        let mut embedded = 0;
        for ((series_id, _), vector) in pending.iter().zip(&vectors) {
            if vector.is_empty() {
                return Err(IngestError::malformed(ORIGIN, format!("empty vector for {series_id}")));
            }
            embedded += update.execute(params![series_id, encode_embedding(vector), model])?;
        }

        info!(embedded, model = %model, "embedding_backfill_complete");
        Ok(BackfillReport {
            selected: pending.len(),
            embedded,
            model: Some(model),
        })
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::domain::NewSeries;
    use crate::store::upsert_series;

    fn seed(store: &Store, rows: &[(&str, Option<&str>)]) {
        let source_id = store.source_id("FRED").unwrap();
        for (id, description) in rows {
            let series = NewSeries {
                source_series_id: id.to_string(),
                series_name: id.to_string(),
                series_description: description.map(str::to_string),
                frequency: None,
                units: None,
                seasonal_adjustment: None,
                geography: None,
            };
            upsert_series(store.conn(), source_id, &series).unwrap();
        }
    }

    fn pending(store: &Store) -> i64 {
        store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM series_metadata
                 WHERE series_description IS NOT NULL AND description_embedding IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap()
    }

    /// Returns one vector too few.
    struct ShortVectorizer;

    impl Vectorizer for ShortVectorizer {
        fn model_name(&self) -> &str {
            "short"
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IngestError> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0]).collect())
        }
    }

    #[test]
    fn backfill_embeds_each_row_exactly_once() {
        let mut store = Store::open_in_memory().unwrap();
        seed(&store, &[("A", Some("alpha")), ("B", Some("beta")), ("C", None)]);

        let report = backfill(&mut store, None, || HashEmbedder::new(8)).unwrap();
        assert_eq!(report.selected, 2);
        assert_eq!(report.embedded, 2);
        assert_eq!(report.model.as_deref(), Some("fnv1a-8"));
        assert_eq!(pending(&store), 0);

        let blob: Vec<u8> = store
            .conn()
            .query_row(
                "SELECT description_embedding FROM series_metadata WHERE source_series_id = 'A'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(decode_embedding(&blob).unwrap().len(), 8);

        let again = backfill(&mut store, None, || HashEmbedder::new(8)).unwrap();
        assert_eq!(again, BackfillReport::default());
    }

    #[test]
    fn empty_selection_never_builds_the_vectorizer() {
        let mut store = Store::open_in_memory().unwrap();
        seed(&store, &[("C", None)]);
        let built = Cell::new(false);

        let report = backfill(&mut store, None, || {
            built.set(true);
            HashEmbedder::new(8)
        })
        .unwrap();
        assert_eq!(report.selected, 0);
        assert!(!built.get());
    }

    #[test]
    fn wrong_vector_count_rolls_back_every_update() {
        let mut store = Store::open_in_memory().unwrap();
        seed(&store, &[("A", Some("alpha")), ("B", Some("beta"))]);

        let err = backfill(&mut store, None, || Ok(ShortVectorizer)).unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
        assert_eq!(pending(&store), 2);
    }

    #[test]
    fn batch_size_limits_one_run() {
        let mut store = Store::open_in_memory().unwrap();
        seed(&store, &[("A", Some("a")), ("B", Some("b")), ("C", Some("c"))]);

        let report = backfill(&mut store, Some(2), || HashEmbedder::new(8)).unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(pending(&store), 1);
        assert!(backfill(&mut store, Some(0), || HashEmbedder::new(8)).is_err());
    }

    #[test]
    fn changed_description_is_embedded_again() {
        let mut store = Store::open_in_memory().unwrap();
        seed(&store, &[("A", Some("alpha"))]);
        backfill(&mut store, None, || HashEmbedder::new(8)).unwrap();

        seed(&store, &[("A", Some("alpha, revised"))]);
        assert_eq!(pending(&store), 1);
        assert_eq!(backfill(&mut store, None, || HashEmbedder::new(8)).unwrap().embedded, 1);
    }

    #[test]
    fn embedding_blob_is_little_endian_f32() {
        let bytes = encode_embedding(&[1.0, -0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_embedding(&bytes), Some(vec![1.0, -0.5]));
        assert_eq!(decode_embedding(&[0, 1, 2]), None);
    }
}
