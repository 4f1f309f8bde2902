//! LanceDB note backend
//!
//! Persistent [`NoteBackend`](crate::store::vector::NoteBackend)
//! implementation over a local LanceDB table. Provenance records and
//! metadata are stored as JSON columns; embeddings live in a fixed-size
//! float column sized at connection time.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, Int32Array, RecordBatch,
    RecordBatchIterator, StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::error::{EngramError, Result};
use crate::memory::types::{Note, Section};
use crate::store::vector::NoteBackend;

const NOTES_TABLE: &str = "notes";

/// LanceDB-backed note storage.
pub struct LanceNoteBackend {
    #[allow(dead_code)]
    connection: Connection,
    table: Table,
    dimension: i32,
}

impl LanceNoteBackend {
    /// Connect to (or create) the notes table at the given path.
    pub async fn connect(path: &Path, dimension: usize) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| EngramError::Storage("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to connect to LanceDB: {e}")))?;

        let dimension = dimension as i32;

        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to list tables: {e}")))?;

        let table = if names.contains(&NOTES_TABLE.to_string()) {
            tracing::debug!("Opening existing notes table");
            connection
                .open_table(NOTES_TABLE)
                .execute()
                .await
                .map_err(|e| EngramError::Storage(format!("Failed to open notes table: {e}")))?
        } else {
            tracing::info!("Creating notes table");
            let schema = Self::notes_schema(dimension);
            let batch = Self::create_empty_batch(schema.clone(), dimension);
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            connection
                .create_table(NOTES_TABLE, Box::new(batches))
                .execute()
                .await
                .map_err(|e| EngramError::Storage(format!("Failed to create notes table: {e}")))?
        };

        Ok(Self {
            connection,
            table,
            dimension,
        })
    }

    fn notes_schema(dimension: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("section", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
            Field::new("has_embedding", DataType::Boolean, false),
            Field::new("importance", DataType::Float32, false),
            Field::new("decay_rate", DataType::Float32, false),
            Field::new("access_count", DataType::Int32, false),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "updated_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "last_accessed",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new("source", DataType::Utf8, true),
            Field::new("source_history", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
        ]))
    }

    fn create_empty_batch(schema: Arc<Schema>, dimension: i32) -> RecordBatch {
        let empty_strings: Vec<Option<&str>> = vec![];
        let empty_floats: Vec<f32> = vec![];
        let empty_bools: Vec<bool> = vec![];
        let empty_ints: Vec<i32> = vec![];
        let empty_timestamps: Vec<i64> = vec![];
        let empty_embeddings: Vec<Option<Vec<Option<f32>>>> = vec![];

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(empty_embeddings, dimension)),
                Arc::new(BooleanArray::from(empty_bools)),
                Arc::new(Float32Array::from(empty_floats.clone())),
                Arc::new(Float32Array::from(empty_floats)),
                Arc::new(Int32Array::from(empty_ints)),
                Arc::new(
                    TimestampMicrosecondArray::from(empty_timestamps.clone()).with_timezone("UTC"),
                ),
                Arc::new(
                    TimestampMicrosecondArray::from(empty_timestamps.clone()).with_timezone("UTC"),
                ),
                Arc::new(TimestampMicrosecondArray::from(empty_timestamps).with_timezone("UTC")),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings)),
            ],
        )
        .expect("Schema matches columns")
    }

    fn section_token(section: Section) -> &'static str {
        match section {
            Section::KeyTopics => "KeyTopics",
            Section::ImportantFacts => "ImportantFacts",
            Section::PeopleEntities => "PeopleEntities",
            Section::OngoingThreads => "OngoingThreads",
            Section::FileKnowledge => "FileKnowledge",
        }
    }

    fn parse_section(token: &str) -> Result<Section> {
        match token {
            "KeyTopics" => Ok(Section::KeyTopics),
            "ImportantFacts" => Ok(Section::ImportantFacts),
            "PeopleEntities" => Ok(Section::PeopleEntities),
            "OngoingThreads" => Ok(Section::OngoingThreads),
            "FileKnowledge" => Ok(Section::FileKnowledge),
            other => Err(EngramError::Storage(format!("Unknown section: {other}"))),
        }
    }

    /// Convert a Note to an Arrow RecordBatch
    fn note_to_batch(&self, note: &Note, schema: Arc<Schema>) -> Result<RecordBatch> {
        let embedding_values: Vec<Option<f32>> = match &note.embedding {
            Some(embedding) => {
                if embedding.len() != self.dimension as usize {
                    return Err(EngramError::Storage(format!(
                        "Embedding dimension {} does not match table dimension {}",
                        embedding.len(),
                        self.dimension
                    )));
                }
                embedding.iter().map(|&v| Some(v)).collect()
            }
            None => vec![Some(0.0); self.dimension as usize],
        };
        let embeddings: Vec<Option<Vec<Option<f32>>>> = vec![Some(embedding_values)];

        let source_json: Vec<Option<String>> = vec![
            note.source
                .as_ref()
                .map(|s| serde_json::to_string(s))
                .transpose()
                .map_err(|e| EngramError::Serialization(e.to_string()))?,
        ];
        let history_json = serde_json::to_string(&note.source_history)
            .map_err(|e| EngramError::Serialization(e.to_string()))?;
        let metadata_json = serde_json::to_string(&note.metadata)
            .map_err(|e| EngramError::Serialization(e.to_string()))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![note.id.as_str()])),
                Arc::new(StringArray::from(vec![note.content.as_str()])),
                Arc::new(StringArray::from(vec![Self::section_token(note.section)])),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(embeddings, self.dimension)),
                Arc::new(BooleanArray::from(vec![note.embedding.is_some()])),
                Arc::new(Float32Array::from(vec![note.importance])),
                Arc::new(Float32Array::from(vec![note.decay_rate])),
                Arc::new(Int32Array::from(vec![note.access_count as i32])),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![note.created_at.timestamp_micros()])
                        .with_timezone("UTC"),
                ),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![note.updated_at.timestamp_micros()])
                        .with_timezone("UTC"),
                ),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![note.last_accessed.timestamp_micros()])
                        .with_timezone("UTC"),
                ),
                Arc::new(StringArray::from(source_json)),
                Arc::new(StringArray::from(vec![history_json.as_str()])),
                Arc::new(StringArray::from(vec![metadata_json.as_str()])),
            ],
        )
        .map_err(|e| EngramError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    /// Convert an Arrow RecordBatch row back to a Note
    fn batch_to_note(batch: &RecordBatch, row: usize) -> Result<Note> {
        fn column<'a, T: 'static>(batch: &'a RecordBatch, index: usize, name: &str) -> Result<&'a T> {
            batch
                .column(index)
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| EngramError::Storage(format!("Failed to get {name} column")))
        }

        fn timestamp(
            array: &TimestampMicrosecondArray,
            row: usize,
            name: &str,
        ) -> Result<DateTime<Utc>> {
            Utc.timestamp_micros(array.value(row)).single().ok_or_else(|| {
                EngramError::Storage(format!("Failed to parse {name} timestamp"))
            })
        }

        let id_array: &StringArray = column(batch, 0, "id")?;
        let content_array: &StringArray = column(batch, 1, "content")?;
        let section_array: &StringArray = column(batch, 2, "section")?;
        let embedding_array: &FixedSizeListArray = column(batch, 3, "embedding")?;
        let has_embedding_array: &BooleanArray = column(batch, 4, "has_embedding")?;
        let importance_array: &Float32Array = column(batch, 5, "importance")?;
        let decay_rate_array: &Float32Array = column(batch, 6, "decay_rate")?;
        let access_count_array: &Int32Array = column(batch, 7, "access_count")?;
        let created_at_array: &TimestampMicrosecondArray = column(batch, 8, "created_at")?;
        let updated_at_array: &TimestampMicrosecondArray = column(batch, 9, "updated_at")?;
        let last_accessed_array: &TimestampMicrosecondArray = column(batch, 10, "last_accessed")?;
        let source_array: &StringArray = column(batch, 11, "source")?;
        let history_array: &StringArray = column(batch, 12, "source_history")?;
        let metadata_array: &StringArray = column(batch, 13, "metadata")?;

        let embedding = if has_embedding_array.value(row) {
            let values = embedding_array.value(row);
            let floats = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| EngramError::Storage("Failed to get embedding values".to_string()))?;
            Some((0..floats.len()).map(|i| floats.value(i)).collect())
        } else {
            None
        };

        let source = if source_array.is_null(row) {
            None
        } else {
            Some(
                serde_json::from_str(source_array.value(row))
                    .map_err(|e| EngramError::Serialization(e.to_string()))?,
            )
        };

        let source_history = serde_json::from_str(history_array.value(row))
            .map_err(|e| EngramError::Serialization(e.to_string()))?;
        let metadata = serde_json::from_str(metadata_array.value(row))
            .map_err(|e| EngramError::Serialization(e.to_string()))?;

        Ok(Note {
            id: id_array.value(row).to_string(),
            content: content_array.value(row).to_string(),
            section: Self::parse_section(section_array.value(row))?,
            embedding,
            importance: importance_array.value(row),
            decay_rate: decay_rate_array.value(row),
            access_count: access_count_array.value(row) as u32,
            created_at: timestamp(created_at_array, row, "created_at")?,
            updated_at: timestamp(updated_at_array, row, "updated_at")?,
            last_accessed: timestamp(last_accessed_array, row, "last_accessed")?,
            source,
            source_history,
            metadata,
        })
    }

    fn batches_to_notes(batches: &[RecordBatch]) -> Result<Vec<Note>> {
        let mut notes = Vec::new();
        for batch in batches {
            for row in 0..batch.num_rows() {
                notes.push(Self::batch_to_note(batch, row)?);
            }
        }
        Ok(notes)
    }

    async fn add_row(&self, note: &Note) -> Result<()> {
        let schema = Self::notes_schema(self.dimension);
        let batch = self.note_to_batch(note, schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to insert note: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl NoteBackend for LanceNoteBackend {
    async fn insert(&self, note: &Note) -> Result<()> {
        self.add_row(note).await
    }

    async fn replace(&self, note: &Note) -> Result<bool> {
        if self.get(&note.id).await?.is_none() {
            return Ok(false);
        }

        self.table
            .delete(&format!("id = '{}'", note.id))
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to replace note: {e}")))?;
        self.add_row(note).await?;
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<Note>> {
        let stream = self
            .table
            .query()
            .only_if(format!("id = '{id}'"))
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to query note: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to collect query results: {e}")))?;

        Ok(Self::batches_to_notes(&batches)?.into_iter().next())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let exists = self.get(id).await?.is_some();

        if exists {
            self.table
                .delete(&format!("id = '{id}'"))
                .await
                .map_err(|e| EngramError::Storage(format!("Failed to delete note: {e}")))?;
        }

        Ok(exists)
    }

    async fn search(
        &self,
        embedding: &[f32],
        section: Option<Section>,
        limit: usize,
    ) -> Result<Vec<Note>> {
        let mut filter = "has_embedding = true".to_string();
        if let Some(section) = section {
            filter.push_str(&format!(" AND section = '{}'", Self::section_token(section)));
        }

        let query = self
            .table
            .query()
            .nearest_to(embedding)
            .map_err(|e| EngramError::Storage(format!("Failed to create vector query: {e}")))?
            .only_if(filter)
            .limit(limit);

        let stream = query
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to execute search: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to collect search results: {e}")))?;

        Self::batches_to_notes(&batches)
    }

    async fn list(&self) -> Result<Vec<Note>> {
        let stream = self
            .table
            .query()
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to list notes: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to collect notes: {e}")))?;

        Self::batches_to_notes(&batches)
    }

    async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to count notes: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::SourceRecord;

    #[tokio::test]
    async fn test_connect_insert_get_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LanceNoteBackend::connect(temp_dir.path(), 8).await.unwrap();

        let note = Note::new("Lance round trip", Section::ImportantFacts)
            .with_embedding(vec![0.25; 8])
            .with_importance(0.7)
            .with_source(SourceRecord::conversation("sess-lance"));

        backend.insert(&note).await.unwrap();

        let fetched = backend.get(&note.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, note.content);
        assert_eq!(fetched.section, note.section);
        assert_eq!(fetched.importance, note.importance);
        assert_eq!(fetched.embedding, note.embedding);
        assert_eq!(fetched.source_history.len(), 1);
        assert_eq!(backend.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_note_without_embedding_round_trips_as_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LanceNoteBackend::connect(temp_dir.path(), 8).await.unwrap();

        let note = Note::new("No embedding here", Section::FileKnowledge);
        backend.insert(&note).await.unwrap();

        let fetched = backend.get(&note.id).await.unwrap().unwrap();
        assert!(fetched.embedding.is_none());
    }

    #[tokio::test]
    async fn test_search_excludes_embeddingless_and_filters_section() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LanceNoteBackend::connect(temp_dir.path(), 4).await.unwrap();

        backend
            .insert(&Note::new("Plain", Section::ImportantFacts))
            .await
            .unwrap();
        backend
            .insert(
                &Note::new("Fact vector", Section::ImportantFacts)
                    .with_embedding(vec![1.0, 0.0, 0.0, 0.0]),
            )
            .await
            .unwrap();
        backend
            .insert(
                &Note::new("Thread vector", Section::OngoingThreads)
                    .with_embedding(vec![1.0, 0.0, 0.0, 0.0]),
            )
            .await
            .unwrap();

        let all = backend
            .search(&[1.0, 0.0, 0.0, 0.0], None, 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let facts = backend
            .search(&[1.0, 0.0, 0.0, 0.0], Some(Section::ImportantFacts), 10)
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].content, "Fact vector");
    }

    #[tokio::test]
    async fn test_replace_preserves_single_row() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LanceNoteBackend::connect(temp_dir.path(), 4).await.unwrap();

        let mut note = Note::new("Replace me", Section::KeyTopics).with_embedding(vec![0.5; 4]);
        backend.insert(&note).await.unwrap();

        note.set_importance(0.9);
        note.access_count = 3;
        assert!(backend.replace(&note).await.unwrap());

        let fetched = backend.get(&note.id).await.unwrap().unwrap();
        assert_eq!(fetched.importance, 0.9);
        assert_eq!(fetched.access_count, 3);
        assert_eq!(backend.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reopen_existing_table() {
        let temp_dir = tempfile::tempdir().unwrap();

        let note = Note::new("Persisted", Section::KeyTopics).with_embedding(vec![0.1; 4]);
        {
            let backend = LanceNoteBackend::connect(temp_dir.path(), 4).await.unwrap();
            backend.insert(&note).await.unwrap();
        }

        let reopened = LanceNoteBackend::connect(temp_dir.path(), 4).await.unwrap();
        assert!(reopened.get(&note.id).await.unwrap().is_some());
    }
}
