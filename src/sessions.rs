//! Storage for completed analyses.
//!
//! Each analysis becomes one session row plus one row per detected component.
//! Nested data (warnings, guidance, properties) is stored as JSON text.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{LensError, Result};
use crate::schemas::{AnalysisResult, Component, Step, Warning};

pub const DEFAULT_IMAGE_PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSummary {
    pub observations: String,
    pub components_summary: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub id: String,
    pub experiment_id: Option<String>,
    pub image_data: String,
    pub ai_observations: ObservationSummary,
    pub predicted_outcome: String,
    pub safety_warnings: Vec<Warning>,
    pub guidance: Vec<Step>,
    pub confidence_score: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPosition {
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: String,
    pub session_id: String,
    pub component_type: String,
    pub detected_properties: BTreeMap<String, Value>,
    pub position: ComponentPosition,
    pub connections: Vec<String>,
}

/// Persistence seam used by the HTTP layer. Failures are not recovered here.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(
        &self,
        experiment_id: Option<&str>,
        image_data: &str,
        analysis: &AnalysisResult,
    ) -> Result<String>;

    async fn create_component(&self, session_id: &str, component: &Component) -> Result<String>;

    async fn get_session(&self, session_id: &str) -> Result<Option<AnalysisSession>>;

    async fn list_components(&self, session_id: &str) -> Result<Vec<ComponentRecord>>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS analysis_sessions (
    id                TEXT PRIMARY KEY,
    experiment_id     TEXT,
    image_data        TEXT NOT NULL,
    ai_observations   TEXT NOT NULL,
    predicted_outcome TEXT NOT NULL,
    safety_warnings   TEXT NOT NULL,
    guidance          TEXT NOT NULL,
    confidence_score  REAL NOT NULL,
    status            TEXT NOT NULL,
    created_at        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS experiment_components (
    id                  TEXT PRIMARY KEY,
    session_id          TEXT NOT NULL REFERENCES analysis_sessions(id),
    component_type      TEXT NOT NULL,
    detected_properties TEXT NOT NULL,
    position            TEXT NOT NULL,
    connections         TEXT NOT NULL,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_components_session ON experiment_components(session_id);
";

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
    preview_chars: usize,
}

impl SqliteSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open `database_path`, treating ":memory:" as an in-process database.
    pub fn from_config(storage: &crate::config::StorageConfig) -> Result<Self> {
        let store = if storage.database_path == ":memory:" {
            Self::open_in_memory()?
        } else {
            Self::open(&storage.database_path)?
        };
        Ok(store.with_preview_chars(storage.image_preview_chars))
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            preview_chars: DEFAULT_IMAGE_PREVIEW_CHARS,
        })
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| LensError::persistence("session database lock poisoned"))?;
            f(&conn)
        })
        .await
        .map_err(|e| LensError::persistence(format!("session database task failed: {}", e)))?
    }
}

fn preview(image_data: &str, chars: usize) -> String {
    image_data.chars().take(chars).collect()
}

struct SessionRow {
    id: String,
    experiment_id: Option<String>,
    image_data: String,
    ai_observations: String,
    predicted_outcome: String,
    safety_warnings: String,
    guidance: String,
    confidence_score: f64,
    status: String,
    created_at: String,
}

impl SessionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            experiment_id: row.get(1)?,
            image_data: row.get(2)?,
            ai_observations: row.get(3)?,
            predicted_outcome: row.get(4)?,
            safety_warnings: row.get(5)?,
            guidance: row.get(6)?,
            confidence_score: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_session(self) -> Result<AnalysisSession> {
        Ok(AnalysisSession {
            id: self.id,
            experiment_id: self.experiment_id,
            image_data: self.image_data,
            ai_observations: serde_json::from_str(&self.ai_observations)?,
            predicted_outcome: self.predicted_outcome,
            safety_warnings: serde_json::from_str(&self.safety_warnings)?,
            guidance: serde_json::from_str(&self.guidance)?,
            confidence_score: self.confidence_score,
            status: self.status,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)?.with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(
        &self,
        experiment_id: Option<&str>,
        image_data: &str,
        analysis: &AnalysisResult,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let summary = ObservationSummary {
            observations: analysis.observations.clone(),
            components_summary: analysis.components.len(),
        };
        let observations_json = serde_json::to_string(&summary)?;
        let warnings_json = serde_json::to_string(&analysis.safety_warnings)?;
        let guidance_json = serde_json::to_string(&analysis.guidance)?;
        let image_preview = preview(image_data, self.preview_chars);
        let created_at = Utc::now().to_rfc3339();
        let experiment_id = experiment_id.map(str::to_string);
        let predicted_outcome = analysis.predicted_outcome.clone();
        let confidence_score = analysis.confidence_score;
        let row_id = id.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO analysis_sessions (id, experiment_id, image_data, ai_observations, predicted_outcome, safety_warnings, guidance, confidence_score, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'completed', ?9)",
                params![
                    row_id,
                    experiment_id,
                    image_preview,
                    observations_json,
                    predicted_outcome,
                    warnings_json,
                    guidance_json,
                    confidence_score,
                    created_at,
                ],
            )?;
            Ok(())
        })
        .await?;

        tracing::debug!("Stored analysis session {}", id);
        Ok(id)
    }

    async fn create_component(&self, session_id: &str, component: &Component) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let component_type = if component.component_type.trim().is_empty() {
            "unknown".to_string()
        } else {
            component.component_type.clone()
        };
        let properties_json = serde_json::to_string(&component.properties)?;
        let position_json = serde_json::to_string(&ComponentPosition {
            description: component.position.clone(),
        })?;
        let connections_json = serde_json::to_string(&component.connections)?;
        let created_at = Utc::now().to_rfc3339();
        let session_id = session_id.to_string();
        let row_id = id.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO experiment_components (id, session_id, component_type, detected_properties, position, connections, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row_id,
                    session_id,
                    component_type,
                    properties_json,
                    position_json,
                    connections_json,
                    created_at,
                ],
            )?;
            Ok(())
        })
        .await?;

        Ok(id)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<AnalysisSession>> {
        let session_id = session_id.to_string();
        let row = self
            .with_conn(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, experiment_id, image_data, ai_observations, predicted_outcome, safety_warnings, guidance, confidence_score, status, created_at
                         FROM analysis_sessions WHERE id = ?1",
                        params![session_id],
                        SessionRow::from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn list_components(&self, session_id: &str) -> Result<Vec<ComponentRecord>> {
        let session_id = session_id.to_string();
        let rows: Vec<(String, String, String, String, String, String)> =
            self.with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, session_id, component_type, detected_properties, position, connections
                     FROM experiment_components WHERE session_id = ?1 ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map(params![session_id], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, session_id, component_type, props, position, connections)| {
                Ok(ComponentRecord {
                    id,
                    session_id,
                    component_type,
                    detected_properties: serde_json::from_str(&props)?,
                    position: serde_json::from_str(&position)?,
                    connections: serde_json::from_str(&connections)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback;
    use crate::schemas::ExperimentDomain;

    #[tokio::test]
    async fn session_round_trip() {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        let analysis = fallback::generate(ExperimentDomain::Chemistry);

        let id = store
            .create_session(Some("exp-42"), "data:image/jpeg;base64,AAAA", &analysis)
            .await
            .unwrap();
        let session = store.get_session(&id).await.unwrap().unwrap();

        assert_eq!(session.id, id);
        assert_eq!(session.experiment_id.as_deref(), Some("exp-42"));
        assert_eq!(session.status, "completed");
        assert_eq!(session.ai_observations.observations, analysis.observations);
        assert_eq!(session.ai_observations.components_summary, 2);
        assert_eq!(session.safety_warnings, analysis.safety_warnings);
        assert_eq!(session.guidance, analysis.guidance);
        assert_eq!(session.confidence_score, 0.75);
    }

    #[tokio::test]
    async fn image_preview_is_truncated() {
        let store = SqliteSessionStore::open_in_memory()
            .unwrap()
            .with_preview_chars(10);
        let analysis = fallback::generate(ExperimentDomain::Physics);
        let image = "A".repeat(5_000);

        let id = store.create_session(None, &image, &analysis).await.unwrap();
        let session = store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(session.image_data, "A".repeat(10));
        assert!(session.experiment_id.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writers_share_one_connection() {
        let store = Arc::new(SqliteSessionStore::open_in_memory().unwrap());
        let analysis = fallback::generate(ExperimentDomain::Physics);

        let mut handles = Vec::new();
        for n in 0..8 {
            let store = Arc::clone(&store);
            let analysis = analysis.clone();
            handles.push(tokio::spawn(async move {
                let experiment = format!("exp-{n}");
                store
                    .create_session(Some(&experiment), "img", &analysis)
                    .await
            }));
        }

        for handle in handles {
            let id = handle.await.unwrap().unwrap();
            let session = store.get_session(&id).await.unwrap().unwrap();
            assert_eq!(session.confidence_score, 0.80);
        }
    }

    #[tokio::test]
    async fn unknown_session_is_none() {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        assert!(store.get_session("missing").await.unwrap().is_none());
        assert!(store.list_components("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn components_are_stored_in_order() {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        let analysis = fallback::generate(ExperimentDomain::Circuits);
        let id = store.create_session(None, "img", &analysis).await.unwrap();
        for component in &analysis.components {
            store.create_component(&id, component).await.unwrap();
        }
        let blank = Component {
            component_type: " ".to_string(),
            properties: BTreeMap::new(),
            position: String::new(),
            connections: vec![],
        };
        store.create_component(&id, &blank).await.unwrap();

        let records = store.list_components(&id).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].component_type, "LED");
        assert_eq!(records[0].position.description, "center of breadboard");
        assert_eq!(records[0].detected_properties["color"], "red");
        assert_eq!(records[1].connections, vec!["LED", "ground wire"]);
        assert_eq!(records[2].component_type, "unknown");
    }
}
