//! Repository for render job documents.
//!
//! The composition script is stored as a JSON string in `script_json`; every
//! other field is a plain document field so the sweeper can query on
//! `status` and `updated_at`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use vreel_models::{CompositionScript, RenderJob, RenderJobId, RenderStatus, VideoId};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_precondition_conflict;
use crate::store::{RenderJobStore, Versioned};
use crate::types::{Document, Filter, StructuredQuery, ToFirestoreValue, Value};

pub const RENDER_JOBS_COLLECTION: &str = "render_jobs";

/// Repository for render jobs.
#[derive(Clone)]
pub struct RenderJobRepository {
    client: FirestoreClient,
}

impl RenderJobRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

pub fn job_to_fields(job: &RenderJob) -> FirestoreResult<HashMap<String, Value>> {
    let script_json = serde_json::to_string(&job.script)?;
    let mut fields = HashMap::new();
    fields.insert("video_id".to_string(), job.video_id.as_str().to_firestore_value());
    fields.insert("property_id".to_string(), job.property_id.to_firestore_value());
    fields.insert("owner_id".to_string(), job.owner_id.to_firestore_value());
    fields.insert("script_json".to_string(), script_json.to_firestore_value());
    fields.insert("status".to_string(), job.status.as_str().to_firestore_value());
    fields.insert(
        "requires_overlay_stage".to_string(),
        job.requires_overlay_stage.to_firestore_value(),
    );
    fields.insert(
        "first_stage_job_id".to_string(),
        job.first_stage_job_id.to_firestore_value(),
    );
    fields.insert(
        "second_stage_job_id".to_string(),
        job.second_stage_job_id.to_firestore_value(),
    );
    fields.insert("base_output_url".to_string(), job.base_output_url.to_firestore_value());
    fields.insert("output_url".to_string(), job.output_url.to_firestore_value());
    fields.insert("thumbnail_url".to_string(), job.thumbnail_url.to_firestore_value());
    fields.insert("duration".to_string(), job.duration.to_firestore_value());
    fields.insert("error_message".to_string(), job.error_message.to_firestore_value());
    fields.insert("attempt".to_string(), job.attempt.to_firestore_value());
    fields.insert(
        "previous_job_id".to_string(),
        job.previous_job_id
            .as_ref()
            .map(|id| id.as_str().to_string())
            .to_firestore_value(),
    );
    fields.insert("created_at".to_string(), job.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), job.updated_at.to_firestore_value());
    Ok(fields)
}

pub fn document_to_job(doc: &Document) -> FirestoreResult<RenderJob> {
    let id = doc
        .doc_id()
        .ok_or_else(|| FirestoreError::invalid_document("render job document has no name"))?;

    let status_raw: String = doc.get("status").unwrap_or_default();
    let status = RenderStatus::parse(&status_raw).ok_or_else(|| {
        FirestoreError::invalid_document(format!("render job {} has unknown status '{}'", id, status_raw))
    })?;

    let script_json: String = doc.get("script_json").ok_or_else(|| {
        FirestoreError::invalid_document(format!("render job {} has no script", id))
    })?;
    let script: CompositionScript = serde_json::from_str(&script_json)?;

    let video_id: String = doc.get("video_id").ok_or_else(|| {
        FirestoreError::invalid_document(format!("render job {} has no video_id", id))
    })?;
    let now = Utc::now();

    Ok(RenderJob {
        id: RenderJobId::from(id),
        video_id: VideoId::from(video_id),
        property_id: doc.get("property_id").unwrap_or_default(),
        owner_id: doc.get("owner_id").unwrap_or_default(),
        script,
        status,
        requires_overlay_stage: doc.get("requires_overlay_stage").unwrap_or(false),
        first_stage_job_id: doc.get("first_stage_job_id"),
        second_stage_job_id: doc.get("second_stage_job_id"),
        base_output_url: doc.get("base_output_url"),
        output_url: doc.get("output_url"),
        thumbnail_url: doc.get("thumbnail_url"),
        duration: doc.get("duration"),
        error_message: doc.get("error_message"),
        attempt: doc.get("attempt").unwrap_or(1),
        previous_job_id: doc.get::<String>("previous_job_id").map(RenderJobId::from),
        created_at: doc.get("created_at").unwrap_or(now),
        updated_at: doc.get("updated_at").unwrap_or(now),
    })
}

#[async_trait]
impl RenderJobStore for RenderJobRepository {
    async fn create_job(&self, job: &RenderJob) -> FirestoreResult<()> {
        self.client
            .create_document(RENDER_JOBS_COLLECTION, job.id.as_str(), job_to_fields(job)?)
            .await?;
        info!(render_job_id = %job.id, video_id = %job.video_id, attempt = job.attempt, "Created render job");
        Ok(())
    }

    async fn load_job(&self, id: &RenderJobId) -> FirestoreResult<Option<Versioned<RenderJob>>> {
        let Some(doc) = self.client.get_document(RENDER_JOBS_COLLECTION, id.as_str()).await? else {
            return Ok(None);
        };
        Ok(Some(Versioned {
            value: document_to_job(&doc)?,
            version: doc.update_time.clone(),
        }))
    }

    async fn save_job(&self, job: &RenderJob, expected_version: Option<&str>) -> FirestoreResult<()> {
        let result = self
            .client
            .patch_document(
                RENDER_JOBS_COLLECTION,
                job.id.as_str(),
                job_to_fields(job)?,
                None,
                expected_version,
                false,
            )
            .await;

        match result {
            Ok(_) => {
                debug!(render_job_id = %job.id, status = %job.status, "Saved render job");
                Ok(())
            }
            Err(e) => {
                if e.is_precondition_failed() {
                    record_precondition_conflict(RENDER_JOBS_COLLECTION);
                }
                Err(e)
            }
        }
    }

    async fn list_stale_jobs(
        &self,
        updated_before: DateTime<Utc>,
        limit: u32,
    ) -> FirestoreResult<Vec<RenderJob>> {
        let statuses = RenderStatus::NON_TERMINAL
            .iter()
            .map(|s| s.as_str().to_firestore_value())
            .collect();
        let query = StructuredQuery::collection(RENDER_JOBS_COLLECTION)
            .filter(Filter::and(vec![
                Filter::in_list("status", statuses),
                Filter::less_than("updated_at", updated_before.to_firestore_value()),
            ]))
            .order_by_asc("updated_at")
            .limit(limit);

        self.client
            .run_query(query)
            .await?
            .iter()
            .map(document_to_job)
            .collect()
    }
}
