//! Repository for generated video documents.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use vreel_models::{RenderJobId, VideoId, VideoRecord, VideoStatus};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::VideoStore;
use crate::types::{Document, ToFirestoreValue, Value};

pub const VIDEOS_COLLECTION: &str = "videos";

/// Repository for video records.
#[derive(Clone)]
pub struct VideoRepository {
    client: FirestoreClient,
}

impl VideoRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

fn video_to_fields(video: &VideoRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("property_id".to_string(), video.property_id.to_firestore_value());
    fields.insert("owner_id".to_string(), video.owner_id.to_firestore_value());
    fields.insert("status".to_string(), video.status.as_str().to_firestore_value());
    fields.insert("file_url".to_string(), video.file_url.to_firestore_value());
    fields.insert("thumbnail_url".to_string(), video.thumbnail_url.to_firestore_value());
    fields.insert("duration".to_string(), video.duration.to_firestore_value());
    fields.insert(
        "render_job_id".to_string(),
        video
            .render_job_id
            .as_ref()
            .map(|id| id.as_str().to_string())
            .to_firestore_value(),
    );
    fields.insert("error_message".to_string(), video.error_message.to_firestore_value());
    fields.insert("updated_at".to_string(), video.updated_at.to_firestore_value());
    fields
}

fn document_to_video(doc: &Document) -> FirestoreResult<VideoRecord> {
    let id = doc
        .doc_id()
        .ok_or_else(|| FirestoreError::invalid_document("video document has no name"))?;
    let status = doc
        .get::<String>("status")
        .and_then(|s| VideoStatus::parse(&s))
        .unwrap_or_default();

    Ok(VideoRecord {
        video_id: VideoId::from(id),
        property_id: doc.get("property_id").unwrap_or_default(),
        owner_id: doc.get("owner_id").unwrap_or_default(),
        status,
        file_url: doc.get("file_url"),
        thumbnail_url: doc.get("thumbnail_url"),
        duration: doc.get("duration"),
        render_job_id: doc.get::<String>("render_job_id").map(RenderJobId::from),
        error_message: doc.get("error_message"),
        updated_at: doc.get("updated_at").unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl VideoStore for VideoRepository {
    async fn get_video(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
        match self.client.get_document(VIDEOS_COLLECTION, id.as_str()).await? {
            Some(doc) => Ok(Some(document_to_video(&doc)?)),
            None => Ok(None),
        }
    }

    async fn upsert_video(&self, record: &VideoRecord) -> FirestoreResult<()> {
        let fields = video_to_fields(record);
        let mask: Vec<String> = fields.keys().cloned().collect();
        self.client
            .patch_document(
                VIDEOS_COLLECTION,
                record.video_id.as_str(),
                fields,
                Some(&mask),
                None,
                false,
            )
            .await?;
        info!(video_id = %record.video_id, status = record.status.as_str(), "Video record updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_round_trip() {
        let mut video = VideoRecord::generating(
            VideoId::from("v1"),
            "p1",
            "u1",
            RenderJobId::from("j1"),
        );
        video.status = VideoStatus::Ready;
        video.file_url = Some("https://cdn/v1.mp4".into());

        let mut doc = Document::new(video_to_fields(&video));
        doc.name = Some("x/videos/v1".into());
        let back = document_to_video(&doc).unwrap();

        assert_eq!(back.status, VideoStatus::Ready);
        assert_eq!(back.file_url.as_deref(), Some("https://cdn/v1.mp4"));
        assert_eq!(back.render_job_id, Some(RenderJobId::from("j1")));
        assert!(back.thumbnail_url.is_none());
    }
}
