//! Repository for footage asset documents.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use vreel_models::{AssetId, AssetOutcome, AssetStatus, FootageAsset, MediaKind};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::AssetStore;
use crate::types::{Document, Filter, StructuredQuery, ToFirestoreValue, Value};

pub const ASSETS_COLLECTION: &str = "footage_assets";

/// Repository for footage assets.
#[derive(Clone)]
pub struct AssetRepository {
    client: FirestoreClient,
}

impl AssetRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    async fn patch(&self, id: &AssetId, fields: HashMap<String, Value>) -> FirestoreResult<()> {
        let mask: Vec<String> = fields.keys().cloned().collect();
        self.client
            .patch_document(ASSETS_COLLECTION, id.as_str(), fields, Some(&mask), None, true)
            .await?;
        Ok(())
    }

    /// Create a freshly uploaded asset.
    pub async fn create(&self, asset: &FootageAsset) -> FirestoreResult<()> {
        self.client
            .create_document(ASSETS_COLLECTION, asset.id.as_str(), asset_to_fields(asset))
            .await?;
        info!(asset_id = %asset.id, "Created footage asset");
        Ok(())
    }
}

/// Fields written by a successful or failed ingestion.
pub fn outcome_fields(outcome: &AssetOutcome) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("status".to_string(), outcome.status.as_str().to_firestore_value());
    fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
    if let Some(duration) = outcome.duration {
        fields.insert("duration".to_string(), duration.to_firestore_value());
    }
    if let Some(description) = &outcome.description {
        fields.insert("description".to_string(), description.to_firestore_value());
    }
    if let Some(key) = &outcome.thumbnail_key {
        fields.insert("thumbnail_key".to_string(), key.to_firestore_value());
    }
    fields
}

pub fn asset_to_fields(asset: &FootageAsset) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("owner_id".to_string(), asset.owner_id.to_firestore_value());
    fields.insert("property_id".to_string(), asset.property_id.to_firestore_value());
    fields.insert("storage_key".to_string(), asset.storage_key.to_firestore_value());
    fields.insert("media_kind".to_string(), asset.media_kind.as_str().to_firestore_value());
    fields.insert("status".to_string(), asset.status.as_str().to_firestore_value());
    fields.insert("duration".to_string(), asset.duration.to_firestore_value());
    fields.insert("description".to_string(), asset.description.to_firestore_value());
    fields.insert("thumbnail_key".to_string(), asset.thumbnail_key.to_firestore_value());
    fields.insert("popularity".to_string(), asset.popularity.to_firestore_value());
    fields.insert("retry_count".to_string(), asset.retry_count.to_firestore_value());
    fields.insert("created_at".to_string(), asset.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), asset.updated_at.to_firestore_value());
    fields
}

pub fn document_to_asset(doc: &Document) -> FirestoreResult<FootageAsset> {
    let id = doc
        .doc_id()
        .ok_or_else(|| FirestoreError::invalid_document("asset document has no name"))?;
    let status_raw: String = doc.get("status").unwrap_or_default();
    let status = AssetStatus::parse(&status_raw).ok_or_else(|| {
        FirestoreError::invalid_document(format!("asset {} has unknown status '{}'", id, status_raw))
    })?;
    let media_kind = match doc.get::<String>("media_kind").as_deref() {
        Some("image") => MediaKind::Image,
        _ => MediaKind::Video,
    };
    let now = Utc::now();

    Ok(FootageAsset {
        id: AssetId::from(id),
        owner_id: doc.get("owner_id").unwrap_or_default(),
        property_id: doc.get("property_id").unwrap_or_default(),
        storage_key: doc.get("storage_key").ok_or_else(|| {
            FirestoreError::invalid_document(format!("asset {} has no storage_key", id))
        })?,
        media_kind,
        status,
        duration: doc.get("duration"),
        description: doc.get("description"),
        thumbnail_key: doc.get("thumbnail_key"),
        popularity: doc.get("popularity").unwrap_or(0.0),
        retry_count: doc.get("retry_count").unwrap_or(0),
        created_at: doc.get("created_at").unwrap_or(now),
        updated_at: doc.get("updated_at").unwrap_or(now),
    })
}

fn documents_to_assets(docs: Vec<Document>) -> FirestoreResult<Vec<FootageAsset>> {
    docs.iter().map(document_to_asset).collect()
}

#[async_trait]
impl AssetStore for AssetRepository {
    async fn get_asset(&self, id: &AssetId) -> FirestoreResult<Option<FootageAsset>> {
        match self.client.get_document(ASSETS_COLLECTION, id.as_str()).await? {
            Some(doc) => Ok(Some(document_to_asset(&doc)?)),
            None => Ok(None),
        }
    }

    async fn set_asset_status(&self, id: &AssetId, status: AssetStatus) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
        self.patch(id, fields).await?;
        debug!(asset_id = %id, status = %status, "Asset status updated");
        Ok(())
    }

    async fn apply_outcome(&self, id: &AssetId, outcome: &AssetOutcome) -> FirestoreResult<()> {
        self.patch(id, outcome_fields(outcome)).await?;
        info!(asset_id = %id, status = %outcome.status, "Asset ingestion result saved");
        Ok(())
    }

    async fn mark_requeued(&self, id: &AssetId, retry_count: u32) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("retry_count".to_string(), retry_count.to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
        self.patch(id, fields).await
    }

    async fn list_ready_assets(&self, property_id: &str) -> FirestoreResult<Vec<FootageAsset>> {
        let query = StructuredQuery::collection(ASSETS_COLLECTION).filter(Filter::and(vec![
            Filter::equal("property_id", property_id.to_firestore_value()),
            Filter::equal("status", AssetStatus::Ready.as_str().to_firestore_value()),
        ]));
        documents_to_assets(self.client.run_query(query).await?)
    }

    async fn list_stale_assets(
        &self,
        statuses: &[AssetStatus],
        updated_before: DateTime<Utc>,
        limit: u32,
    ) -> FirestoreResult<Vec<FootageAsset>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let query = StructuredQuery::collection(ASSETS_COLLECTION)
            .filter(Filter::and(vec![
                Filter::in_list(
                    "status",
                    statuses.iter().map(|s| s.as_str().to_firestore_value()).collect(),
                ),
                Filter::less_than("updated_at", updated_before.to_firestore_value()),
            ]))
            .order_by_asc("updated_at")
            .limit(limit);
        documents_to_assets(self.client.run_query(query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_document_round_trip() {
        let asset = FootageAsset::new(AssetId::from("a1"), "u1", "p1", "uploads/a1.mp4")
            .with_duration(6.5)
            .with_description("infinity pool at sunset")
            .with_status(AssetStatus::Ready);

        let mut doc = Document::new(asset_to_fields(&asset));
        doc.name = Some("projects/x/databases/(default)/documents/footage_assets/a1".into());

        let back = document_to_asset(&doc).unwrap();
        assert_eq!(back.id, asset.id);
        assert_eq!(back.status, AssetStatus::Ready);
        assert_eq!(back.duration, Some(6.5));
        assert_eq!(back.description.as_deref(), Some("infinity pool at sunset"));
        assert_eq!(back.thumbnail_key, None);
    }

    #[test]
    fn test_outcome_fields_skip_missing_values() {
        let outcome = AssetOutcome::from_results(None, None, Some("thumbs/a.jpg".into()), 10);
        let fields = outcome_fields(&outcome);
        assert!(fields.contains_key("thumbnail_key"));
        assert!(!fields.contains_key("duration"));
        assert!(!fields.contains_key("description"));
        assert_eq!(fields["status"], Value::StringValue("pending_retry".into()));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), "exploded".to_firestore_value());
        fields.insert("storage_key".to_string(), "k".to_firestore_value());
        let mut doc = Document::new(fields);
        doc.name = Some("x/footage_assets/a1".into());
        assert!(document_to_asset(&doc).is_err());
    }
}
