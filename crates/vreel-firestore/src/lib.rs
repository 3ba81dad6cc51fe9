//! Firestore REST API client.
//!
//! This crate provides:
//! - Repositories for footage assets, render jobs and videos
//! - The store traits the pipeline is written against, plus an in-memory store
//! - Service account authentication via gcp_auth, or the emulator token
//! - Optimistic concurrency on render jobs through document update times

pub mod asset_repo;
pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod render_job_repo;
pub mod store;
pub mod token_cache;
pub mod types;
pub mod video_repo;

pub use asset_repo::{AssetRepository, ASSETS_COLLECTION};
pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use memory::MemoryStore;
pub use render_job_repo::{RenderJobRepository, RENDER_JOBS_COLLECTION};
pub use store::{AssetStore, RenderJobStore, VideoStore, Versioned};
pub use types::{Document, Filter, FromFirestoreValue, StructuredQuery, ToFirestoreValue, Value};
pub use video_repo::{VideoRepository, VIDEOS_COLLECTION};
