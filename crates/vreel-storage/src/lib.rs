//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - File upload/download to R2
//! - Playable URL resolution (public CDN or presigned GET)
//! - The object key layout used by the pipeline
//! - The [`ObjectStorage`] trait pipeline components depend on

pub mod client;
pub mod error;
pub mod keys;

pub use client::{public_object_url, ObjectStorage, R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{asset_thumbnail_key, content_type_for, rendered_thumbnail_key, rendered_video_key};
