use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::{debug, info};

use crate::jobs::{JobKind, JobRecord, JobStore};
use crate::params::{Asset, JobParameters};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm"];

pub const DURATION_SECS: RangeInclusive<u32> = 2..=30;
pub const IMAGE_COUNT: RangeInclusive<usize> = 1..=10;
pub const REFERENCE_IMAGE_COUNT: RangeInclusive<usize> = 1..=10;
pub const PERCENT: RangeInclusive<u32> = 0..=100;
pub const INBETWEEN_COUNT: RangeInclusive<u32> = 1..=60;
pub const EXTEND_SECONDS: RangeInclusive<u32> = 1..=120;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("parameters describe a {actual} job but a {expected} job was requested")]
    KindMismatch { expected: JobKind, actual: JobKind },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
        actual: u32,
    },
    #[error("{field} needs between {min} and {max} files, got {actual}")]
    AssetCount {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },
    #[error("{field}: {name:?} is not one of {expected}")]
    UnsupportedAsset {
        field: &'static str,
        name: String,
        expected: String,
    },
}

impl ValidationError {
    /// Name of the form field that failed validation.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::KindMismatch { .. } => "kind",
            ValidationError::Empty { field }
            | ValidationError::Missing { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::AssetCount { field, .. }
            | ValidationError::UnsupportedAsset { field, .. } => *field,
        }
    }
}

/// Validate a creation request without touching any store.
pub fn validate(kind: JobKind, parameters: &JobParameters) -> Result<(), ValidationError> {
    if parameters.kind() != kind {
        return Err(ValidationError::KindMismatch {
            expected: kind,
            actual: parameters.kind(),
        });
    }

    match parameters {
        JobParameters::TextToVideo {
            prompt,
            duration_secs,
            reference_image,
            ..
        } => {
            if prompt.trim().is_empty() {
                return Err(ValidationError::Empty { field: "prompt" });
            }
            check_range("duration_secs", *duration_secs, DURATION_SECS)?;
            if let Some(image) = reference_image {
                check_asset("reference_image", image, IMAGE_EXTENSIONS)?;
            }
        }
        JobParameters::ImageToVideo {
            images,
            motion_strength,
        } => {
            check_assets("images", images, IMAGE_COUNT, IMAGE_EXTENSIONS)?;
            check_range("motion_strength", *motion_strength, PERCENT)?;
        }
        JobParameters::ReferenceImages { images, influence } => {
            check_assets("images", images, REFERENCE_IMAGE_COUNT, IMAGE_EXTENSIONS)?;
            check_range("influence", *influence, PERCENT)?;
        }
        JobParameters::FirstLastFrames {
            frames,
            inbetween_count,
        } => {
            check_assets("frames", frames, 2..=2, IMAGE_EXTENSIONS)?;
            check_range("inbetween_count", *inbetween_count, INBETWEEN_COUNT)?;
        }
        JobParameters::ExtendVideo {
            base_video,
            extend_seconds,
        } => {
            let video = base_video
                .as_ref()
                .ok_or(ValidationError::Missing { field: "base_video" })?;
            check_asset("base_video", video, VIDEO_EXTENSIONS)?;
            check_range("extend_seconds", *extend_seconds, EXTEND_SECONDS)?;
        }
    }

    Ok(())
}

/// Validate a creation request and append it to the store as a queued job.
///
/// The store is only mutated when validation succeeds. No runner call is
/// made here; dispatching the job is the lifecycle's business.
pub fn submit(
    store: &mut JobStore,
    kind: JobKind,
    parameters: JobParameters,
) -> Result<JobRecord, ValidationError> {
    if let Err(e) = validate(kind, &parameters) {
        debug!("Rejected {} submission: {}", kind, e);
        return Err(e);
    }

    let record = store.insert_new(kind, parameters).clone();
    info!("Job submitted: {} ({})", record.id_prefix(), kind);
    Ok(record)
}

fn check_range(
    field: &'static str,
    value: u32,
    range: RangeInclusive<u32>,
) -> Result<(), ValidationError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            min: *range.start(),
            max: *range.end(),
            actual: value,
        })
    }
}

fn check_assets(
    field: &'static str,
    assets: &[Asset],
    count: RangeInclusive<usize>,
    extensions: &[&str],
) -> Result<(), ValidationError> {
    if !count.contains(&assets.len()) {
        return Err(ValidationError::AssetCount {
            field,
            min: *count.start(),
            max: *count.end(),
            actual: assets.len(),
        });
    }
    assets
        .iter()
        .try_for_each(|asset| check_asset(field, asset, extensions))
}

fn check_asset(
    field: &'static str,
    asset: &Asset,
    extensions: &[&str],
) -> Result<(), ValidationError> {
    let supported = asset
        .extension()
        .map(|ext| extensions.contains(&ext.as_str()))
        .unwrap_or(false);

    if supported {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedAsset {
            field,
            name: asset.name().to_string(),
            expected: extensions.join(", "),
        })
    }
}
