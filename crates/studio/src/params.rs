use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::jobs::JobKind;

/// Default slider values of the creation forms.
pub const DEFAULT_DURATION_SECS: u32 = 8;
pub const DEFAULT_MOTION_STRENGTH: u32 = 30;
pub const DEFAULT_INFLUENCE: u32 = 60;
pub const DEFAULT_INBETWEEN_COUNT: u32 = 8;
pub const DEFAULT_EXTEND_SECONDS: u32 = 8;

/// Reference to an uploaded file (a path or an upload name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(String);

impl Asset {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.0)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStyle {
    #[default]
    Cinematic,
    Photorealistic,
    Cartoon,
    Anime,
}

impl VideoStyle {
    pub const ALL: [VideoStyle; 4] = [
        VideoStyle::Cinematic,
        VideoStyle::Photorealistic,
        VideoStyle::Cartoon,
        VideoStyle::Anime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStyle::Cinematic => "cinematic",
            VideoStyle::Photorealistic => "photorealistic",
            VideoStyle::Cartoon => "cartoon",
            VideoStyle::Anime => "anime",
        }
    }
}

impl fmt::Display for VideoStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        VideoStyle::ALL
            .into_iter()
            .find(|style| style.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown style {:?} (expected cinematic, photorealistic, cartoon or anime)",
                    s
                )
            })
    }
}

/// Kind-specific payload captured when a job is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobParameters {
    TextToVideo {
        prompt: String,
        #[serde(default)]
        style: VideoStyle,
        duration_secs: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference_image: Option<Asset>,
    },
    ImageToVideo {
        images: Vec<Asset>,
        motion_strength: u32,
    },
    ReferenceImages {
        images: Vec<Asset>,
        influence: u32,
    },
    /// `frames` holds the first frame followed by the last frame.
    FirstLastFrames {
        frames: Vec<Asset>,
        inbetween_count: u32,
    },
    ExtendVideo {
        base_video: Option<Asset>,
        extend_seconds: u32,
    },
}

impl JobParameters {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParameters::TextToVideo { .. } => JobKind::TextToVideo,
            JobParameters::ImageToVideo { .. } => JobKind::ImageToVideo,
            JobParameters::ReferenceImages { .. } => JobKind::ReferenceImages,
            JobParameters::FirstLastFrames { .. } => JobKind::FirstLastFrames,
            JobParameters::ExtendVideo { .. } => JobKind::ExtendVideo,
        }
    }

    /// Parameters pre-filled with the form defaults. Assets and the prompt
    /// start out empty, so defaults alone never pass validation.
    pub fn defaults(kind: JobKind) -> Self {
        match kind {
            JobKind::TextToVideo => JobParameters::TextToVideo {
                prompt: String::new(),
                style: VideoStyle::default(),
                duration_secs: DEFAULT_DURATION_SECS,
                seed: None,
                reference_image: None,
            },
            JobKind::ImageToVideo => JobParameters::ImageToVideo {
                images: Vec::new(),
                motion_strength: DEFAULT_MOTION_STRENGTH,
            },
            JobKind::ReferenceImages => JobParameters::ReferenceImages {
                images: Vec::new(),
                influence: DEFAULT_INFLUENCE,
            },
            JobKind::FirstLastFrames => JobParameters::FirstLastFrames {
                frames: Vec::new(),
                inbetween_count: DEFAULT_INBETWEEN_COUNT,
            },
            JobKind::ExtendVideo => JobParameters::ExtendVideo {
                base_video: None,
                extend_seconds: DEFAULT_EXTEND_SECONDS,
            },
        }
    }

    pub fn text(prompt: impl Into<String>) -> Self {
        JobParameters::TextToVideo {
            prompt: prompt.into(),
            style: VideoStyle::default(),
            duration_secs: DEFAULT_DURATION_SECS,
            seed: None,
            reference_image: None,
        }
    }

    pub fn extend(base_video: impl Into<String>, extend_seconds: u32) -> Self {
        JobParameters::ExtendVideo {
            base_video: Some(Asset::new(base_video)),
            extend_seconds,
        }
    }

    pub fn first_last(first: impl Into<String>, last: impl Into<String>, inbetween_count: u32) -> Self {
        JobParameters::FirstLastFrames {
            frames: vec![Asset::new(first), Asset::new(last)],
            inbetween_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_extension_is_lowercased() {
        assert_eq!(Asset::new("shots/Frame01.PNG").extension().as_deref(), Some("png"));
        assert_eq!(Asset::new("noext").extension(), None);
    }

    #[test]
    fn test_style_from_str() {
        assert_eq!("Anime".parse::<VideoStyle>().unwrap(), VideoStyle::Anime);
        assert_eq!(" cinematic ".parse::<VideoStyle>().unwrap(), VideoStyle::Cinematic);
        assert!("watercolor".parse::<VideoStyle>().is_err());
    }

    #[test]
    fn test_defaults_match_kind() {
        for kind in JobKind::ALL {
            assert_eq!(JobParameters::defaults(kind).kind(), kind);
        }
    }

    #[test]
    fn test_parameters_are_tagged_by_kind() {
        let json = serde_json::to_value(JobParameters::extend("base.mov", 12)).unwrap();
        assert_eq!(json["kind"], "extend_video");
        assert_eq!(json["base_video"], "base.mov");
        assert_eq!(json["extend_seconds"], 12);
    }

    #[test]
    fn test_text_parameters_omit_empty_options() {
        let json = serde_json::to_value(JobParameters::text("A cat")).unwrap();
        assert_eq!(json["style"], "cinematic");
        assert!(json.get("seed").is_none());
        assert!(json.get("reference_image").is_none());
    }
}
