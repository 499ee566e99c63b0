use anyhow::{Context, Result};
use studio_core::jobs::JobKind;
use studio_core::params::{Asset, JobParameters, VideoStyle};

/// How a field is edited and parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    /// Optional number, empty means "not set".
    OptionalNumber,
    Style,
    /// Comma-separated file names.
    Files,
    /// Single optional file name.
    OptionalFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub label: &'static str,
    pub kind: FieldKind,
    pub value: String,
}

impl Field {
    fn new(label: &'static str, kind: FieldKind, value: impl Into<String>) -> Self {
        Self {
            label,
            kind,
            value: value.into(),
        }
    }

    fn number(&self) -> Result<u32> {
        self.value
            .trim()
            .parse()
            .with_context(|| format!("{} must be a whole number", self.label))
    }

    fn optional_number(&self) -> Result<Option<u64>> {
        let value = self.value.trim();
        if value.is_empty() {
            return Ok(None);
        }
        let n = value
            .parse()
            .with_context(|| format!("{} must be a whole number", self.label))?;
        Ok(Some(n))
    }

    fn files(&self) -> Vec<Asset> {
        self.value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(Asset::new)
            .collect()
    }

    fn optional_file(&self) -> Option<Asset> {
        let value = self.value.trim();
        (!value.is_empty()).then(|| Asset::new(value))
    }

    fn style(&self) -> Result<VideoStyle> {
        self.value.parse::<VideoStyle>().map_err(anyhow::Error::msg)
    }
}

/// Editable creation form for one job kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub kind: JobKind,
    pub fields: Vec<Field>,
    pub focus: usize,
}

impl Form {
    /// A form pre-filled with the default parameters of `kind`.
    pub fn new(kind: JobKind) -> Self {
        let fields = match JobParameters::defaults(kind) {
            JobParameters::TextToVideo {
                prompt,
                style,
                duration_secs,
                ..
            } => vec![
                Field::new("Prompt", FieldKind::Text, prompt),
                Field::new("Style", FieldKind::Style, style.as_str()),
                Field::new("Duration (s)", FieldKind::Number, duration_secs.to_string()),
                Field::new("Seed", FieldKind::OptionalNumber, ""),
                Field::new("Reference image", FieldKind::OptionalFile, ""),
            ],
            JobParameters::ImageToVideo {
                motion_strength, ..
            } => vec![
                Field::new("Images", FieldKind::Files, ""),
                Field::new("Motion strength", FieldKind::Number, motion_strength.to_string()),
            ],
            JobParameters::ReferenceImages { influence, .. } => vec![
                Field::new("Reference images", FieldKind::Files, ""),
                Field::new("Influence", FieldKind::Number, influence.to_string()),
            ],
            JobParameters::FirstLastFrames {
                inbetween_count, ..
            } => vec![
                Field::new("First frame", FieldKind::Text, ""),
                Field::new("Last frame", FieldKind::Text, ""),
                Field::new("In-between frames", FieldKind::Number, inbetween_count.to_string()),
            ],
            JobParameters::ExtendVideo { extend_seconds, .. } => vec![
                Field::new("Base video", FieldKind::Text, ""),
                Field::new("Extend by (s)", FieldKind::Number, extend_seconds.to_string()),
            ],
        };

        Self {
            kind,
            fields,
            focus: 0,
        }
    }

    pub fn focused(&self) -> Option<&Field> {
        self.fields.get(self.focus)
    }

    pub fn focus_next(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + 1) % self.fields.len();
        }
    }

    pub fn focus_prev(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
        }
    }

    /// Type a character into the focused field. Style fields are picked
    /// with [`Form::cycle_choice`] instead.
    pub fn input(&mut self, c: char) {
        let Some(field) = self.fields.get_mut(self.focus) else {
            return;
        };
        match field.kind {
            FieldKind::Style => {}
            FieldKind::Number | FieldKind::OptionalNumber if !c.is_ascii_digit() => {}
            _ => field.value.push(c),
        }
    }

    pub fn backspace(&mut self) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            if field.kind != FieldKind::Style {
                field.value.pop();
            }
        }
    }

    /// Step the focused style field forwards or backwards through the styles.
    pub fn cycle_choice(&mut self, forward: bool) {
        let Some(field) = self.fields.get_mut(self.focus) else {
            return;
        };
        if field.kind != FieldKind::Style {
            return;
        }
        let styles = VideoStyle::ALL;
        let current = styles
            .iter()
            .position(|s| s.as_str() == field.value)
            .unwrap_or(0);
        let next = if forward {
            (current + 1) % styles.len()
        } else {
            (current + styles.len() - 1) % styles.len()
        };
        field.value = styles[next].as_str().to_string();
    }

    pub fn reset(&mut self) {
        *self = Form::new(self.kind);
    }

    /// Parse the fields into job parameters. Range and file-type checks are
    /// left to submission.
    pub fn to_parameters(&self) -> Result<JobParameters> {
        let field = |i: usize| -> Result<&Field> {
            self.fields
                .get(i)
                .with_context(|| format!("{} form is missing field {}", self.kind, i))
        };

        let parameters = match self.kind {
            JobKind::TextToVideo => JobParameters::TextToVideo {
                prompt: field(0)?.value.trim().to_string(),
                style: field(1)?.style()?,
                duration_secs: field(2)?.number()?,
                seed: field(3)?.optional_number()?,
                reference_image: field(4)?.optional_file(),
            },
            JobKind::ImageToVideo => JobParameters::ImageToVideo {
                images: field(0)?.files(),
                motion_strength: field(1)?.number()?,
            },
            JobKind::ReferenceImages => JobParameters::ReferenceImages {
                images: field(0)?.files(),
                influence: field(1)?.number()?,
            },
            JobKind::FirstLastFrames => {
                let frames: Vec<Asset> = [field(0)?, field(1)?]
                    .into_iter()
                    .filter_map(Field::optional_file)
                    .collect();
                JobParameters::FirstLastFrames {
                    frames,
                    inbetween_count: field(2)?.number()?,
                }
            }
            JobKind::ExtendVideo => JobParameters::ExtendVideo {
                base_video: field(0)?.optional_file(),
                extend_seconds: field(1)?.number()?,
            },
        };
        Ok(parameters)
    }
}
