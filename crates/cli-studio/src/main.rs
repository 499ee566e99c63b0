use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use studio_core::jobs::{JobKind, JobRecord, JobStatus};
use studio_core::params::{Asset, JobParameters, VideoStyle, DEFAULT_DURATION_SECS};
use studio_core::Session;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "studio")]
#[command(about = "Submit video generation jobs and follow them to completion", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Hand the job to the runner and print it without waiting for the result
    #[arg(long, global = true)]
    no_wait: bool,

    #[command(subcommand)]
    job: JobCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum JobCommand {
    /// Generate a video from a text prompt
    Text {
        prompt: String,
        #[arg(long, default_value_t = VideoStyle::Cinematic)]
        style: VideoStyle,
        /// Length of the video in seconds
        #[arg(long, default_value_t = DEFAULT_DURATION_SECS)]
        duration: u32,
        #[arg(long)]
        seed: Option<u64>,
        /// Optional image to guide the look of the video
        #[arg(long, value_name = "IMAGE")]
        reference_image: Option<String>,
    },
    /// Animate one or more images
    Image {
        #[arg(required = true)]
        images: Vec<String>,
        /// Motion strength, 0-100
        #[arg(long, default_value_t = studio_core::params::DEFAULT_MOTION_STRENGTH)]
        motion: u32,
    },
    /// Generate a video guided by reference images
    Reference {
        #[arg(required = true)]
        images: Vec<String>,
        /// Reference influence, 0-100
        #[arg(long, default_value_t = studio_core::params::DEFAULT_INFLUENCE)]
        influence: u32,
    },
    /// Interpolate between a first and a last frame
    FirstLast {
        first: String,
        last: String,
        /// Number of generated in-between frames
        #[arg(long, default_value_t = studio_core::params::DEFAULT_INBETWEEN_COUNT)]
        inbetween: u32,
    },
    /// Extend an existing video
    Extend {
        video: String,
        /// Seconds to add
        #[arg(long, default_value_t = studio_core::params::DEFAULT_EXTEND_SECONDS)]
        seconds: u32,
    },
}

impl JobCommand {
    fn into_request(self) -> (JobKind, JobParameters) {
        let parameters = match self {
            JobCommand::Text {
                prompt,
                style,
                duration,
                seed,
                reference_image,
            } => JobParameters::TextToVideo {
                prompt,
                style,
                duration_secs: duration,
                seed,
                reference_image: reference_image.map(Asset::new),
            },
            JobCommand::Image { images, motion } => JobParameters::ImageToVideo {
                images: images.into_iter().map(Asset::new).collect(),
                motion_strength: motion,
            },
            JobCommand::Reference { images, influence } => JobParameters::ReferenceImages {
                images: images.into_iter().map(Asset::new).collect(),
                influence,
            },
            JobCommand::FirstLast {
                first,
                last,
                inbetween,
            } => JobParameters::first_last(first, last, inbetween),
            JobCommand::Extend { video, seconds } => JobParameters::extend(video, seconds),
        };
        (parameters.kind(), parameters)
    }
}

fn print_record(record: &JobRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record).context("Failed to serialize job")?;
    println!("{}", json);
    Ok(())
}

/// Turn a failed job into an error so the process exits non-zero.
fn ensure_not_failed(record: &JobRecord) -> Result<()> {
    if record.status == JobStatus::Failed {
        anyhow::bail!(
            "Job {} failed: {}",
            record.id_prefix(),
            record.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the job record
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let config = match studio_core::config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };
    info!("Runner: {:?}", config.runner);
    info!("Job timeout: {} seconds", config.job_timeout_secs);

    let mut session = Session::from_config(&config)?;
    let (kind, parameters) = args.job.into_request();

    if args.no_wait {
        let record = session.submit(kind, parameters)?;
        // One step is enough to hand the job to the runner.
        let record = session.advance(&record.id).await?;
        print_record(&record)?;
        return ensure_not_failed(&record);
    }

    let record = session.submit_and_track(kind, parameters)?;
    info!("Waiting for job {} ({})", record.id_prefix(), kind.label());

    let finished = tokio::select! {
        result = session.wait_for_terminal(&record.id) => Some(result?),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(finished) = finished else {
        warn!("Interrupted, job {} left unfinished", record.id_prefix());
        session.shutdown();
        if let Some(current) = session.store().get(&record.id) {
            print_record(current)?;
        }
        return Ok(());
    };

    print_record(&finished)?;
    ensure_not_failed(&finished)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_defaults() {
        let args = Args::try_parse_from(["studio", "text", "A cat"]).unwrap();
        assert!(!args.no_wait);
        let (kind, parameters) = args.job.into_request();
        assert_eq!(kind, JobKind::TextToVideo);
        assert_eq!(parameters, JobParameters::text("A cat"));
    }

    #[test]
    fn test_text_with_options() {
        let args = Args::try_parse_from([
            "studio",
            "--no-wait",
            "text",
            "A cat",
            "--style",
            "anime",
            "--duration",
            "12",
            "--seed",
            "42",
        ])
        .unwrap();
        assert!(args.no_wait);
        let (_, parameters) = args.job.into_request();
        assert_eq!(
            parameters,
            JobParameters::TextToVideo {
                prompt: "A cat".to_string(),
                style: VideoStyle::Anime,
                duration_secs: 12,
                seed: Some(42),
                reference_image: None,
            }
        );
    }

    #[test]
    fn test_unknown_style_is_rejected() {
        assert!(Args::try_parse_from(["studio", "text", "A cat", "--style", "noir"]).is_err());
    }

    #[test]
    fn test_image_requires_files() {
        assert!(Args::try_parse_from(["studio", "image"]).is_err());

        let args = Args::try_parse_from(["studio", "image", "a.png", "b.jpg", "--motion", "70"]).unwrap();
        let (kind, parameters) = args.job.into_request();
        assert_eq!(kind, JobKind::ImageToVideo);
        assert_eq!(
            parameters,
            JobParameters::ImageToVideo {
                images: vec![Asset::new("a.png"), Asset::new("b.jpg")],
                motion_strength: 70,
            }
        );
    }

    #[tokio::test]
    async fn test_no_wait_dispatch_failure_is_an_error() {
        use async_trait::async_trait;
        use std::sync::Arc;
        use studio_core::lifecycle::PollPolicy;
        use studio_core::runner::{JobRunner, RunnerError, RunnerReport};

        struct RejectingRunner;

        #[async_trait]
        impl JobRunner for RejectingRunner {
            async fn submit(&self, _kind: JobKind, _parameters: &JobParameters) -> Result<String, RunnerError> {
                Err(RunnerError::Transport("connection refused".to_string()))
            }

            async fn poll(&self, _runner_job_id: &str) -> Result<RunnerReport, RunnerError> {
                Ok(RunnerReport::processing())
            }
        }

        let mut session = Session::new(Arc::new(RejectingRunner), PollPolicy::default(), 10);
        let record = session
            .submit(JobKind::TextToVideo, JobParameters::text("A cat"))
            .unwrap();
        let record = session.advance(&record.id).await.unwrap();

        assert_eq!(record.status, JobStatus::Failed);
        let err = ensure_not_failed(&record).unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_queued_and_completed_jobs_are_not_errors() {
        let mut store = studio_core::jobs::JobStore::new();
        let record = store.insert_new(JobKind::TextToVideo, JobParameters::text("A cat"));
        assert!(ensure_not_failed(record).is_ok());
    }

    #[test]
    fn test_first_last_and_extend() {
        let args = Args::try_parse_from(["studio", "first-last", "a.png", "z.png"]).unwrap();
        let (kind, parameters) = args.job.into_request();
        assert_eq!(kind, JobKind::FirstLastFrames);
        assert_eq!(parameters, JobParameters::first_last("a.png", "z.png", 8));

        let args = Args::try_parse_from(["studio", "extend", "clip.mp4", "--seconds", "20", "-c", "s.toml"])
            .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("s.toml")));
        let (kind, parameters) = args.job.into_request();
        assert_eq!(kind, JobKind::ExtendVideo);
        assert_eq!(parameters, JobParameters::extend("clip.mp4", 20));
    }
}
