use proptest::prelude::*;
use std::collections::HashSet;
use studio_core::jobs::{id_prefix, JobKind, JobStatus, JobStore, ID_PREFIX_LEN};
use studio_core::params::{Asset, JobParameters, VideoStyle};
use studio_core::submit::submit;

fn valid_parameters_strategy() -> impl Strategy<Value = JobParameters> {
    prop_oneof![
        ("[a-zA-Z ]{0,20}[a-zA-Z]", 2_u32..=30, proptest::option::of(any::<u64>())).prop_map(
            |(prompt, duration_secs, seed)| JobParameters::TextToVideo {
                prompt,
                style: VideoStyle::Anime,
                duration_secs,
                seed,
                reference_image: None,
            }
        ),
        (1_usize..=10, 0_u32..=100).prop_map(|(count, motion_strength)| {
            JobParameters::ImageToVideo {
                images: (0..count).map(|i| Asset::new(format!("img{}.png", i))).collect(),
                motion_strength,
            }
        }),
        (1_usize..=10, 0_u32..=100).prop_map(|(count, influence)| {
            JobParameters::ReferenceImages {
                images: (0..count).map(|i| Asset::new(format!("ref{}.jpg", i))).collect(),
                influence,
            }
        }),
        (1_u32..=60).prop_map(|n| JobParameters::first_last("a.png", "b.jpeg", n)),
        (1_u32..=120).prop_map(|secs| JobParameters::extend("clip.mp4", secs)),
    ]
}

fn invalid_parameters_strategy() -> impl Strategy<Value = JobParameters> {
    prop_oneof![
        Just(JobParameters::text("   ")),
        (31_u32..1_000).prop_map(|duration_secs| JobParameters::TextToVideo {
            prompt: "A cat".to_string(),
            style: VideoStyle::Cinematic,
            duration_secs,
            seed: None,
            reference_image: None,
        }),
        Just(JobParameters::ImageToVideo {
            images: Vec::new(),
            motion_strength: 30,
        }),
        (101_u32..10_000).prop_map(|influence| JobParameters::ReferenceImages {
            images: vec![Asset::new("ref.png")],
            influence,
        }),
        Just(JobParameters::FirstLastFrames {
            frames: vec![Asset::new("only.png")],
            inbetween_count: 8,
        }),
        (121_u32..1_000).prop_map(|secs| JobParameters::extend("clip.mp4", secs)),
        Just(JobParameters::extend("clip.gif", 8)),
        Just(JobParameters::ExtendVideo {
            base_video: None,
            extend_seconds: 8,
        }),
    ]
}

/// **Property: accepted submissions get unique ids and start queued**
#[test]
fn property_submissions_are_unique_and_queued() {
    proptest!(|(batch in prop::collection::vec(valid_parameters_strategy(), 1..40))| {
        let mut store = JobStore::new();
        let mut ids = HashSet::new();

        for (n, parameters) in batch.into_iter().enumerate() {
            let kind = parameters.kind();
            let record = submit(&mut store, kind, parameters.clone()).unwrap();

            prop_assert_eq!(record.status, JobStatus::Queued);
            prop_assert_eq!(record.kind, kind);
            prop_assert_eq!(&record.parameters, &parameters);
            prop_assert!(record.result.is_none());
            prop_assert!(record.error.is_none());
            prop_assert!(ids.insert(record.id.clone()), "Duplicate id {}", record.id);
            prop_assert_eq!(store.len(), n + 1);
        }

        let order: Vec<&str> = store.iter().map(|r| r.id.as_str()).collect();
        prop_assert_eq!(order.len(), ids.len());
    });
}

/// **Property: rejected submissions leave the store as it was**
#[test]
fn property_invalid_submissions_do_not_mutate() {
    proptest!(|(
        existing in prop::collection::vec(valid_parameters_strategy(), 0..5),
        invalid in invalid_parameters_strategy(),
    )| {
        let mut store = JobStore::new();
        for parameters in existing {
            submit(&mut store, parameters.kind(), parameters).unwrap();
        }
        let before: Vec<_> = store.iter().cloned().collect();

        let result = submit(&mut store, invalid.kind(), invalid);
        prop_assert!(result.is_err());

        let after: Vec<_> = store.iter().cloned().collect();
        prop_assert_eq!(before, after);
    });
}

/// **Property: parameters of another kind are always rejected**
#[test]
fn property_kind_mismatch_is_rejected() {
    proptest!(|(parameters in valid_parameters_strategy(), kind_index in 0_usize..5)| {
        let kind = JobKind::ALL[kind_index];
        prop_assume!(kind != parameters.kind());

        let mut store = JobStore::new();
        prop_assert!(submit(&mut store, kind, parameters).is_err());
        prop_assert!(store.is_empty());
    });
}

#[test]
fn test_prefix_lookup_and_clear() {
    let mut store = JobStore::new();
    let first = submit(&mut store, JobKind::TextToVideo, JobParameters::text("A cat")).unwrap();
    let second = submit(&mut store, JobKind::ExtendVideo, JobParameters::extend("a.mp4", 8)).unwrap();

    assert_eq!(first.id_prefix().len(), ID_PREFIX_LEN);
    assert_eq!(id_prefix(&first.id), first.id_prefix());
    assert_eq!(store.find(first.id_prefix()).unwrap().id, first.id);
    assert_eq!(store.find(&second.id).unwrap().id, second.id);

    let recent: Vec<&str> = store.recent(10).iter().map(|r| r.id.as_str()).collect();
    assert_eq!(recent, vec![second.id.as_str(), first.id.as_str()]);

    assert_eq!(store.clear(), 2);
    assert!(store.is_empty());
    assert!(store.find(&first.id).is_err());
}

#[test]
fn test_store_json_export() {
    let mut store = JobStore::new();
    submit(&mut store, JobKind::TextToVideo, JobParameters::text("A cat")).unwrap();

    let json: serde_json::Value = serde_json::from_str(&store.to_json().unwrap()).unwrap();
    let job = &json[0];
    assert_eq!(job["kind"], "text_to_video");
    assert_eq!(job["status"], "queued");
    assert_eq!(job["parameters"]["prompt"], "A cat");
    assert!(job.get("error").is_none());
}
