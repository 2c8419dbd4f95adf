//! Stage factory: the fixed production stage list and the configured
//! classifier.

use std::sync::Arc;
use std::time::Duration;

use mf_core::config::{ClassificationConfig, PipelineConfig, ScorerKind};
use mf_core::{Error, Result};

use crate::classifier::{ContentScorer, DigestScorer, HttpScorer, SafetyClassifier};
use crate::stage::Stage;
use crate::stages::{
    ClassifyStage, DeriveStage, ExtractMetadataStage, FinalizeStage, SampleStage, ValidateStage,
};

/// Build the ordered stage list every job runs through.
pub fn default_stages(pipeline: &PipelineConfig, classifier: SafetyClassifier) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ValidateStage),
        Box::new(ExtractMetadataStage),
        Box::new(SampleStage::new(pipeline.sample_windows, pipeline.sample_window_bytes)),
        Box::new(ClassifyStage::new(classifier)),
        Box::new(DeriveStage),
        Box::new(FinalizeStage),
    ]
}

/// Build the classifier described by configuration.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the HTTP scorer is selected without an
/// endpoint.
pub fn build_classifier(config: &ClassificationConfig) -> Result<SafetyClassifier> {
    let scorer: Arc<dyn ContentScorer> = match config.scorer {
        ScorerKind::Digest => Arc::new(DigestScorer),
        ScorerKind::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                Error::Validation("classification.endpoint is required for the http scorer".into())
            })?;
            Arc::new(HttpScorer::new(
                endpoint,
                Duration::from_secs(config.request_timeout_secs.max(1)),
            )?)
        }
    };
    Ok(SafetyClassifier::new(scorer, config.threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{JobInput, ProgressSender, StageContext};
    use crate::executor::PipelineExecutor;
    use crate::classifier::FixedScorer;
    use crate::testing::{mp4_bytes, Mp4Fixture};
    use mf_core::{Container, JobId, OwnerId, SafetyVerdict, StageFault};
    use mf_storage::{FsMediaStore, MediaStore};
    use std::sync::Mutex;

    #[test]
    fn stage_order_is_fixed() {
        let classifier = build_classifier(&ClassificationConfig::default()).unwrap();
        let stages = default_stages(&PipelineConfig::default(), classifier);
        let names: Vec<_> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["validate", "extract_metadata", "sample", "classify", "derive", "finalize"]
        );
        let percents: Vec<_> = stages.iter().map(|s| s.target_percent()).collect();
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn http_scorer_requires_endpoint() {
        let cfg = ClassificationConfig {
            scorer: ScorerKind::Http,
            ..Default::default()
        };
        assert!(matches!(build_classifier(&cfg), Err(Error::Validation(_))));
    }

    async fn stored_job(data: &[u8], declared: Option<u64>) -> (tempfile::TempDir, Arc<dyn MediaStore>, JobInput) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMediaStore::open(dir.path()).await.unwrap();
        let mut w = store.create().await.unwrap();
        w.append(data).await.unwrap();
        let sealed = w.seal().await.unwrap();
        let job = JobInput {
            job_id: JobId::new(),
            owner_id: OwnerId::from("alice"),
            blob_ref: sealed.blob_ref,
            size_bytes: declared.unwrap_or(sealed.size),
            content_type: "video/mp4".into(),
            file_name: Some("clip.mp4".into()),
        };
        let store: Arc<dyn MediaStore> = Arc::new(store);
        (dir, store, job)
    }

    #[tokio::test]
    async fn full_pipeline_on_real_mp4() {
        let data = mp4_bytes(&Mp4Fixture {
            width: 1920,
            height: 1080,
            payload_len: 200_000,
            ..Default::default()
        });
        let (_dir, store, job) = stored_job(&data, None).await;
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let ctx = StageContext::new(job, store)
            .with_progress(ProgressSender::new(move |r| sink.lock().unwrap().push((r.percent, r.label))));

        let classifier = SafetyClassifier::new(Arc::new(FixedScorer(12.0)), 70.0);
        let executor = PipelineExecutor::new(default_stages(&PipelineConfig::default(), classifier));
        let state = executor.execute(&ctx, 0).await.unwrap();

        let outcome = state.outcome.unwrap();
        assert_eq!(outcome.verdict, SafetyVerdict::Safe);
        assert_eq!(outcome.score, 12.0);
        assert_eq!(outcome.metadata.container, Some(Container::Mp4));
        assert_eq!(outcome.metadata.resolution().as_deref(), Some("1920x1080"));
        assert_eq!(outcome.metadata.duration_secs, Some(4.0));
        assert_eq!(outcome.metadata.frame_rate, Some(25.0));
        let expected_kbps = ((data.len() as f64 * 8.0) / 4.0 / 1000.0).round() as u64;
        assert_eq!(outcome.metadata.bitrate_kbps, Some(expected_kbps));

        let reports = reports.lock().unwrap();
        let percents: Vec<u8> = reports.iter().map(|(p, _)| *p).collect();
        assert_eq!(percents, vec![10, 25, 40, 60, 80, 95]);
        assert_eq!(reports[0].1, "Validating video file");
    }

    #[tokio::test]
    async fn size_mismatch_is_corrupt_upload() {
        let data = mp4_bytes(&Mp4Fixture::default());
        let (_dir, store, job) = stored_job(&data, Some(data.len() as u64 + 1)).await;
        let ctx = StageContext::new(job, store);

        let classifier = SafetyClassifier::new(Arc::new(FixedScorer(0.0)), 70.0);
        let executor = PipelineExecutor::new(default_stages(&PipelineConfig::default(), classifier));
        let failure = executor.execute(&ctx, 0).await.unwrap_err();
        assert_eq!(failure.stage, "validate");
        assert!(matches!(failure.fault, StageFault::CorruptUpload(_)));
    }

    #[tokio::test]
    async fn unknown_container_fails_extraction_and_keeps_nothing() {
        let (_dir, store, job) = stored_job(&[0x55; 4096], None).await;
        let ctx = StageContext::new(job, store);

        let classifier = SafetyClassifier::new(Arc::new(FixedScorer(0.0)), 70.0);
        let executor = PipelineExecutor::new(default_stages(&PipelineConfig::default(), classifier));
        let failure = executor.execute(&ctx, 0).await.unwrap_err();
        assert_eq!(failure.stage, "extract_metadata");
        assert!(matches!(failure.fault, StageFault::UnsupportedFormat(_)));
        assert_eq!(failure.partial.container, None);
    }

    #[tokio::test]
    async fn scorer_failure_keeps_probe_metadata() {
        let data = mp4_bytes(&Mp4Fixture::default());
        let (_dir, store, job) = stored_job(&data, None).await;
        let ctx = StageContext::new(job, store);

        let classifier = SafetyClassifier::new(Arc::new(FixedScorer(f64::NAN)), 70.0);
        let executor = PipelineExecutor::new(default_stages(&PipelineConfig::default(), classifier));
        let failure = executor.execute(&ctx, 0).await.unwrap_err();
        assert_eq!(failure.stage, "classify");
        assert!(matches!(failure.fault, StageFault::ClassificationUnavailable(_)));
        assert_eq!(failure.partial.container, Some(Container::Mp4));
    }
}
