//! The classification capability.
//!
//! [`SafetyClassifier::classify`] turns an [`AnalysisSample`] into a score
//! in `[0, 100]` and a verdict under the configured threshold. Scoring is
//! delegated to a [`ContentScorer`], so deterministic stubs and a remote
//! model are interchangeable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mf_core::{SafetyVerdict, StageFault};
use serde::{Deserialize, Serialize};

use crate::sampler::AnalysisSample;

/// Produces a raw score for a sample.
#[async_trait]
pub trait ContentScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// A score in `[0, 100]`; higher means more likely unsafe.
    async fn score(&self, sample: &AnalysisSample) -> Result<f64, StageFault>;
}

/// Score plus the verdict it implies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub score: f64,
    pub verdict: SafetyVerdict,
}

/// Applies the policy threshold to a scorer's output.
#[derive(Clone)]
pub struct SafetyClassifier {
    scorer: Arc<dyn ContentScorer>,
    threshold: f64,
}

impl SafetyClassifier {
    pub fn new(scorer: Arc<dyn ContentScorer>, threshold: f64) -> Self {
        Self { scorer, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// Score the sample and apply the threshold: `flagged` iff
    /// `score >= threshold`.
    pub async fn classify(&self, sample: &AnalysisSample) -> Result<Classification, StageFault> {
        let score = self.scorer.score(sample).await?;
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(StageFault::ClassificationUnavailable(format!(
                "scorer '{}' returned out-of-range score {score}",
                self.scorer.name()
            )));
        }
        Ok(Classification {
            score,
            verdict: SafetyVerdict::from_score(score, self.threshold),
        })
    }
}

impl std::fmt::Debug for SafetyClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyClassifier")
            .field("scorer", &self.scorer.name())
            .field("threshold", &self.threshold)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// DigestScorer
// ---------------------------------------------------------------------------

/// Deterministic scorer derived from the sample digest.
///
/// Not a content model: it spreads payloads uniformly over `[0, 100]` so the
/// pipeline behaves identically run after run without external services.
#[derive(Debug, Default, Clone, Copy)]
pub struct DigestScorer;

#[async_trait]
impl ContentScorer for DigestScorer {
    fn name(&self) -> &'static str {
        "digest"
    }

    async fn score(&self, sample: &AnalysisSample) -> Result<f64, StageFault> {
        let prefix = sample.digest.get(..8).ok_or_else(|| {
            StageFault::ClassificationUnavailable("sample digest is too short".into())
        })?;
        let n = u32::from_str_radix(prefix, 16)
            .map_err(|e| StageFault::ClassificationUnavailable(format!("bad sample digest: {e}")))?;
        Ok(f64::from(n % 10_001) / 100.0)
    }
}

// ---------------------------------------------------------------------------
// FixedScorer
// ---------------------------------------------------------------------------

/// Always returns the same score.
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer(pub f64);

#[async_trait]
impl ContentScorer for FixedScorer {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn score(&self, _sample: &AnalysisSample) -> Result<f64, StageFault> {
        Ok(self.0)
    }
}

// ---------------------------------------------------------------------------
// HttpScorer
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    digest: &'a str,
    bytes_sampled: u64,
    windows: usize,
    entropy: f64,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f64,
}

/// Scorer backed by a remote classification service.
///
/// POSTs the sample summary as JSON to the endpoint and expects
/// `{"score": <number>}` back.
#[derive(Debug, Clone)]
pub struct HttpScorer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpScorer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> mf_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| mf_core::Error::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ContentScorer for HttpScorer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn score(&self, sample: &AnalysisSample) -> Result<f64, StageFault> {
        let unavailable = |e: reqwest::Error| StageFault::ClassificationUnavailable(e.to_string());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ScoreRequest {
                digest: &sample.digest,
                bytes_sampled: sample.bytes_sampled,
                windows: sample.windows,
                entropy: sample.entropy,
            })
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;

        let body: ScoreResponse = response.json().await.map_err(unavailable)?;
        tracing::debug!(score = body.score, endpoint = %self.endpoint, "remote score received");
        Ok(body.score)
    }
}
