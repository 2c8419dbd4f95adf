//! Job-domain enums and the derived metadata snapshot.
//!
//! All enums serialize in lowercase and implement `Display` manually for a
//! consistent string representation in the database and over the API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
///
/// `queued -> processing -> {completed | failed}` is the only legal path.
/// `queued -> failed` is also allowed, for cancellation before a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` are never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Queued, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// SafetyVerdict
// ---------------------------------------------------------------------------

/// Outcome of content classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyVerdict {
    #[default]
    Pending,
    Safe,
    Flagged,
}

impl SafetyVerdict {
    /// Apply the policy threshold: `flagged` when `score >= threshold`.
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score >= threshold {
            Self::Flagged
        } else {
            Self::Safe
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Safe => "safe",
            Self::Flagged => "flagged",
        }
    }
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SafetyVerdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "safe" => Ok(Self::Safe),
            "flagged" => Ok(Self::Flagged),
            other => Err(format!("unknown safety verdict: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Container formats recognised by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Mov,
    Matroska,
    Webm,
    Avi,
    #[serde(rename = "mpegts")]
    MpegTs,
    Flv,
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mp4 => write!(f, "mp4"),
            Self::Mov => write!(f, "mov"),
            Self::Matroska => write!(f, "matroska"),
            Self::Webm => write!(f, "webm"),
            Self::Avi => write!(f, "avi"),
            Self::MpegTs => write!(f, "mpegts"),
            Self::Flv => write!(f, "flv"),
        }
    }
}

// ---------------------------------------------------------------------------
// DerivedMetadata
// ---------------------------------------------------------------------------

/// Stage-produced facts about a media payload.
///
/// Fields fill in as stages run; a job exposes the complete snapshot only once
/// it is `completed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
}

impl DerivedMetadata {
    /// `"WIDTHxHEIGHT"` when both dimensions are known.
    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{w}x{h}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundary() {
        assert_eq!(SafetyVerdict::from_score(69.0, 70.0), SafetyVerdict::Safe);
        assert_eq!(SafetyVerdict::from_score(69.999, 70.0), SafetyVerdict::Safe);
        assert_eq!(SafetyVerdict::from_score(70.0, 70.0), SafetyVerdict::Flagged);
        assert_eq!(SafetyVerdict::from_score(100.0, 70.0), SafetyVerdict::Flagged);
    }

    #[test]
    fn legal_transitions_only() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Queued.can_transition_to(Failed));

        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Queued));
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn status_string_roundtrip() {
        for s in ["queued", "processing", "completed", "failed"] {
            let status: JobStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn verdict_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&SafetyVerdict::Flagged).unwrap(), "\"flagged\"");
        assert_eq!("safe".parse::<SafetyVerdict>().unwrap(), SafetyVerdict::Safe);
    }

    #[test]
    fn metadata_omits_unknown_fields() {
        let meta = DerivedMetadata {
            container: Some(Container::MpegTs),
            width: Some(1920),
            height: Some(1080),
            ..Default::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["container"], "mpegts");
        assert!(json.get("codec").is_none());
        assert_eq!(meta.resolution().as_deref(), Some("1920x1080"));
        assert_eq!(DerivedMetadata::default().resolution(), None);
    }
}
