//! Push channel frames
//!
//! Every frame is a JSON object tagged by `type`. Job payloads are kept as raw
//! JSON here; they are normalized one by one by the receiver so a single bad
//! snapshot does not poison the whole frame.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::job::JobKindTag;

/// Whether a job frame announces a new job or an update of a known one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    Created,
    Updated,
}

/// A decoded push frame
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    /// Sent once on connect with every currently active job
    Hello {
        active_jobs: Vec<Value>,
        active_component_jobs: Vec<Value>,
    },
    /// One job snapshot
    Job {
        kind: JobKindTag,
        event: JobEvent,
        job: Value,
    },
    /// A frame type this client does not handle
    Ignored(String),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("frame has no type tag")]
    MissingType,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawFrame {
    Hello {
        #[serde(default)]
        active_jobs: Vec<Value>,
        #[serde(default)]
        active_component_jobs: Vec<Value>,
    },
    #[serde(alias = "job_created")]
    JuiceJobCreated { job: Value },
    #[serde(alias = "job_update")]
    JuiceJobUpdate { job: Value },
    ComponentJobCreated { job: Value },
    ComponentJobUpdate { job: Value },
}

impl PushFrame {
    /// Decodes one text frame
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let frame_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?
            .to_string();

        const KNOWN: &[&str] = &[
            "hello",
            "job_created",
            "job_update",
            "juice_job_created",
            "juice_job_update",
            "component_job_created",
            "component_job_update",
        ];
        if !KNOWN.contains(&frame_type.as_str()) {
            return Ok(Self::Ignored(frame_type));
        }

        let frame = match serde_json::from_value::<RawFrame>(value)? {
            RawFrame::Hello {
                active_jobs,
                active_component_jobs,
            } => Self::Hello {
                active_jobs,
                active_component_jobs,
            },
            RawFrame::JuiceJobCreated { job } => Self::job(JobKindTag::ResearchBrew, JobEvent::Created, job),
            RawFrame::JuiceJobUpdate { job } => Self::job(JobKindTag::ResearchBrew, JobEvent::Updated, job),
            RawFrame::ComponentJobCreated { job } => {
                Self::job(JobKindTag::ComponentTestRun, JobEvent::Created, job)
            }
            RawFrame::ComponentJobUpdate { job } => {
                Self::job(JobKindTag::ComponentTestRun, JobEvent::Updated, job)
            }
        };
        Ok(frame)
    }

    fn job(kind: JobKindTag, event: JobEvent, job: Value) -> Self {
        Self::Job { kind, event, job }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_hello() {
        let frame = PushFrame::parse(
            r#"{"type":"hello","runtime":{"ws_port":8765},"active_jobs":[{"job_id":"a"}]}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            PushFrame::Hello {
                active_jobs: vec![json!({"job_id": "a"})],
                active_component_jobs: vec![],
            }
        );
    }

    #[test]
    fn test_parse_job_frames() {
        let frame = PushFrame::parse(r#"{"type":"job_update","job":{"job_id":"j1"}}"#).unwrap();
        assert!(matches!(
            frame,
            PushFrame::Job { kind: JobKindTag::ResearchBrew, event: JobEvent::Updated, .. }
        ));

        let frame =
            PushFrame::parse(r#"{"type":"component_job_created","job":{"job_id":"t1"}}"#).unwrap();
        assert!(matches!(
            frame,
            PushFrame::Job { kind: JobKindTag::ComponentTestRun, event: JobEvent::Created, .. }
        ));
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let frame = PushFrame::parse(r#"{"type":"live_update","x":1}"#).unwrap();
        assert_eq!(frame, PushFrame::Ignored("live_update".to_string()));
    }

    #[test]
    fn test_malformed_frames_error() {
        assert!(matches!(PushFrame::parse("{not json"), Err(FrameError::InvalidJson(_))));
        assert!(matches!(PushFrame::parse(r#"{"job":{}}"#), Err(FrameError::MissingType)));
        assert!(PushFrame::parse(r#"{"type":"job_update"}"#).is_err());
    }
}
