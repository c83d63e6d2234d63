//! Output types: the answer to one request and its JSON envelope.

use crate::error::PageLensError;
use crate::pipeline::router::Mode;
use serde::Serialize;

/// A successful answer.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub mode: Mode,
    /// The assistant's answer text.
    pub answer: String,
    /// Reasoning trace, when the backend streamed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Name of the attached file, if any.
    pub filename: Option<String>,
    /// Pages in the attached PDF; 0 for text and image requests.
    pub pages: usize,
    /// Model that produced the answer.
    pub model: String,
    /// Wall-clock time for the whole request.
    pub duration_ms: u64,
}

/// JSON envelope returned to a client.
///
/// ```text
/// {"success": true,  "answer": "...", "mode": "pdf", "filename": "a.pdf", "pages": 3}
/// {"success": false, "error": "...", "kind": "timeout", "status": 504}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Success {
        success: bool,
        answer: String,
        mode: Mode,
        filename: Option<String>,
        pages: usize,
    },
    Failure {
        success: bool,
        error: String,
        kind: &'static str,
        status: u16,
    },
}

impl Envelope {
    pub fn success(answer: &Answer) -> Self {
        Envelope::Success {
            success: true,
            answer: answer.answer.clone(),
            mode: answer.mode,
            filename: answer.filename.clone(),
            pages: answer.pages,
        }
    }

    pub fn failure(err: &PageLensError) -> Self {
        let error = match err {
            // Client rejections carry a reason meant for the caller as-is.
            PageLensError::Rejected(c) => c.reason.clone(),
            other => other.to_string(),
        };
        Envelope::Failure {
            success: false,
            error,
            kind: err.kind(),
            status: err.status_hint(),
        }
    }

    pub fn from_result(result: &Result<Answer, PageLensError>) -> Self {
        match result {
            Ok(answer) => Self::success(answer),
            Err(err) => Self::failure(err),
        }
    }

    /// HTTP-equivalent status: 200 on success.
    pub fn status(&self) -> u16 {
        match self {
            Envelope::Success { .. } => 200,
            Envelope::Failure { status, .. } => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use serde_json::json;

    fn answer() -> Answer {
        Answer {
            mode: Mode::Pdf,
            answer: "Three sections.".into(),
            reasoning: None,
            filename: Some("report.pdf".into()),
            pages: 3,
            model: "glm-4v".into(),
            duration_ms: 12,
        }
    }

    #[test]
    fn success_envelope_shape() {
        let env = Envelope::from_result(&Ok(answer()));
        assert_eq!(env.status(), 200);
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({
                "success": true,
                "answer": "Three sections.",
                "mode": "pdf",
                "filename": "report.pdf",
                "pages": 3
            })
        );
    }

    #[test]
    fn rejection_envelope_uses_plain_reason() {
        let err: PageLensError = ClientError::unsupported_file_type("docx").into();
        let env = Envelope::failure(&err);
        assert_eq!(env.status(), 400);
        assert!(!env.is_success());
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({
                "success": false,
                "error": "unsupported file type: .docx",
                "kind": "client_error",
                "status": 400
            })
        );
    }

    #[test]
    fn timeout_envelope() {
        let env = Envelope::failure(&PageLensError::Timeout { secs: 30 });
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["kind"], "timeout");
        assert_eq!(v["status"], 504);
    }

    #[test]
    fn answer_skips_absent_reasoning() {
        let v = serde_json::to_value(answer()).unwrap();
        assert!(v.get("reasoning").is_none());
        assert_eq!(v["model"], "glm-4v");
    }
}
