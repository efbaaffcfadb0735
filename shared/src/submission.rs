//! Submission: validate the draft, send it once, and track the outcome.
//!
//! `Idle -> Submitting -> Completed`, with failures returning to `Idle` and
//! leaving the draft untouched so the user can retry. While a submission is
//! in flight further submit requests are refused by [`SubmissionGuard`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capabilities::{
    AppHttp, ValidatedUrl, CONTENT_TYPE_JSON, HEADER_ACCEPT, HEADER_CONTENT_TYPE,
    HEADER_IDEMPOTENCY_KEY,
};
use crate::config::SubmissionConfig;
use crate::event::Event;
use crate::model::{
    CapturedLocation, FormKind, ImageHandle, RequestDraft, SubmissionId, SubmissionState,
    ViewKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    Name,
    Email,
    Phone,
    IssueDescription,
}

impl RequiredField {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone number",
            Self::IssueDescription => "issue description",
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn join_labels(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Please fill in your {}.", join_labels(.0))]
    MissingFields(Vec<RequiredField>),
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("The {0} view must be an image file.")]
    NotAnImage(ViewKey),
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionError {
    #[error("could not encode request: {0}")]
    Encode(String),
    #[error("invalid submission endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request rejected with HTTP {status}")]
    Rejected {
        status: u16,
        message: Option<String>,
    },
    #[error("server error HTTP {status}")]
    Server { status: u16 },
}

impl SubmissionError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Encode(_) => "SUBMISSION_ENCODE",
            Self::InvalidEndpoint(_) => "SUBMISSION_INVALID_ENDPOINT",
            Self::Network(_) => "SUBMISSION_NETWORK",
            Self::Rejected { .. } => "SUBMISSION_REJECTED",
            Self::Server { .. } => "SUBMISSION_SERVER",
        }
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self {
            Self::Network(_) => {
                "Unable to connect. Please check your internet connection.".into()
            }
            Self::Rejected {
                message: Some(message),
                ..
            } => message.clone(),
            Self::Rejected { message: None, .. } => {
                "The request was not accepted.".into()
            }
            Self::Server { .. } | Self::Encode(_) | Self::InvalidEndpoint(_) => {
                "Something went wrong on our side.".into()
            }
        }
    }
}

/// Checks required fields before anything leaves the device.
pub fn validate(kind: FormKind, draft: &RequestDraft) -> Result<(), ValidationError> {
    let blank = |s: &str| s.trim().is_empty();
    let contact = &draft.contact;

    let mut missing = Vec::new();
    if blank(&contact.name.value) {
        missing.push(RequiredField::Name);
    }
    if blank(&contact.email.value) {
        missing.push(RequiredField::Email);
    }
    if blank(&contact.phone.value) {
        missing.push(RequiredField::Phone);
    }
    if kind.has_issue_description() && blank(&draft.issue_description) {
        missing.push(RequiredField::IssueDescription);
    }
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    if !looks_like_email(contact.email.value.trim()) {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(())
}

fn looks_like_email(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub submission_id: SubmissionId,
    pub form: FormKind,
    pub contact: ContactPayload,
    pub location: Option<CapturedLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_description: Option<String>,
    pub images: BTreeMap<ViewKey, ImageHandle>,
}

impl SubmissionPayload {
    #[must_use]
    pub fn from_draft(kind: FormKind, submission_id: SubmissionId, draft: &RequestDraft) -> Self {
        let contact = &draft.contact;
        Self {
            submission_id,
            form: kind,
            contact: ContactPayload {
                name: contact.name.value.trim().to_string(),
                email: contact.email.value.trim().to_string(),
                phone: contact.phone.value.trim().to_string(),
            },
            location: draft.location.clone(),
            issue_description: kind
                .has_issue_description()
                .then(|| draft.issue_description.trim().to_string()),
            images: draft
                .images
                .iter()
                .map(|(view, image)| (view, image.clone()))
                .collect(),
        }
    }
}

/// Sends the payload. `callback` receives the classified outcome.
pub fn send<F>(
    http: &AppHttp,
    config: &SubmissionConfig,
    payload: &SubmissionPayload,
    callback: F,
) -> Result<(), SubmissionError>
where
    F: FnOnce(Result<String, SubmissionError>) -> Event + Send + 'static,
{
    let endpoint = ValidatedUrl::new(config.endpoint.as_str())
        .map_err(|e| SubmissionError::InvalidEndpoint(e.to_string()))?;
    let body = serde_json::to_vec(payload).map_err(|e| SubmissionError::Encode(e.to_string()))?;
    let submission_id = payload.submission_id.clone();

    info!(
        %submission_id,
        host = endpoint.host(),
        form = payload.form.as_str(),
        images = payload.images.len(),
        "sending request"
    );

    http.post(endpoint.as_str())
        .body(body)
        .header(HEADER_CONTENT_TYPE, CONTENT_TYPE_JSON)
        .header(HEADER_ACCEPT, CONTENT_TYPE_JSON)
        .header(HEADER_IDEMPOTENCY_KEY, submission_id.as_str())
        .send(move |result| callback(classify(&submission_id, result)));

    Ok(())
}

fn classify(
    submission_id: &SubmissionId,
    result: crux_http::Result<crux_http::Response<Vec<u8>>>,
) -> Result<String, SubmissionError> {
    match result {
        Ok(mut response) => {
            let status: u16 = response.status().into();
            let body = response.take_body().unwrap_or_default();
            parse_response(submission_id, status, &body)
        }
        // crux_http reports 4xx and 5xx as errors; the status and body still decide.
        Err(crux_http::Error::Http(e)) => parse_response(
            submission_id,
            e.code.into(),
            e.body.as_deref().unwrap_or_default(),
        ),
        Err(e) => Err(SubmissionError::Network(e.to_string())),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SubmissionReply {
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

/// Maps a backend reply to the confirmation reference or a typed failure.
pub fn parse_response(
    submission_id: &SubmissionId,
    status: u16,
    body: &[u8],
) -> Result<String, SubmissionError> {
    match status {
        200..=299 => {
            // An acknowledged request counts even if the body is not what we expect.
            let reply: SubmissionReply = serde_json::from_slice(body).unwrap_or_default();
            Ok(reply
                .reference
                .or(reply.id)
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| submission_id.to_string()))
        }
        400..=499 => {
            let message = serde_json::from_slice::<ApiErrorResponse>(body)
                .ok()
                .and_then(|e| e.message)
                .filter(|m| !m.trim().is_empty());
            Err(SubmissionError::Rejected { status, message })
        }
        _ => Err(SubmissionError::Server { status }),
    }
}

/// What to do with a submission reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Not the submission we are waiting for.
    Ignored,
    Completed(String),
    Failed(SubmissionError),
}

/// The only way to move the submission state.
pub struct SubmissionGuard<'a> {
    state: &'a mut SubmissionState,
}

impl<'a> SubmissionGuard<'a> {
    pub fn new(state: &'a mut SubmissionState) -> Self {
        Self { state }
    }

    /// Enters `Submitting` with a fresh id, unless already submitting.
    pub fn begin(&mut self) -> Option<SubmissionId> {
        if let SubmissionState::Submitting { submission_id } = &*self.state {
            debug!(%submission_id, "submit ignored, already submitting");
            return None;
        }
        let submission_id = SubmissionId::generate();
        *self.state = SubmissionState::Submitting {
            submission_id: submission_id.clone(),
        };
        Some(submission_id)
    }

    /// Back to `Idle` without a reply, e.g. when the request could not be sent.
    pub fn abort(&mut self, submission_id: &SubmissionId) {
        if self.is_current(submission_id) {
            *self.state = SubmissionState::Idle;
        }
    }

    pub fn complete(
        &mut self,
        submission_id: &SubmissionId,
        result: Result<String, SubmissionError>,
    ) -> Completion {
        if !self.is_current(submission_id) {
            debug!(%submission_id, "reply for unknown submission dropped");
            return Completion::Ignored;
        }

        match result {
            Ok(reference) => {
                info!(%submission_id, %reference, "request accepted");
                *self.state = SubmissionState::Completed {
                    reference: reference.clone(),
                };
                Completion::Completed(reference)
            }
            Err(error) => {
                warn!(%submission_id, code = error.code(), %error, "submission failed");
                *self.state = SubmissionState::Idle;
                Completion::Failed(error)
            }
        }
    }

    fn is_current(&self, submission_id: &SubmissionId) -> bool {
        matches!(&*self.state, SubmissionState::Submitting { submission_id: current } if current == submission_id)
    }
}
