use serde::{Deserialize, Serialize};

use crate::capabilities::GeolocationResult;
use crate::config::FormConfig;
use crate::form::Prefill;
use crate::geocoding::ResolutionError;
use crate::location::AttemptId;
use crate::model::{
    ContactFieldName, Coordinates, FormKind, ImageHandle, ResolvedAddress, SubmissionId, ViewKey,
};
use crate::submission::SubmissionError;

/// Everything the shell can tell the core, plus the internal replies that
/// capabilities route back. Large variants are boxed to keep the enum small.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Session
    SessionStarted(Box<SessionStart>),

    // Field input
    ContactEdited {
        field: ContactFieldName,
        value: String,
    },
    IssueEdited(String),
    ImageSelected {
        view: ViewKey,
        image: Box<ImageHandle>,
    },
    ImageCleared(ViewKey),

    // Location
    LocationRequested,
    #[serde(skip)]
    PositionReceived {
        attempt: AttemptId,
        result: GeolocationResult,
    },
    #[serde(skip)]
    AddressResolved {
        attempt: AttemptId,
        coordinates: Coordinates,
        result: Box<Result<ResolvedAddress, ResolutionError>>,
    },
    /// The address lookup deadline for `attempt` passed.
    #[serde(skip)]
    AddressTimedOut {
        attempt: AttemptId,
        coordinates: Coordinates,
    },

    // Submission
    SubmitRequested,
    #[serde(skip)]
    SubmissionResponded {
        submission_id: SubmissionId,
        result: Box<Result<String, SubmissionError>>,
    },

    NoticeDismissed,
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted(_) => "session_started",
            Self::ContactEdited { .. } => "contact_edited",
            Self::IssueEdited(_) => "issue_edited",
            Self::ImageSelected { .. } => "image_selected",
            Self::ImageCleared(_) => "image_cleared",
            Self::LocationRequested => "location_requested",
            Self::PositionReceived { .. } => "position_received",
            Self::AddressResolved { .. } => "address_resolved",
            Self::AddressTimedOut { .. } => "address_timed_out",
            Self::SubmitRequested => "submit_requested",
            Self::SubmissionResponded { .. } => "submission_responded",
            Self::NoticeDismissed => "notice_dismissed",
        }
    }
}

/// How the hosting page opened the form.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SessionStart {
    pub kind: FormKind,
    /// Values passed directly by the embedding code.
    #[serde(default)]
    pub prefill: Prefill,
    /// The hosting page URL; its query string may carry `cli_*` values.
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub config: Option<FormConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_size_is_reasonable() {
        let size = std::mem::size_of::<Event>();
        assert!(size <= 96, "Event enum is {size} bytes, box more variants");
    }

    #[test]
    fn shell_events_deserialize() {
        let event: Event =
            serde_json::from_str(r#"{"ContactEdited":{"field":"email","value":"a@b.co"}}"#)
                .unwrap();
        assert_eq!(
            event,
            Event::ContactEdited {
                field: ContactFieldName::Email,
                value: "a@b.co".into(),
            }
        );

        let event: Event = serde_json::from_str(
            r#"{"SessionStarted":{"kind":"inspection","page_url":"https://x.test/?cli_name=Al"}}"#,
        )
        .unwrap();
        let Event::SessionStarted(start) = event else {
            panic!("expected session start");
        };
        assert_eq!(start.kind, FormKind::Inspection);
        assert_eq!(start.prefill, Prefill::default());
        assert!(start.config.is_none());
    }

    #[test]
    fn internal_events_are_not_accepted_from_the_shell() {
        let result = serde_json::from_str::<Event>(r#"{"SubmissionResponded":{}}"#);
        assert!(result.is_err());
    }
}
