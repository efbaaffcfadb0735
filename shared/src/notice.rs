use serde::{Deserialize, Serialize};

use crate::capabilities::GeolocationError;
use crate::geocoding::ResolutionError;
use crate::model::{FormKind, ViewKey};
use crate::submission::{SubmissionError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    #[default]
    Info,
    /// Non-blocking; something degraded but the form is fine.
    Advisory,
    Destructive,
}

impl NoticeSeverity {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Advisory => 4000,
            Self::Destructive => 5000,
        }
    }
}

/// A user-visible consequence of something that happened in the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub severity: NoticeSeverity,
    pub duration_ms: u64,
    /// Stable code for the shell, e.g. to pick an icon or offer a retry.
    pub code: Option<String>,
}

impl Notice {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: NoticeSeverity,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
            duration_ms: severity.default_duration_ms(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn location_accessed(kind: FormKind) -> Self {
        let description = match kind {
            FormKind::Assistance => {
                "Successfully retrieved your location. Help can be sent to your coordinates."
            }
            FormKind::Inspection => "Successfully retrieved your current location.",
        };
        Self::new("Location accessed", description, NoticeSeverity::Info)
    }

    pub fn address_unavailable(error: &ResolutionError) -> Self {
        Self::new(
            "Address unavailable",
            "We saved your coordinates but could not look up a street address. \
             You can still submit the form.",
            NoticeSeverity::Advisory,
        )
        .with_code(error.code())
    }

    pub fn location_denied(kind: FormKind, error: &GeolocationError) -> Self {
        let description = match kind {
            FormKind::Assistance => {
                "Please enable location access to receive assistance at your location."
            }
            FormKind::Inspection => "Please enable location access to continue.",
        };
        let code = match error {
            GeolocationError::PermissionDenied => "LOCATION_PERMISSION_DENIED",
            GeolocationError::PositionUnavailable => "LOCATION_UNAVAILABLE",
            GeolocationError::Timeout => "LOCATION_TIMEOUT",
            GeolocationError::Unsupported => "LOCATION_UNSUPPORTED",
        };
        Self::new("Location error", description, NoticeSeverity::Destructive).with_code(code)
    }

    pub fn image_added(view: ViewKey) -> Self {
        Self::new(
            "Image uploaded",
            format!("{} view image added successfully.", view.title()),
            NoticeSeverity::Info,
        )
    }

    pub fn image_rejected(view: ViewKey) -> Self {
        Self::new(
            "Image not added",
            format!("The {} view must be an image file.", view.as_str()),
            NoticeSeverity::Destructive,
        )
        .with_code("IMAGE_TYPE_UNSUPPORTED")
    }

    pub fn submitted(kind: FormKind, reference: &str) -> Self {
        let (title, description) = match kind {
            FormKind::Assistance => (
                "Help request sent",
                "Your truck assistance request has been received. Help is on the way!",
            ),
            FormKind::Inspection => (
                "Inspection submitted",
                "Your truck inspection has been received.",
            ),
        };
        Self::new(
            title,
            format!("{description} Reference: {reference}."),
            NoticeSeverity::Info,
        )
    }

    pub fn submission_failed(error: &SubmissionError) -> Self {
        Self::new(
            "Request not sent",
            format!(
                "{} Your information is still here; please try again.",
                error.user_facing_message()
            ),
            NoticeSeverity::Destructive,
        )
        .with_code(error.code())
    }

    pub fn invalid(error: &ValidationError) -> Self {
        let title = match error {
            ValidationError::InvalidEmail => "Invalid email",
            _ => "Missing information",
        };
        Self::new(title, error.to_string(), NoticeSeverity::Destructive)
            .with_code("VALIDATION_ERROR")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_notice_capitalises_view() {
        let notice = Notice::image_added(ViewKey::Left);
        assert_eq!(notice.description, "Left view image added successfully.");
        assert_eq!(notice.severity, NoticeSeverity::Info);
    }

    #[test]
    fn resolver_failure_is_advisory() {
        let notice = Notice::address_unavailable(&ResolutionError::Transport("offline".into()));
        assert_eq!(notice.severity, NoticeSeverity::Advisory);
        assert_eq!(notice.code.as_deref(), Some("GEOCODE_NETWORK"));
    }

    #[test]
    fn denial_is_destructive_and_form_specific() {
        let assist =
            Notice::location_denied(FormKind::Assistance, &GeolocationError::PermissionDenied);
        let inspect = Notice::location_denied(FormKind::Inspection, &GeolocationError::Timeout);
        assert_eq!(assist.severity, NoticeSeverity::Destructive);
        assert_ne!(assist.description, inspect.description);
        assert_eq!(inspect.code.as_deref(), Some("LOCATION_TIMEOUT"));
    }

    #[test]
    fn confirmation_carries_reference() {
        let notice = Notice::submitted(FormKind::Inspection, "INS-77");
        assert_eq!(notice.title, "Inspection submitted");
        assert_eq!(
            notice.description,
            "Your truck inspection has been received. Reference: INS-77."
        );
    }

    #[test]
    fn bad_email_is_not_reported_as_missing() {
        let notice = Notice::invalid(&ValidationError::InvalidEmail);
        assert_eq!(notice.title, "Invalid email");
        assert_eq!(notice.description, "Please enter a valid email address.");

        let missing = Notice::invalid(&ValidationError::MissingFields(vec![
            crate::submission::RequiredField::Phone,
        ]));
        assert_eq!(missing.title, "Missing information");
    }

    #[test]
    fn durations_follow_severity() {
        assert!(
            NoticeSeverity::Destructive.default_duration_ms()
                > NoticeSeverity::Info.default_duration_ms()
        );
    }
}
