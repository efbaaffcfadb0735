// lib.rs - Truck assistance / inspection intake core

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod capabilities;
pub mod config;
pub mod event;
pub mod form;
pub mod geocoding;
pub mod location;
pub mod model;
pub mod notice;
pub mod submission;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::{ConfigError, FormConfig};
pub use crux_core::App as CruxApp;
pub use event::{Event, SessionStart};
pub use form::Prefill;
pub use geocoding::ResolutionError;
pub use location::{DenialReason, LocationResult};
pub use model::{
    ContactFieldName, Coordinates, FormKind, ImageHandle, Model, ResolvedAddress, ViewKey,
};
pub use notice::{Notice, NoticeSeverity};
pub use submission::{SubmissionError, ValidationError};

pub const ACCESSING_LOCATION_TEXT: &str = "Accessing location...";
pub const LOCATION_CAPTURED_PREFIX: &str = "Location captured: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    LocationDenied,
    Resolution,
    Validation,
    Submission,
    Configuration,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::LocationDenied => "LOCATION_DENIED",
            Self::Resolution => "RESOLUTION_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Submission => "SUBMISSION_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
        }
    }
}

/// Every failure the core can hand to the user. None of them are fatal:
/// each one becomes a [`Notice`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("location denied: {0}")]
    LocationDenied(DenialReason),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

impl AppError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::LocationDenied(_) => ErrorKind::LocationDenied,
            Self::Resolution(_) => ErrorKind::Resolution,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Submission(_) => ErrorKind::Submission,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind().code()
    }

    #[must_use]
    pub fn notice(&self, form: FormKind) -> Notice {
        match self {
            Self::LocationDenied(reason) => {
                Notice::location_denied(form, &reason.as_platform_error())
            }
            Self::Resolution(e) => Notice::address_unavailable(e),
            Self::Validation(ValidationError::NotAnImage(view)) => Notice::image_rejected(*view),
            Self::Validation(e) => Notice::invalid(e),
            Self::Submission(e) => Notice::submission_failed(e),
            Self::Configuration(_) => Notice::new(
                "Using default settings",
                "The form settings were invalid, so defaults are in use.",
                NoticeSeverity::Advisory,
            )
            .with_code(self.code()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactFieldView {
    pub field: ContactFieldName,
    pub label: String,
    pub value: String,
    pub read_only: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocationView {
    None,
    Requesting {
        text: String,
    },
    Coordinates {
        text: String,
        latitude: f64,
        longitude: f64,
    },
    Address {
        address_line1: String,
        street: String,
        city: String,
        state: String,
        zipcode: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSlotView {
    pub view: ViewKey,
    pub label: String,
    pub image_uri: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitView {
    pub enabled: bool,
    pub label: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub kind: FormKind,
    pub title: String,
    pub contact: Vec<ContactFieldView>,
    /// `None` for forms without an issue description.
    pub issue_description: Option<String>,
    pub location: LocationView,
    pub images: Vec<ImageSlotView>,
    pub submit: SubmitView,
    /// Backend reference of the accepted request, once there is one.
    pub confirmation: Option<String>,
    pub notice: Option<Notice>,
}

pub mod app {
    use tracing::{debug, info, warn};

    use super::{
        AppError, ContactFieldView, ImageSlotView, LocationView, SubmitView, ViewModel,
        ACCESSING_LOCATION_TEXT,
    };
    use crate::capabilities::Capabilities;
    use crate::config::FormConfig;
    use crate::event::{Event, SessionStart};
    use crate::form::{self, FieldEdit, FormController, Prefill};
    use crate::geocoding::{self, ResolutionError};
    use crate::location::{
        AcquisitionState, AddressStep, AttemptId, LocationResult, PositionStep,
    };
    use crate::model::{
        ContactFieldName, Coordinates, FormKind, Model, ResolvedAddress, SubmissionId,
        SubmissionState, ViewKey,
    };
    use crate::notice::Notice;
    use crate::submission::{self, Completion, SubmissionGuard, SubmissionPayload};

    #[derive(Default)]
    pub struct App;

    impl App {
        fn report(model: &mut Model, error: AppError) {
            warn!(code = error.code(), %error, "reporting failure to user");
            let notice = error.notice(model.kind);
            model.show_notice(notice);
        }

        fn start_session(start: SessionStart, model: &mut Model, caps: &Capabilities) {
            let SessionStart {
                kind,
                prefill,
                page_url,
                config,
            } = start;

            let query = page_url
                .as_deref()
                .map(Prefill::from_page_url)
                .unwrap_or_default();
            let contact = Prefill::resolve(&prefill, &query);
            let locked = ContactFieldName::ALL
                .iter()
                .filter(|f| contact.field(**f).locked)
                .count();

            model.kind = kind;
            model.draft = FormController::start(contact);
            model.tracker.reset();
            model.clear_notice();
            model.config = FormConfig::default();

            if let Some(config) = config {
                match config.validate() {
                    Ok(()) => model.config = config,
                    Err(e) => Self::report(model, e.into()),
                }
            }

            info!(form = kind.as_str(), locked, "session started");

            if kind.acquires_on_start() {
                Self::request_location(model, caps);
            }
        }

        fn request_location(model: &mut Model, caps: &Capabilities) {
            let attempt = model.tracker.begin();
            caps.geolocation
                .current_position(model.config.position, move |result| {
                    Event::PositionReceived { attempt, result }
                });
        }

        /// Returns whether anything changed.
        fn apply_address(
            model: &mut Model,
            attempt: AttemptId,
            coordinates: Coordinates,
            result: Result<ResolvedAddress, ResolutionError>,
        ) -> bool {
            match model.tracker.on_address(attempt, coordinates, result) {
                AddressStep::Ignored => false,
                AddressStep::Finished { result, error } => {
                    FormController::new(&mut model.draft).attach_location(result);
                    if let Some(error) = error {
                        Self::report(model, error.into());
                    }
                    true
                }
            }
        }

        fn on_position(
            attempt: AttemptId,
            result: crate::capabilities::GeolocationResult,
            model: &mut Model,
            caps: &Capabilities,
        ) -> bool {
            match model.tracker.on_position(attempt, result) {
                PositionStep::Ignored => false,
                PositionStep::Resolve(coordinates) => {
                    // Coordinates are usable on their own; the address, if
                    // any, is attached when the lookup answers.
                    FormController::new(&mut model.draft)
                        .attach_location(LocationResult::Granted(coordinates, None));
                    model.show_notice(Notice::location_accessed(model.kind));

                    let sent = geocoding::resolve(
                        &caps.http,
                        &model.config.geocoder,
                        coordinates,
                        move |result| Event::AddressResolved {
                            attempt,
                            coordinates,
                            result: Box::new(result),
                        },
                    );
                    match sent {
                        Ok(()) => caps.timer.after(model.config.geocoder.timeout_ms, move || {
                            Event::AddressTimedOut {
                                attempt,
                                coordinates,
                            }
                        }),
                        Err(error) => {
                            Self::apply_address(model, attempt, coordinates, Err(error));
                        }
                    }
                    true
                }
                PositionStep::Finished(result) => {
                    if let LocationResult::Denied(reason) = &result {
                        Self::report(model, AppError::LocationDenied(reason.clone()));
                    }
                    FormController::new(&mut model.draft).attach_location(result);
                    true
                }
            }
        }

        fn submit(model: &mut Model, caps: &Capabilities) -> bool {
            if model.draft.submission.is_submitting() {
                debug!("submit ignored while a submission is pending");
                return false;
            }

            if let Err(error) = submission::validate(model.kind, &model.draft) {
                Self::report(model, error.into());
                return true;
            }

            let Some(submission_id) = SubmissionGuard::new(&mut model.draft.submission).begin()
            else {
                return false;
            };
            model.clear_notice();

            let payload =
                SubmissionPayload::from_draft(model.kind, submission_id.clone(), &model.draft);
            let reply_id = submission_id.clone();
            let sent = submission::send(
                &caps.http,
                &model.config.submission,
                &payload,
                move |result| Event::SubmissionResponded {
                    submission_id: reply_id,
                    result: Box::new(result),
                },
            );

            if let Err(error) = sent {
                SubmissionGuard::new(&mut model.draft.submission).abort(&submission_id);
                Self::report(model, error.into());
            }
            true
        }

        fn on_submission_reply(
            submission_id: &SubmissionId,
            result: Result<String, submission::SubmissionError>,
            model: &mut Model,
        ) -> bool {
            match SubmissionGuard::new(&mut model.draft.submission).complete(submission_id, result)
            {
                Completion::Ignored => false,
                Completion::Completed(reference) => {
                    model.show_notice(Notice::submitted(model.kind, &reference));
                    true
                }
                Completion::Failed(error) => {
                    Self::report(model, error.into());
                    true
                }
            }
        }

        fn location_view(model: &Model) -> LocationView {
            // A new request hides the previous fix until the platform answers.
            if model.tracker.state() == AcquisitionState::Requesting {
                return LocationView::Requesting {
                    text: ACCESSING_LOCATION_TEXT.into(),
                };
            }

            if let Some(location) = &model.draft.location {
                return match &location.address {
                    Some(address) => LocationView::Address {
                        address_line1: address.address_line1.clone(),
                        street: address.street.clone(),
                        city: address.city.clone(),
                        state: address.state.clone(),
                        zipcode: address.zipcode.clone(),
                    },
                    None => LocationView::Coordinates {
                        text: form::location_display(&model.draft).unwrap_or_default(),
                        latitude: location.coordinates.latitude(),
                        longitude: location.coordinates.longitude(),
                    },
                };
            }

            LocationView::None
        }

        fn submit_view(model: &Model) -> SubmitView {
            let submitting = model.draft.submission.is_submitting();
            let label = match (model.kind, submitting) {
                (FormKind::Assistance, false) => "Request Assistance Now",
                (FormKind::Assistance, true) => "Sending Request...",
                (FormKind::Inspection, false) => "Submit Inspection",
                (FormKind::Inspection, true) => "Submitting...",
            };
            SubmitView {
                enabled: !submitting,
                label: label.into(),
            }
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            debug!(event = event.name(), "update");

            let changed = match event {
                Event::SessionStarted(start) => {
                    Self::start_session(*start, model, caps);
                    true
                }

                Event::ContactEdited { field, value } => {
                    // Render either way so a refused edit snaps back in the shell.
                    if FormController::new(&mut model.draft).edit_field(field, value)
                        == FieldEdit::Locked
                    {
                        debug!(field = field.label(), "locked field kept its value");
                    }
                    true
                }

                Event::IssueEdited(value) => {
                    if model.kind.has_issue_description() {
                        FormController::new(&mut model.draft).set_issue_description(value);
                        true
                    } else {
                        debug!("issue description ignored for this form");
                        false
                    }
                }

                Event::ImageSelected { view, image } => {
                    match FormController::new(&mut model.draft).set_image(view, *image) {
                        Ok(()) => model.show_notice(Notice::image_added(view)),
                        Err(e) => Self::report(model, e.into()),
                    }
                    true
                }

                Event::ImageCleared(view) => {
                    FormController::new(&mut model.draft).clear_image(view);
                    true
                }

                Event::LocationRequested => {
                    Self::request_location(model, caps);
                    true
                }

                Event::PositionReceived { attempt, result } => {
                    Self::on_position(attempt, result, model, caps)
                }

                Event::AddressResolved {
                    attempt,
                    coordinates,
                    result,
                } => Self::apply_address(model, attempt, coordinates, *result),

                Event::AddressTimedOut {
                    attempt,
                    coordinates,
                } => Self::apply_address(
                    model,
                    attempt,
                    coordinates,
                    Err(ResolutionError::Timeout),
                ),

                Event::SubmitRequested => Self::submit(model, caps),

                Event::SubmissionResponded {
                    submission_id,
                    result,
                } => Self::on_submission_reply(&submission_id, *result, model),

                Event::NoticeDismissed => {
                    model.clear_notice();
                    true
                }
            };

            if changed {
                caps.render.render();
            }
        }

        fn view(&self, model: &Model) -> ViewModel {
            let contact = ContactFieldName::ALL
                .into_iter()
                .map(|field| {
                    let slot = model.draft.contact.field(field);
                    ContactFieldView {
                        field,
                        label: field.label().into(),
                        value: slot.value.clone(),
                        read_only: slot.locked,
                    }
                })
                .collect();

            let images = ViewKey::ALL
                .into_iter()
                .map(|view| ImageSlotView {
                    view,
                    label: format!("{} View", view.title()),
                    image_uri: model.draft.images.get(view).map(|image| image.uri.clone()),
                })
                .collect();

            ViewModel {
                kind: model.kind,
                title: model.kind.title().into(),
                contact,
                issue_description: model
                    .kind
                    .has_issue_description()
                    .then(|| model.draft.issue_description.clone()),
                location: Self::location_view(model),
                images,
                submit: Self::submit_view(model),
                confirmation: match &model.draft.submission {
                    SubmissionState::Completed { reference } => Some(reference.clone()),
                    _ => None,
                },
                notice: model.notice.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::GeolocationError;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            AppError::from(ResolutionError::RateLimited).code(),
            "RESOLUTION_ERROR"
        );
        assert_eq!(
            AppError::LocationDenied(DenialReason::Platform(GeolocationError::Timeout)).code(),
            "LOCATION_DENIED"
        );
    }

    #[test]
    fn resolution_error_is_advisory_and_denial_destructive() {
        let advisory = AppError::from(ResolutionError::Status(500)).notice(FormKind::Assistance);
        assert_eq!(advisory.severity, NoticeSeverity::Advisory);

        let denied = AppError::LocationDenied(DenialReason::Platform(
            GeolocationError::PermissionDenied,
        ))
        .notice(FormKind::Assistance);
        assert_eq!(denied.severity, NoticeSeverity::Destructive);
        assert_eq!(denied.title, "Location error");
    }

    #[test]
    fn non_image_gets_its_own_notice() {
        let notice =
            AppError::from(ValidationError::NotAnImage(ViewKey::Front)).notice(FormKind::Inspection);
        assert_eq!(notice.title, "Image not added");
    }

    #[test]
    fn transparent_errors_keep_message() {
        let error = AppError::from(SubmissionError::Server { status: 503 });
        assert_eq!(error.to_string(), "server error HTTP 503");
    }
}
