//! The form state controller: owns the [`RequestDraft`] and applies every
//! mutation to it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::location::LocationResult;
use crate::model::{
    CapturedLocation, ContactField, ContactFieldName, ContactInfo, ImageHandle, RequestDraft,
    ViewKey,
};
use crate::submission::ValidationError;
use crate::LOCATION_CAPTURED_PREFIX;

/// Contact values supplied by whoever embeds the form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefill {
    #[serde(default)]
    pub cli_name: Option<String>,
    #[serde(default)]
    pub cli_email: Option<String>,
    #[serde(default)]
    pub cli_phone: Option<String>,
}

impl Prefill {
    #[must_use]
    pub fn get(&self, field: ContactFieldName) -> Option<&str> {
        match field {
            ContactFieldName::Name => self.cli_name.as_deref(),
            ContactFieldName::Email => self.cli_email.as_deref(),
            ContactFieldName::Phone => self.cli_phone.as_deref(),
        }
    }

    fn slot_mut(&mut self, field: ContactFieldName) -> &mut Option<String> {
        match field {
            ContactFieldName::Name => &mut self.cli_name,
            ContactFieldName::Email => &mut self.cli_email,
            ContactFieldName::Phone => &mut self.cli_phone,
        }
    }

    /// Reads `cli_name`, `cli_email` and `cli_phone` from a page URL.
    /// Anything unparseable yields an empty prefill.
    #[must_use]
    pub fn from_page_url(page_url: &str) -> Self {
        let Ok(url) = Url::parse(page_url) else {
            debug!("page url not parseable, ignoring query prefill");
            return Self::default();
        };

        let mut prefill = Self::default();
        for (key, value) in url.query_pairs() {
            let Some(field) = ContactFieldName::ALL
                .into_iter()
                .find(|field| field.query_key() == key)
            else {
                continue;
            };
            prefill
                .slot_mut(field)
                .get_or_insert_with(|| value.into_owned());
        }
        prefill
    }

    /// Resolves direct parameters against the query string, once, at session
    /// start. A non-empty direct value wins, then a non-empty query value.
    #[must_use]
    pub fn resolve(direct: &Self, query: &Self) -> ContactInfo {
        let pick = |field: ContactFieldName| {
            let non_empty = |v: Option<&str>| v.filter(|s| !s.trim().is_empty()).map(str::to_owned);
            ContactField::initial(
                non_empty(direct.get(field))
                    .or_else(|| non_empty(query.get(field)))
                    .unwrap_or_default(),
            )
        };

        ContactInfo {
            name: pick(ContactFieldName::Name),
            email: pick(ContactFieldName::Email),
            phone: pick(ContactFieldName::Phone),
        }
    }
}

/// Outcome of a user edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldEdit {
    Applied,
    /// The field was pre-filled at session start and is read-only.
    Locked,
}

pub struct FormController<'a> {
    draft: &'a mut RequestDraft,
}

impl<'a> FormController<'a> {
    pub fn new(draft: &'a mut RequestDraft) -> Self {
        Self { draft }
    }

    /// A fresh draft for a new session.
    #[must_use]
    pub fn start(contact: ContactInfo) -> RequestDraft {
        RequestDraft {
            contact,
            ..RequestDraft::default()
        }
    }

    /// Programmatic update. Locks are a presentation concern and do not apply.
    pub fn set_field(&mut self, field: ContactFieldName, value: impl Into<String>) {
        self.draft.contact.field_mut(field).value = value.into();
    }

    /// The user input path: refuses edits to locked fields.
    pub fn edit_field(&mut self, field: ContactFieldName, value: impl Into<String>) -> FieldEdit {
        let slot = self.draft.contact.field_mut(field);
        if slot.locked {
            debug!(field = field.label(), "edit to locked field refused");
            return FieldEdit::Locked;
        }
        slot.value = value.into();
        FieldEdit::Applied
    }

    pub fn set_issue_description(&mut self, value: impl Into<String>) {
        self.draft.issue_description = value.into();
    }

    /// Replaces the image for one view. Other views are untouched.
    pub fn set_image(&mut self, view: ViewKey, image: ImageHandle) -> Result<(), ValidationError> {
        if !image.is_image() {
            warn!(%view, mime = %image.mime_type, "non-image file rejected");
            return Err(ValidationError::NotAnImage(view));
        }
        if self.draft.images.replace(view, image).is_some() {
            debug!(%view, "image replaced");
        }
        Ok(())
    }

    pub fn clear_image(&mut self, view: ViewKey) {
        self.draft.images.remove(view);
    }

    /// Merges an acquisition result. A denial writes nothing.
    pub fn attach_location(&mut self, result: LocationResult) {
        match result {
            LocationResult::Granted(coordinates, address) => {
                self.draft.location = Some(CapturedLocation {
                    coordinates,
                    address,
                });
            }
            LocationResult::Denied(reason) => {
                debug!(%reason, "denied location not attached");
            }
        }
    }

    #[must_use]
    pub fn location_display(&self) -> Option<String> {
        location_display(&*self.draft)
    }
}

/// One line describing the captured location: the address when it has one,
/// otherwise the coordinates.
#[must_use]
pub fn location_display(draft: &RequestDraft) -> Option<String> {
    let location = draft.location.as_ref()?;
    let line = location
        .address
        .as_ref()
        .map(|a| a.address_line1.trim())
        .filter(|line| !line.is_empty());
    Some(match line {
        Some(line) => line.to_owned(),
        None => format!("{LOCATION_CAPTURED_PREFIX}{}", location.coordinates.display()),
    })
}
