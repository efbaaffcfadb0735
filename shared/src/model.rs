use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::FormConfig;
use crate::location::LocationTracker;
use crate::notice::Notice;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoordinateError {
    #[error("Latitude {0} is out of valid range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("Longitude {0} is out of valid range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("Coordinate value is not finite (NaN or Infinity)")]
    NonFinite,
}

/// Validated latitude/longitude pair, captured once per acquisition.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinates")]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinates {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinates> for Coordinates {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinates) -> Result<Self, Self::Error> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self { latitude, longitude })
    }

    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Six decimal places, the precision shown to the user.
    #[must_use]
    pub fn display(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

impl PartialEq for Coordinates {
    fn eq(&self, other: &Self) -> bool {
        self.latitude.to_bits() == other.latitude.to_bits()
            && self.longitude.to_bits() == other.longitude.to_bits()
    }
}

impl Eq for Coordinates {}

/// Best-effort postal address. Any field may be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub address_line1: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
}

/// A captured fix, optionally enriched with an address.
///
/// The address only ever travels together with the coordinates it was
/// resolved for, so an address without coordinates cannot be represented.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedLocation {
    pub coordinates: Coordinates,
    pub address: Option<ResolvedAddress>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactFieldName {
    Name,
    Email,
    Phone,
}

impl ContactFieldName {
    pub const ALL: [Self; 3] = [Self::Name, Self::Email, Self::Phone];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Email => "Email",
            Self::Phone => "Phone",
        }
    }

    /// Query-string key used by embedding pages.
    #[must_use]
    pub const fn query_key(self) -> &'static str {
        match self {
            Self::Name => "cli_name",
            Self::Email => "cli_email",
            Self::Phone => "cli_phone",
        }
    }
}

/// A contact value plus its editability, fixed when the session starts.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactField {
    pub value: String,
    pub locked: bool,
}

impl ContactField {
    /// Locked iff a non-empty initial value was supplied.
    #[must_use]
    pub fn initial(value: impl Into<String>) -> Self {
        let value = value.into();
        let locked = !value.trim().is_empty();
        Self { value, locked }
    }
}

// Redact debug output: contact values are personal data.
impl fmt::Debug for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContactField")
            .field("value_present", &!self.value.is_empty())
            .field("locked", &self.locked)
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: ContactField,
    pub email: ContactField,
    pub phone: ContactField,
}

impl ContactInfo {
    #[must_use]
    pub fn field(&self, name: ContactFieldName) -> &ContactField {
        match name {
            ContactFieldName::Name => &self.name,
            ContactFieldName::Email => &self.email,
            ContactFieldName::Phone => &self.phone,
        }
    }

    pub fn field_mut(&mut self, name: ContactFieldName) -> &mut ContactField {
        match name {
            ContactFieldName::Name => &mut self.name,
            ContactFieldName::Email => &mut self.email,
            ContactFieldName::Phone => &mut self.phone,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKey {
    Front,
    Back,
    Left,
    Right,
}

impl ViewKey {
    pub const ALL: [Self; 4] = [Self::Front, Self::Back, Self::Left, Self::Right];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Front => "Front",
            Self::Back => "Back",
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Don't hold image bytes in the core. The shell owns the file; we keep a handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    pub uri: String,
    pub file_name: Option<String>,
    pub mime_type: String,
    pub size_bytes: Option<u64>,
}

impl ImageHandle {
    #[must_use]
    pub fn is_image(&self) -> bool {
        let mime = self.mime_type.trim().to_ascii_lowercase();
        mime.strip_prefix("image/").is_some_and(|sub| !sub.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    pub front: Option<ImageHandle>,
    pub back: Option<ImageHandle>,
    pub left: Option<ImageHandle>,
    pub right: Option<ImageHandle>,
}

impl ImageSet {
    #[must_use]
    pub fn get(&self, view: ViewKey) -> Option<&ImageHandle> {
        self.slot(view).as_ref()
    }

    /// Replaces the image for `view`, returning the previous one.
    pub fn replace(&mut self, view: ViewKey, image: ImageHandle) -> Option<ImageHandle> {
        self.slot_mut(view).replace(image)
    }

    pub fn remove(&mut self, view: ViewKey) -> Option<ImageHandle> {
        self.slot_mut(view).take()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        ViewKey::ALL.iter().filter(|v| self.get(**v).is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ViewKey, &ImageHandle)> {
        ViewKey::ALL
            .into_iter()
            .filter_map(move |view| self.get(view).map(|image| (view, image)))
    }

    fn slot(&self, view: ViewKey) -> &Option<ImageHandle> {
        match view {
            ViewKey::Front => &self.front,
            ViewKey::Back => &self.back,
            ViewKey::Left => &self.left,
            ViewKey::Right => &self.right,
        }
    }

    fn slot_mut(&mut self, view: ViewKey) -> &mut Option<ImageHandle> {
        match view {
            ViewKey::Front => &mut self.front,
            ViewKey::Back => &mut self.back,
            ViewKey::Left => &mut self.left,
            ViewKey::Right => &mut self.right,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting {
        submission_id: SubmissionId,
    },
    Completed {
        reference: String,
    },
}

impl SubmissionState {
    #[must_use]
    pub const fn is_submitting(&self) -> bool {
        matches!(self, Self::Submitting { .. })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    #[default]
    Assistance,
    Inspection,
}

impl FormKind {
    /// The inspection form has no issue description.
    #[must_use]
    pub const fn has_issue_description(self) -> bool {
        matches!(self, Self::Assistance)
    }

    /// The inspection form acquires a location as soon as it opens.
    #[must_use]
    pub const fn acquires_on_start(self) -> bool {
        matches!(self, Self::Inspection)
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Assistance => "Truck Assistance Request",
            Self::Inspection => "Truck Inspection Form",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assistance => "assistance",
            Self::Inspection => "inspection",
        }
    }
}

/// Everything the user has entered in one session. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub contact: ContactInfo,
    pub location: Option<CapturedLocation>,
    pub issue_description: String,
    pub images: ImageSet,
    pub submission: SubmissionState,
}

#[derive(Debug, Default)]
pub struct Model {
    pub kind: FormKind,
    pub config: FormConfig,
    pub draft: RequestDraft,
    pub tracker: LocationTracker,
    pub notice: Option<Notice>,
}

impl Model {
    pub fn show_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(uri: &str) -> ImageHandle {
        ImageHandle {
            uri: uri.into(),
            file_name: None,
            mime_type: "image/jpeg".into(),
            size_bytes: Some(1024),
        }
    }

    #[test]
    fn coordinates_accept_valid() {
        assert!(Coordinates::new(37.7749, -122.4194).is_ok());
        assert!(Coordinates::new(90.0, 180.0).is_ok());
        assert!(Coordinates::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn coordinates_reject_out_of_range() {
        assert!(matches!(
            Coordinates::new(91.0, 0.0),
            Err(CoordinateError::LatitudeOutOfRange(_))
        ));
        assert!(matches!(
            Coordinates::new(0.0, -181.0),
            Err(CoordinateError::LongitudeOutOfRange(_))
        ));
    }

    #[test]
    fn coordinates_reject_non_finite() {
        assert_eq!(Coordinates::new(f64::NAN, 0.0), Err(CoordinateError::NonFinite));
        assert_eq!(
            Coordinates::new(0.0, f64::INFINITY),
            Err(CoordinateError::NonFinite)
        );
    }

    #[test]
    fn deserialized_coordinates_are_validated() {
        let ok: Coordinates =
            serde_json::from_str(r#"{"latitude":37.7749,"longitude":-122.4194}"#).unwrap();
        assert_eq!(ok, Coordinates::new(37.7749, -122.4194).unwrap());

        let err = serde_json::from_str::<Coordinates>(r#"{"latitude":91.0,"longitude":0.0}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Latitude 91"));
    }

    #[test]
    fn coordinates_display_six_places() {
        let c = Coordinates::new(37.7749, -122.4194).unwrap();
        assert_eq!(c.display(), "37.774900, -122.419400");
    }

    #[test]
    fn contact_field_locks_only_non_empty() {
        assert!(ContactField::initial("Jane Doe").locked);
        assert!(!ContactField::initial("").locked);
        assert!(!ContactField::initial("   ").locked);
    }

    #[test]
    fn contact_field_debug_is_redacted() {
        let field = ContactField::initial("jane@example.com");
        let debug = format!("{field:?}");
        assert!(!debug.contains("jane"));
        assert!(debug.contains("value_present: true"));
    }

    #[test]
    fn image_set_replace_returns_previous() {
        let mut images = ImageSet::default();
        assert!(images.replace(ViewKey::Front, handle("blob:1")).is_none());
        let previous = images.replace(ViewKey::Front, handle("blob:2"));
        assert_eq!(previous.map(|h| h.uri), Some("blob:1".to_string()));
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn image_set_iterates_in_view_order() {
        let mut images = ImageSet::default();
        images.replace(ViewKey::Right, handle("blob:r"));
        images.replace(ViewKey::Front, handle("blob:f"));
        let views: Vec<_> = images.iter().map(|(v, _)| v).collect();
        assert_eq!(views, vec![ViewKey::Front, ViewKey::Right]);
    }

    #[test]
    fn image_handle_detects_media_type() {
        assert!(handle("blob:1").is_image());
        let mut pdf = handle("blob:2");
        pdf.mime_type = "application/pdf".into();
        assert!(!pdf.is_image());
        pdf.mime_type = "image/".into();
        assert!(!pdf.is_image());
        pdf.mime_type = " IMAGE/HEIC ".into();
        assert!(pdf.is_image());
    }

    #[test]
    fn submission_state_defaults_idle() {
        assert_eq!(SubmissionState::default(), SubmissionState::Idle);
        assert!(!SubmissionState::Idle.is_submitting());
    }
}
