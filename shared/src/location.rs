//! Location acquisition: one position fix per request, optionally enriched
//! with an address.
//!
//! Every request gets a fresh [`AttemptId`]. Replies carry the id they were
//! issued for and are dropped unless it is still the current one, so a slow
//! reply can never overwrite a newer fix.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::capabilities::{GeolocationError, GeolocationResult};
use crate::geocoding::ResolutionError;
use crate::model::{CoordinateError, Coordinates, ResolvedAddress};

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AttemptId(pub u64);

impl AttemptId {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    #[default]
    Idle,
    /// Waiting for the platform fix.
    Requesting,
    /// Fix captured, waiting for the address lookup.
    Resolving,
    Resolved,
    Denied,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    Platform(GeolocationError),
    /// The platform reported a fix that is not a valid coordinate.
    InvalidFix(String),
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Platform(e) => write!(f, "{e}"),
            Self::InvalidFix(reason) => write!(f, "invalid position fix: {reason}"),
        }
    }
}

impl From<CoordinateError> for DenialReason {
    fn from(e: CoordinateError) -> Self {
        Self::InvalidFix(e.to_string())
    }
}

impl DenialReason {
    /// The platform error to report to the user.
    #[must_use]
    pub fn as_platform_error(&self) -> GeolocationError {
        match self {
            Self::Platform(e) => e.clone(),
            Self::InvalidFix(_) => GeolocationError::PositionUnavailable,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationResult {
    Granted(Coordinates, Option<ResolvedAddress>),
    Denied(DenialReason),
}

/// What the caller should do after a position reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PositionStep {
    /// Stale or unexpected reply; nothing to do.
    Ignored,
    /// Look up the address for these coordinates.
    Resolve(Coordinates),
    Finished(LocationResult),
}

/// What the caller should do after an address reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressStep {
    Ignored,
    /// Attach the result. `error` is set when the lookup failed and the
    /// coordinates are being attached on their own.
    Finished {
        result: LocationResult,
        error: Option<ResolutionError>,
    },
}

#[derive(Debug, Default)]
pub struct LocationTracker {
    current: AttemptId,
    state: AcquisitionState,
    pending: Option<Coordinates>,
}

impl LocationTracker {
    #[must_use]
    pub const fn state(&self) -> AcquisitionState {
        self.state
    }

    #[must_use]
    pub const fn current_attempt(&self) -> AttemptId {
        self.current
    }

    /// Starts a new attempt from whatever state we are in. Any reply for an
    /// earlier attempt becomes stale.
    pub fn begin(&mut self) -> AttemptId {
        self.current = self.current.next();
        self.state = AcquisitionState::Requesting;
        self.pending = None;
        debug!(attempt = %self.current, "location attempt started");
        self.current
    }

    /// Back to idle for a new session. The attempt counter keeps counting so
    /// replies issued before the reset stay stale.
    pub fn reset(&mut self) {
        self.current = self.current.next();
        self.state = AcquisitionState::Idle;
        self.pending = None;
    }

    pub fn on_position(&mut self, attempt: AttemptId, result: GeolocationResult) -> PositionStep {
        if !self.accepts(attempt, AcquisitionState::Requesting) {
            debug!(%attempt, current = %self.current, "stale position reply dropped");
            return PositionStep::Ignored;
        }

        let coordinates = result
            .map_err(DenialReason::Platform)
            .and_then(|position| {
                Coordinates::new(position.latitude, position.longitude).map_err(DenialReason::from)
            });

        match coordinates {
            Ok(coordinates) => {
                self.state = AcquisitionState::Resolving;
                self.pending = Some(coordinates);
                PositionStep::Resolve(coordinates)
            }
            Err(reason) => {
                warn!(%attempt, %reason, "location denied");
                self.state = AcquisitionState::Denied;
                self.pending = None;
                PositionStep::Finished(LocationResult::Denied(reason))
            }
        }
    }

    pub fn on_address(
        &mut self,
        attempt: AttemptId,
        coordinates: Coordinates,
        result: Result<ResolvedAddress, ResolutionError>,
    ) -> AddressStep {
        if !self.accepts(attempt, AcquisitionState::Resolving) {
            debug!(%attempt, current = %self.current, "stale address reply dropped");
            return AddressStep::Ignored;
        }
        if self.pending != Some(coordinates) {
            warn!(%attempt, "address reply for different coordinates dropped");
            return AddressStep::Ignored;
        }

        self.state = AcquisitionState::Resolved;
        self.pending = None;

        match result {
            Ok(address) => AddressStep::Finished {
                result: LocationResult::Granted(coordinates, Some(address)),
                error: None,
            },
            Err(error) => {
                warn!(
                    %attempt,
                    code = error.code(),
                    %error,
                    "address lookup failed, keeping coordinates"
                );
                AddressStep::Finished {
                    result: LocationResult::Granted(coordinates, None),
                    error: Some(error),
                }
            }
        }
    }

    fn accepts(&self, attempt: AttemptId, expected: AcquisitionState) -> bool {
        attempt == self.current && self.state == expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Position;

    fn fix(latitude: f64, longitude: f64) -> GeolocationResult {
        Ok(Position {
            latitude,
            longitude,
            accuracy_m: Some(12.0),
        })
    }

    fn address(line: &str) -> ResolvedAddress {
        ResolvedAddress {
            address_line1: line.into(),
            ..ResolvedAddress::default()
        }
    }

    #[test]
    fn attempts_are_monotonic() {
        let mut tracker = LocationTracker::default();
        let a = tracker.begin();
        let b = tracker.begin();
        assert!(b > a);
        assert_eq!(tracker.current_attempt(), b);
    }

    #[test]
    fn success_then_resolved() {
        let mut tracker = LocationTracker::default();
        let attempt = tracker.begin();
        let PositionStep::Resolve(coords) = tracker.on_position(attempt, fix(37.7749, -122.4194))
        else {
            panic!("expected resolve step");
        };
        assert_eq!(tracker.state(), AcquisitionState::Resolving);

        let step = tracker.on_address(attempt, coords, Ok(address("123 Main St")));
        assert_eq!(
            step,
            AddressStep::Finished {
                result: LocationResult::Granted(coords, Some(address("123 Main St"))),
                error: None,
            }
        );
        assert_eq!(tracker.state(), AcquisitionState::Resolved);
    }

    #[test]
    fn resolver_failure_keeps_coordinates() {
        let mut tracker = LocationTracker::default();
        let attempt = tracker.begin();
        let PositionStep::Resolve(coords) = tracker.on_position(attempt, fix(1.0, 2.0)) else {
            panic!("expected resolve step");
        };
        let step = tracker.on_address(
            attempt,
            coords,
            Err(ResolutionError::Transport("offline".into())),
        );
        assert_eq!(
            step,
            AddressStep::Finished {
                result: LocationResult::Granted(coords, None),
                error: Some(ResolutionError::Transport("offline".into())),
            }
        );
    }

    #[test]
    fn denial_is_terminal() {
        let mut tracker = LocationTracker::default();
        let attempt = tracker.begin();
        let step = tracker.on_position(attempt, Err(GeolocationError::PermissionDenied));
        assert_eq!(
            step,
            PositionStep::Finished(LocationResult::Denied(DenialReason::Platform(
                GeolocationError::PermissionDenied
            )))
        );
        assert_eq!(tracker.state(), AcquisitionState::Denied);
        // A second reply for the same attempt is not accepted.
        assert_eq!(tracker.on_position(attempt, fix(1.0, 2.0)), PositionStep::Ignored);
    }

    #[test]
    fn invalid_fix_is_denied() {
        let mut tracker = LocationTracker::default();
        let attempt = tracker.begin();
        let step = tracker.on_position(attempt, fix(f64::NAN, 0.0));
        assert!(matches!(
            step,
            PositionStep::Finished(LocationResult::Denied(DenialReason::InvalidFix(_)))
        ));
    }

    #[test]
    fn stale_position_is_ignored() {
        let mut tracker = LocationTracker::default();
        let first = tracker.begin();
        let second = tracker.begin();
        assert_eq!(tracker.on_position(first, fix(1.0, 2.0)), PositionStep::Ignored);
        assert!(matches!(
            tracker.on_position(second, fix(3.0, 4.0)),
            PositionStep::Resolve(_)
        ));
    }

    #[test]
    fn slow_address_for_old_attempt_is_ignored() {
        let mut tracker = LocationTracker::default();
        let first = tracker.begin();
        let PositionStep::Resolve(old) = tracker.on_position(first, fix(1.0, 2.0)) else {
            panic!("expected resolve step");
        };

        let second = tracker.begin();
        let PositionStep::Resolve(new) = tracker.on_position(second, fix(3.0, 4.0)) else {
            panic!("expected resolve step");
        };

        assert_eq!(
            tracker.on_address(first, old, Ok(address("old"))),
            AddressStep::Ignored
        );
        assert!(matches!(
            tracker.on_address(second, new, Ok(address("new"))),
            AddressStep::Finished { .. }
        ));
    }

    #[test]
    fn address_for_other_coordinates_is_ignored() {
        let mut tracker = LocationTracker::default();
        let attempt = tracker.begin();
        let PositionStep::Resolve(_) = tracker.on_position(attempt, fix(1.0, 2.0)) else {
            panic!("expected resolve step");
        };
        let elsewhere = Coordinates::new(5.0, 6.0).unwrap();
        assert_eq!(
            tracker.on_address(attempt, elsewhere, Ok(address("x"))),
            AddressStep::Ignored
        );
        assert_eq!(tracker.state(), AcquisitionState::Resolving);
    }

    #[test]
    fn reset_makes_pending_replies_stale() {
        let mut tracker = LocationTracker::default();
        let attempt = tracker.begin();
        tracker.reset();
        assert_eq!(tracker.state(), AcquisitionState::Idle);
        assert_eq!(tracker.on_position(attempt, fix(1.0, 2.0)), PositionStep::Ignored);
    }

    proptest::proptest! {
        #[test]
        fn address_only_lands_on_its_own_coordinates(
            fixes in proptest::collection::vec((-90.0f64..=90.0, -180.0f64..=180.0), 1..6),
            reply_for in 0usize..6,
        ) {
            let mut tracker = LocationTracker::default();
            let mut issued = Vec::new();
            for (lat, lon) in &fixes {
                let attempt = tracker.begin();
                if let PositionStep::Resolve(coords) = tracker.on_position(attempt, fix(*lat, *lon)) {
                    issued.push((attempt, coords));
                }
            }
            let index = reply_for % issued.len();
            let (attempt, coords) = issued[index];

            let step = tracker.on_address(attempt, coords, Ok(address("somewhere")));
            if index + 1 == issued.len() {
                let expected = AddressStep::Finished {
                    result: LocationResult::Granted(coords, Some(address("somewhere"))),
                    error: None,
                };
                proptest::prop_assert_eq!(step, expected);
            } else {
                proptest::prop_assert_eq!(step, AddressStep::Ignored);
            }
        }
    }
}
