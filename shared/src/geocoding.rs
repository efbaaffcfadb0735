//! Reverse geocoding: coordinates in, best-effort postal address out.
//!
//! The lookup is a single GET against a Nominatim-compatible endpoint issued
//! through the shell's HTTP capability. Nothing is cached and nothing is
//! retried. Missing address components never fail a lookup; only a reply
//! without a top-level `display_name` does.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::capabilities::{
    AppHttp, HttpError, ValidatedUrl, CONTENT_TYPE_JSON, HEADER_ACCEPT, HEADER_ACCEPT_LANGUAGE,
    HEADER_USER_AGENT,
};
use crate::config::GeocoderConfig;
use crate::event::Event;
use crate::model::{Coordinates, ResolvedAddress};

pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionError {
    #[error("could not build geocoding request: {0}")]
    InvalidRequest(String),
    #[error("geocoding service unreachable: {0}")]
    Transport(String),
    #[error("geocoding service rate limited the request")]
    RateLimited,
    #[error("geocoding service returned HTTP {0}")]
    Status(u16),
    #[error("geocoding reply was not valid JSON: {0}")]
    Malformed(String),
    #[error("geocoding reply has no display name")]
    MissingDisplayName,
    #[error("geocoding service did not answer in time")]
    Timeout,
}

impl ResolutionError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "GEOCODE_INVALID_REQUEST",
            Self::Transport(_) => "GEOCODE_NETWORK",
            Self::RateLimited => "GEOCODE_RATE_LIMITED",
            Self::Status(_) => "GEOCODE_HTTP_STATUS",
            Self::Malformed(_) => "GEOCODE_MALFORMED",
            Self::MissingDisplayName => "GEOCODE_NO_RESULT",
            Self::Timeout => "GEOCODE_TIMEOUT",
        }
    }
}

/// The subset of a Nominatim reverse reply we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReverseGeocodeReply {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: Option<ReplyAddress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyAddress {
    #[serde(default)]
    pub road: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseGeocodeRequest {
    pub url: String,
    pub host: String,
    pub accept_language: String,
    pub client_id: String,
}

impl ReverseGeocodeRequest {
    pub fn new(config: &GeocoderConfig, coordinates: Coordinates) -> Result<Self, ResolutionError> {
        let invalid = |e: HttpError| ResolutionError::InvalidRequest(e.to_string());
        let endpoint = ValidatedUrl::new(config.endpoint.as_str()).map_err(invalid)?;
        let mut url = endpoint.to_url().map_err(invalid)?;

        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("lat", &coordinates.latitude().to_string())
            .append_pair("lon", &coordinates.longitude().to_string())
            .append_pair("addressdetails", "1")
            .append_pair("accept-language", &config.language);

        Ok(Self {
            url: url.into(),
            host: endpoint.host().to_owned(),
            accept_language: config.accept_language.clone(),
            client_id: config.client_id.clone(),
        })
    }
}

/// Issues the lookup; `callback` receives the classified outcome.
///
/// Fails synchronously only when the request cannot be built, in which case
/// no effect is emitted.
pub fn resolve<F>(
    http: &AppHttp,
    config: &GeocoderConfig,
    coordinates: Coordinates,
    callback: F,
) -> Result<(), ResolutionError>
where
    F: FnOnce(Result<ResolvedAddress, ResolutionError>) -> Event + Send + 'static,
{
    let request = ReverseGeocodeRequest::new(config, coordinates)?;
    debug!(host = %request.host, url = %request.url, "reverse geocoding");

    http.get(&request.url)
        .header(HEADER_ACCEPT, CONTENT_TYPE_JSON)
        .header(HEADER_ACCEPT_LANGUAGE, request.accept_language.as_str())
        .header(HEADER_USER_AGENT, request.client_id.as_str())
        .send(move |result| callback(classify(result)));

    Ok(())
}

fn classify(
    result: crux_http::Result<crux_http::Response<Vec<u8>>>,
) -> Result<ResolvedAddress, ResolutionError> {
    match result {
        Ok(mut response) => {
            let status: u16 = response.status().into();
            let body = response.take_body().unwrap_or_default();
            parse_reply(status, &body)
        }
        // crux_http reports 4xx and 5xx as errors; the status still decides.
        Err(crux_http::Error::Http(e)) => {
            parse_reply(e.code.into(), e.body.as_deref().unwrap_or_default())
        }
        Err(crux_http::Error::Timeout) => Err(ResolutionError::Timeout),
        Err(e) => Err(ResolutionError::Transport(e.to_string())),
    }
}

/// Classifies a raw HTTP reply into an address or a typed failure.
pub fn parse_reply(status: u16, body: &[u8]) -> Result<ResolvedAddress, ResolutionError> {
    if status == STATUS_TOO_MANY_REQUESTS {
        return Err(ResolutionError::RateLimited);
    }
    if !(200..300).contains(&status) {
        return Err(ResolutionError::Status(status));
    }

    let reply: ReverseGeocodeReply =
        serde_json::from_slice(body).map_err(|e| ResolutionError::Malformed(e.to_string()))?;

    extract_address(&reply)
}

pub fn extract_address(reply: &ReverseGeocodeReply) -> Result<ResolvedAddress, ResolutionError> {
    let display_name = reply
        .display_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .ok_or(ResolutionError::MissingDisplayName)?;

    let address_line1 = display_name
        .split(',')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    let Some(parts) = reply.address.as_ref() else {
        return Ok(ResolvedAddress {
            address_line1,
            ..ResolvedAddress::default()
        });
    };

    Ok(ResolvedAddress {
        address_line1,
        street: first_present(&[&parts.road, &parts.street]),
        city: first_present(&[&parts.city, &parts.town, &parts.village]),
        state: first_present(&[&parts.state]),
        zipcode: first_present(&[&parts.postcode]),
    })
}

fn first_present(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SF_REPLY: &str = r#"{
        "place_id": 1,
        "display_name": "123 Main St, Main St, San Francisco, California, 94103, United States",
        "address": {
            "house_number": "123",
            "road": "Main St",
            "city": "San Francisco",
            "state": "CA",
            "postcode": "94103",
            "country": "United States"
        }
    }"#;

    fn sf() -> Coordinates {
        Coordinates::new(37.7749, -122.4194).unwrap()
    }

    #[test]
    fn extracts_all_fields() {
        let address = parse_reply(200, SF_REPLY.as_bytes()).unwrap();
        assert_eq!(
            address,
            ResolvedAddress {
                address_line1: "123 Main St".into(),
                street: "Main St".into(),
                city: "San Francisco".into(),
                state: "CA".into(),
                zipcode: "94103".into(),
            }
        );
    }

    #[test]
    fn street_falls_back_to_generic_field() {
        let body = r#"{"display_name":"X","address":{"street":"Harbor Way"}}"#;
        let address = parse_reply(200, body.as_bytes()).unwrap();
        assert_eq!(address.street, "Harbor Way");
    }

    #[test]
    fn city_falls_back_to_town_then_village() {
        let town = r#"{"display_name":"X","address":{"town":"Barstow","village":"Daggett"}}"#;
        assert_eq!(parse_reply(200, town.as_bytes()).unwrap().city, "Barstow");

        let village = r#"{"display_name":"X","address":{"village":"Daggett"}}"#;
        assert_eq!(parse_reply(200, village.as_bytes()).unwrap().city, "Daggett");
    }

    #[test]
    fn missing_sub_fields_are_empty_not_errors() {
        let body = r#"{"display_name":"Somewhere on I-40"}"#;
        let address = parse_reply(200, body.as_bytes()).unwrap();
        assert_eq!(address.address_line1, "Somewhere on I-40");
        assert_eq!(address.street, "");
        assert_eq!(address.city, "");
        assert_eq!(address.state, "");
        assert_eq!(address.zipcode, "");
    }

    #[test]
    fn missing_display_name_fails() {
        let body = r#"{"error":"Unable to geocode"}"#;
        assert_eq!(
            parse_reply(200, body.as_bytes()),
            Err(ResolutionError::MissingDisplayName)
        );
        let blank = r#"{"display_name":"  ","address":{"road":"Main St"}}"#;
        assert_eq!(
            parse_reply(200, blank.as_bytes()),
            Err(ResolutionError::MissingDisplayName)
        );
    }

    #[test]
    fn malformed_json_fails() {
        assert!(matches!(
            parse_reply(200, b"<html>busy</html>"),
            Err(ResolutionError::Malformed(_))
        ));
    }

    #[test]
    fn non_success_status_fails() {
        assert_eq!(parse_reply(503, b""), Err(ResolutionError::Status(503)));
        assert_eq!(
            parse_reply(STATUS_TOO_MANY_REQUESTS, SF_REPLY.as_bytes()),
            Err(ResolutionError::RateLimited)
        );
    }

    #[test]
    fn request_carries_coordinates_and_language() {
        let request = ReverseGeocodeRequest::new(&GeocoderConfig::default(), sf()).unwrap();
        assert!(request
            .url
            .starts_with("https://nominatim.openstreetmap.org/reverse?"));
        assert!(request.url.contains("format=json"));
        assert!(request.url.contains("lat=37.7749"));
        assert!(request.url.contains("lon=-122.4194"));
        assert!(request.url.contains("addressdetails=1"));
        assert!(request.url.contains("accept-language=en"));
        assert_eq!(request.accept_language, "en-US,en;q=0.9");
        assert_eq!(request.host, "nominatim.openstreetmap.org");
    }

    #[test]
    fn transport_failures_are_classified() {
        assert_eq!(
            classify(Err(crux_http::Error::Timeout)),
            Err(ResolutionError::Timeout)
        );
        assert_eq!(
            classify(Err(crux_http::Error::Io("offline".into()))),
            Err(ResolutionError::Transport("IO error: offline".into()))
        );
    }

    #[test]
    fn request_rejects_bad_endpoint() {
        let config = GeocoderConfig {
            endpoint: "not a url".into(),
            ..GeocoderConfig::default()
        };
        assert!(matches!(
            ReverseGeocodeRequest::new(&config, sf()),
            Err(ResolutionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn codes_are_distinct() {
        let errors = [
            ResolutionError::InvalidRequest(String::new()),
            ResolutionError::Transport(String::new()),
            ResolutionError::RateLimited,
            ResolutionError::Status(500),
            ResolutionError::Malformed(String::new()),
            ResolutionError::MissingDisplayName,
            ResolutionError::Timeout,
        ];
        let mut codes: Vec<_> = errors.iter().map(ResolutionError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
