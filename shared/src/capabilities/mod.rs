mod geolocation;
mod http;
mod timer;

pub use self::geolocation::{
    Geolocation, GeolocationError, GeolocationOperation, GeolocationResult, Position,
    PositionOptions, DEFAULT_POSITION_TIMEOUT_MS,
};
pub use self::http::{
    HttpError, ValidatedUrl, CONTENT_TYPE_JSON, HEADER_ACCEPT, HEADER_ACCEPT_LANGUAGE,
    HEADER_CONTENT_TYPE, HEADER_IDEMPOTENCY_KEY, HEADER_USER_AGENT,
};
pub use self::timer::{Elapsed, Timer, TimerOperation};

// Crux's built-in Render is enough for view updates.
pub use crux_core::render::Render;
pub use crux_http::Http;

use crate::event::Event;
use crate::App;

pub type AppHttp = Http<Event>;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub render: Render<Event>,
    pub geolocation: Geolocation<Event>,
    pub timer: Timer<Event>,
}
