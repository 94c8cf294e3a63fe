//! Pixel-open and link-click capture

pub mod engine;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod sanitize;

pub use engine::{ClickRequest, OpenRequest, TrackingEngine};
pub use response::{PixelResponse, RedirectResponse};
pub use routes::create_tracking_router;
