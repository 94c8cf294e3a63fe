pub mod handlers;
pub mod pixels;
pub mod routes;

pub use routes::create_api_router;
