pub mod auth;
pub mod limiter;
pub mod routes;
pub mod sse;
