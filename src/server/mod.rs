//! HTTP server exposing dream analysis and the stored diary.
//!
//! # Endpoints
//!
//! - `GET  /health`                     - Liveness check
//! - `POST /emotions/parse`             - Emotion-list parser
//! - `POST /dreams`                     - Analyse and store a dream
//! - `GET  /users/:telegram_id/dreams`  - A user's dreams
//! - `GET  /dreams/:id/classifications` - A dream's emotions

pub mod routes;

pub use routes::{app_router, AppState};
