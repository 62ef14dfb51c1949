//! Blueprint Mock Server
//!
//! Serves a mock HTTP API straight from API Blueprint descriptions, so a
//! client can be exercised against canned traffic before the real API exists.
//!
//! # Features
//!
//! - **Described Routes**: One route per URI template, method, and example
//! - **Interactive Selection**: When an example has several responses, a
//!   connected control client picks which one each request receives
//! - **Happy Path Mode**: Always serve the first response, no control traffic
//! - **CORS Preflight**: Automatic `OPTIONS` answers for described resources
//! - **Model References**: `[Model][]` bodies are replaced by the resource model
//!
//! # Control Protocol
//!
//! The control client connects to `/ws` (WebSocket) and receives one question
//! at a time:
//!
//! ```json
//! {"id": 1, "method": "GET", "uri": "/widgets/1", "default": "200",
//!  "answers": {"200": "{\"ok\":true}", "404": "{\"err\":true}"}}
//! ```
//!
//! It replies with the name of a response (`404`) or with
//! `{"id": 1, "answer": "404"}`. Anything that names no response selects the
//! default. Unanswered questions fall back to the default after
//! `answer_timeout_ms` and are withdrawn with `{"id": 1, "expired": true}`.

pub mod config;
pub mod error;
pub mod loader;
pub mod matcher;
pub mod model;
pub mod resolver;
pub mod routes;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use error::LoadError;
pub use server::MockServer;
pub use session::InteractiveSession;
