//! Middleware modules for the Tally API
//!
//! - `admin`: bearer-token gate for `/api/admin/*`
//!
//! Observability middleware lives in `crate::telemetry::middleware`.

mod admin;

pub use admin::{admin_auth_middleware, AdminAuth};
