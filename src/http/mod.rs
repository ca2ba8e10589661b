//! HTTP surface of the application.
//!
//! # Data Flow
//! ```text
//! Request
//!     → middleware/ (request ID, span and access log, error rendering)
//!     → routes.rs (routes contributed by extensions and the app)
//!     → accessors.rs (services, settings, state for handlers)
//!     → error.rs (AppError → JSON body)
//! Response
//! ```

pub mod accessors;
pub mod error;
pub mod middleware;
pub mod request;
pub mod routes;

pub use accessors::{AppSettings, RequestId, Services, SharedState, Svc};
pub use error::{AppError, ErrorDetails, ErrorResponse};
pub use middleware::Middleware;
pub use request::{ShortRequestId, MISSING_REQUEST_ID};
pub use routes::{RouteEntry, Routes};
