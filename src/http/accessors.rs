//! Extractors that give handlers access to services, settings and state.
//!
//! ```rust,no_run
//! use cuneus::http::{AppError, Services, Svc, SharedState};
//!
//! struct Database;
//!
//! async fn handler(
//!     Svc(db): Svc<Database>,
//!     SharedState(state): SharedState,
//! ) -> Result<String, AppError> {
//!     let url = state.get::<String>("db_url")?;
//!     Ok(url.to_string())
//! }
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde_json::json;

use crate::app::AppContext;
use crate::config::Settings;
use crate::http::error::AppError;
use crate::http::request::{request_id_of, MISSING_REQUEST_ID};
use crate::lifecycle::LifespanState;
use crate::registry::{Container, RegistryError};

/// A service resolved from the registry.
#[derive(Debug)]
pub struct Svc<T>(pub Arc<T>);

impl<T> std::ops::Deref for Svc<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> FromRequestParts<AppContext> for Svc<T>
where
    T: Send + Sync + 'static,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let container = request_container(parts, state);
        match container.get::<T>().await {
            Ok(service) => Ok(Svc(service)),
            Err(err) => Err(resolution_error(err, state.settings().debug)),
        }
    }
}

/// The request's resolution scope. Every extractor in one request shares it.
#[derive(Debug, Clone)]
pub struct Services(pub Container);

impl FromRequestParts<AppContext> for Services {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        Ok(Services(request_container(parts, state)))
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct AppSettings(pub Arc<Settings>);

impl FromRequestParts<AppContext> for AppSettings {
    type Rejection = Infallible;

    async fn from_request_parts(_parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        Ok(AppSettings(state.settings().clone()))
    }
}

/// Request ID set by the request-id middleware, or `-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestId(
            request_id_of(&parts.extensions).unwrap_or_else(|| MISSING_REQUEST_ID.to_string()),
        ))
    }
}

/// Lifespan state published by the running application.
#[derive(Debug, Clone)]
pub struct SharedState(pub Arc<LifespanState>);

impl FromRequestParts<AppContext> for SharedState {
    type Rejection = Infallible;

    async fn from_request_parts(_parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        Ok(SharedState(state.lifespan_state()))
    }
}

fn request_container(parts: &mut Parts, state: &AppContext) -> Container {
    if let Some(container) = parts.extensions.get::<Container>() {
        return container.clone();
    }
    let container = state.container();
    parts.extensions.insert(container.clone());
    container
}

fn resolution_error(err: RegistryError, debug: bool) -> AppError {
    let detail = if debug { Some(err.to_string()) } else { None };
    let error = AppError::from(err);
    match detail {
        Some(message) => error.with_details(json!({ "message": message })),
        None => error,
    }
}
