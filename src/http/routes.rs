//! Route collection at build time.
//!
//! # Responsibilities
//! - Collect routes contributed by extensions and the application
//! - Keep a method/path table for the `routes` command
//! - Turn conflicting registrations into build errors instead of panics

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{on, MethodFilter};
use axum::Router;

use crate::app::AppContext;

/// One registered method/path pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub method: Method,
    pub path: String,
}

/// Why a route was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RouteProblem {
    Duplicate(RouteEntry),
    InvalidPath(RouteEntry),
    UnsupportedMethod(RouteEntry),
    Conflict { route: String, reason: String },
}

/// Text of a panic raised by the router while inserting a route.
fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "route rejected by the router".to_string(),
        },
    }
}

/// Segments the router would refuse: `:id` and `*rest` are the old syntax.
fn legacy_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with(':') || segment.starts_with('*'))
}

/// Router under construction, plus its route table.
pub struct Routes {
    router: Router<AppContext>,
    entries: Vec<RouteEntry>,
    problems: Vec<RouteProblem>,
}

impl Default for Routes {
    fn default() -> Self {
        Self::new()
    }
}

impl Routes {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            entries: Vec::new(),
            problems: Vec::new(),
        }
    }

    /// Add a handler for one method and path.
    pub fn route<H, T>(&mut self, method: Method, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, AppContext>,
        T: 'static,
    {
        let entry = RouteEntry {
            method: method.clone(),
            path: path.to_string(),
        };

        if !path.starts_with('/') || legacy_segment(path) {
            self.problems.push(RouteProblem::InvalidPath(entry));
            return self;
        }
        if self.entries.contains(&entry) {
            self.problems.push(RouteProblem::Duplicate(entry));
            return self;
        }
        let Ok(filter) = MethodFilter::try_from(method) else {
            self.problems.push(RouteProblem::UnsupportedMethod(entry));
            return self;
        };

        // The router panics on overlapping captures; keep the last good one.
        let candidate = self.router.clone();
        match panic::catch_unwind(AssertUnwindSafe(move || candidate.route(path, on(filter, handler)))) {
            Ok(router) => {
                self.router = router;
                self.entries.push(entry);
            }
            Err(payload) => self.problems.push(RouteProblem::Conflict {
                route: format!("{} {}", entry.method, entry.path),
                reason: panic_reason(payload),
            }),
        }
        self
    }

    pub fn get<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, AppContext>,
        T: 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, AppContext>,
        T: 'static,
    {
        self.route(Method::POST, path, handler)
    }

    pub fn put<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, AppContext>,
        T: 'static,
    {
        self.route(Method::PUT, path, handler)
    }

    pub fn patch<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, AppContext>,
        T: 'static,
    {
        self.route(Method::PATCH, path, handler)
    }

    pub fn delete<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, AppContext>,
        T: 'static,
    {
        self.route(Method::DELETE, path, handler)
    }

    /// Merge a ready-made router. Its routes do not appear in the table.
    pub fn merge(&mut self, other: Router<AppContext>) -> &mut Self {
        let candidate = self.router.clone();
        match panic::catch_unwind(AssertUnwindSafe(move || candidate.merge(other))) {
            Ok(router) => self.router = router,
            Err(payload) => self.problems.push(RouteProblem::Conflict {
                route: "merged router".to_string(),
                reason: panic_reason(payload),
            }),
        }
        self
    }

    /// Routes registered so far, in registration order.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub(crate) fn into_parts(self) -> (Router<AppContext>, Vec<RouteEntry>, Vec<RouteProblem>) {
        (self.router, self.entries, self.problems)
    }
}
