//! Route definitions for the warden web server
//!
//! Every route is declared once together with the controller/action it
//! belongs to, so the axum router and the [`RouteTable`] cannot drift apart.

use crate::{handlers, AppState};
use axum::{
    http::Method,
    routing::{delete, get, post, MethodRouter},
    Router,
};
use std::collections::HashMap;
use warden_core::RouteTarget;

/// Maps `(method, matched path)` to the controller/action it dispatches to
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<(Method, String), RouteTarget>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, method: Method, path: &str, target: RouteTarget) {
        self.routes.insert((method, path.to_string()), target);
    }

    /// Builder-style [`RouteTable::insert`]
    pub fn with_route(mut self, method: Method, path: &str, controller: &str, action: &str) -> Self {
        self.insert(method, path, RouteTarget::new(controller, action));
        self
    }

    /// HEAD falls back to the GET route, as axum dispatches it
    pub fn resolve(&self, method: &Method, path: &str) -> Option<&RouteTarget> {
        self.routes
            .get(&(method.clone(), path.to_string()))
            .or_else(|| {
                (method == Method::HEAD)
                    .then(|| self.routes.get(&(Method::GET, path.to_string())))
                    .flatten()
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

struct Endpoint {
    method: Method,
    path: &'static str,
    controller: &'static str,
    action: &'static str,
    handler: MethodRouter<AppState>,
}

fn endpoints() -> [Endpoint; 5] {
    [
        Endpoint {
            method: Method::GET,
            path: "/api/health",
            controller: "system",
            action: "health",
            handler: get(handlers::health_check),
        },
        Endpoint {
            method: Method::GET,
            path: "/api/session",
            controller: "session",
            action: "current",
            handler: get(handlers::current_session),
        },
        Endpoint {
            method: Method::POST,
            path: "/api/session",
            controller: "session",
            action: "sign_in",
            handler: post(handlers::sign_in),
        },
        Endpoint {
            method: Method::DELETE,
            path: "/api/session",
            controller: "session",
            action: "sign_out",
            handler: delete(handlers::sign_out),
        },
        Endpoint {
            method: Method::GET,
            path: "/api/admin/policies",
            controller: "admin",
            action: "policies",
            handler: get(handlers::list_policies),
        },
    ]
}

/// Route table for [`api_routes`]
pub fn api_route_table() -> RouteTable {
    endpoints()
        .into_iter()
        .fold(RouteTable::new(), |table, endpoint| {
            table.with_route(
                endpoint.method,
                endpoint.path,
                endpoint.controller,
                endpoint.action,
            )
        })
}

/// Create API routes
///
/// Methods sharing a path are merged into one method router by axum.
pub fn api_routes() -> Router<AppState> {
    endpoints()
        .into_iter()
        .fold(Router::new(), |router, endpoint| {
            router.route(endpoint.path, endpoint.handler)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_table_resolves_by_method() {
        let table = api_route_table();
        assert_eq!(table.len(), 5);

        assert_eq!(
            table.resolve(&Method::POST, "/api/session"),
            Some(&RouteTarget::new("session", "sign_in"))
        );
        assert_eq!(
            table.resolve(&Method::DELETE, "/api/session"),
            Some(&RouteTarget::new("session", "sign_out"))
        );
        assert!(table.resolve(&Method::PUT, "/api/session").is_none());
        assert_eq!(
            table.resolve(&Method::HEAD, "/api/health"),
            Some(&RouteTarget::new("system", "health"))
        );
        assert!(table.resolve(&Method::GET, "/api/unknown").is_none());
    }

    #[test]
    fn test_admin_route_belongs_to_admin_controller() {
        let table = api_route_table();
        assert_eq!(
            table.resolve(&Method::GET, "/api/admin/policies"),
            Some(&RouteTarget::new("admin", "policies"))
        );
    }
}
