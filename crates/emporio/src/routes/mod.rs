//! HTTP routes.
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | GET | `/ping` | `ping` |
//! | GET | `/health`, `/v1/health` | `health` |
//! | GET | `/items`, `/api/v1/items` | `listItems` |
//! | GET | `/items/{item_id}`, `/api/v1/items/{item_id}` | `getItem` |
//! | GET | `/items/{item_id}/details`, `/api/v1/items/{item_id}/details` | `getItemDetails` |
//! | POST | `/v1/user/account/signup` | `signup` |
//! | GET | `/v1/personal-travel-calendar/default-ocassions` | `defaultOcassions` |
//! | GET | `/v1/personal-travel-calendar/default-breaks` | `defaultBreaks` |

use std::sync::Arc;

use emporio_datastore::SessionManager;
use emporio_server::{HandlerRegistry, Router};
use http::Method;

pub mod calendar;
pub mod items;
pub mod ops;
pub mod user;

/// Shared state handed to handlers that need more than the request scope.
#[derive(Debug, Clone)]
pub struct AppState {
    session_manager: Arc<SessionManager>,
}

impl AppState {
    /// Wraps the session manager.
    #[must_use]
    pub fn new(session_manager: Arc<SessionManager>) -> Self {
        Self { session_manager }
    }

    /// The process-wide session manager.
    #[must_use]
    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }
}

fn routes() -> [(Method, &'static str, &'static str); 12] {
    [
        (Method::GET, "/ping", "ping"),
        (Method::GET, "/health", "health"),
        (Method::GET, "/v1/health", "health"),
        (Method::GET, "/items", "listItems"),
        (Method::GET, "/items/{item_id}", "getItem"),
        (Method::GET, "/items/{item_id}/details", "getItemDetails"),
        (Method::GET, "/api/v1/items", "listItems"),
        (Method::GET, "/api/v1/items/{item_id}", "getItem"),
        (Method::GET, "/api/v1/items/{item_id}/details", "getItemDetails"),
        (Method::POST, "/v1/user/account/signup", "signup"),
        (
            Method::GET,
            "/v1/personal-travel-calendar/default-ocassions",
            "defaultOcassions",
        ),
        (
            Method::GET,
            "/v1/personal-travel-calendar/default-breaks",
            "defaultBreaks",
        ),
    ]
}

/// The routing table.
#[must_use]
pub fn router() -> Router {
    let mut router = Router::new();
    for (method, pattern, operation_id) in routes() {
        router.add_route(method, pattern, operation_id);
    }
    router
}

/// Handlers for every operation in [`router`].
#[must_use]
pub fn handlers(state: &AppState) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();

    handlers.register_raw("ping", |_ctx, _body| ops::ping());
    let health_state = state.clone();
    handlers.register_no_body("health", move |_ctx| {
        let state = health_state.clone();
        async move { ops::health(&state).await }
    });

    handlers.register_no_body("listItems", items::list_items);
    handlers.register_no_body("getItem", items::get_item);
    handlers.register_no_body("getItemDetails", items::get_item_details);

    handlers.register("signup", user::signup);

    handlers.register_no_body("defaultOcassions", calendar::default_ocassions);
    handlers.register_no_body("defaultBreaks", calendar::default_breaks);

    handlers
}
