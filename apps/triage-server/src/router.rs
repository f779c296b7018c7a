use std::sync::Arc;

use axum::middleware;
use axum::routing::post;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;

use crate::{api, capture, interceptor, Diagnostics};

/// Mount the analysis endpoint on `router` and wrap everything in the
/// interceptor. Panics are converted to error pages inside the interceptor,
/// so they get the widget like any other failure.
pub fn attach<S>(router: Router<S>, diag: Arc<Diagnostics>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let endpoint = diag.config().endpoint_path.clone();
    router
        .route(&endpoint, post(api::analyze::analyze).with_state(diag.clone()))
        .layer(CatchPanicLayer::custom(capture::panic_response))
        .layer(middleware::from_fn_with_state(diag, interceptor::intercept_mw))
}
