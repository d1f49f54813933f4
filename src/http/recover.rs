//! Panic containment for everything inside the observer.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;

use crate::error::GuardError;
use crate::http::context::RequestContext;
use crate::observability::metrics;

/// Middleware function turning a panic anywhere inside it into a generic 500.
///
/// The panic message and path go to the log under the request's correlation
/// id; the client only sees the status.
pub async fn recover_middleware(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.correlation_id().to_owned())
        .unwrap_or_default();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            tracing::error!(
                request_id = %request_id,
                path = %path,
                panic = %panic_message(payload.as_ref()),
                "Recovered from panic in request handler"
            );
            metrics::record_panic();
            GuardError::UnrecoverableHandlerFailure.into_response()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
