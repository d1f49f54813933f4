//! Minimal page handlers the pipeline wraps.
//!
//! Real page rendering lives in the application; these exist so the binary
//! serves something and so the pipeline can be exercised end to end.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::auth::gate::clear_session_cookie;
use crate::auth::{AuthError, SessionGate};
use crate::http::context::RequestContext;

/// State shared by the page handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<SessionGate>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn index(ctx: RequestContext) -> Html<String> {
    Html(page(
        &ctx,
        "Home",
        "<h1>Posts &amp; bookmarks</h1><p>Nothing here yet.</p>",
    ))
}

pub async fn login_form(State(state): State<AppState>, ctx: RequestContext) -> Html<String> {
    Html(page(&ctx, "Sign in", &login_body(&ctx, state.gate.login_path(), None)))
}

pub async fn login_submit(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.gate.auth().sign_in(&form.username, &form.password).await {
        Ok(session) => {
            tracing::info!(user_id = session.user_id, request_id = %ctx.correlation_id(), "Signed in");
            let mut response = Redirect::to("/admin").into_response();
            let cookie = state.gate.session_cookie(&session).to_string();
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            response
        }
        Err(AuthError::Backend(reason)) => {
            tracing::error!(error = %reason, request_id = %ctx.correlation_id(), "Sign-in backend failure");
            (StatusCode::SERVICE_UNAVAILABLE, "Sign-in unavailable").into_response()
        }
        Err(_) => {
            let body = login_body(
                &ctx,
                state.gate.login_path(),
                Some("Wrong username or password."),
            );
            (StatusCode::UNAUTHORIZED, Html(page(&ctx, "Sign in", &body))).into_response()
        }
    }
}

pub async fn dashboard(ctx: RequestContext) -> Response {
    let Some(user) = ctx.user() else {
        tracing::error!(request_id = %ctx.correlation_id(), "Dashboard reached without a user");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let body = format!(
        "<h1>Admin</h1><p>Signed in as {}.</p>\
         <form method=\"post\" action=\"/admin/logout\">\
         <input type=\"hidden\" name=\"csrf_token\" value=\"{}\">\
         <button>Sign out</button></form>",
        escape_html(&user.username),
        escape_html(ctx.csrf_token().unwrap_or_default()),
    );
    Html(page(&ctx, "Admin", &body)).into_response()
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let jar = CookieJar::from_headers(&headers);
    if let Some(cookie) = jar.get(state.gate.cookie_name()) {
        if let Err(err) = state.gate.auth().sign_out(cookie.value()).await {
            tracing::warn!(error = %err, "Sign-out failed");
        }
    }

    let mut response = Redirect::to("/").into_response();
    let clear = clear_session_cookie(state.gate.cookie_name()).to_string();
    if let Ok(value) = HeaderValue::from_str(&clear) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

fn login_body(ctx: &RequestContext, action: &str, error: Option<&str>) -> String {
    let error = error
        .map(|e| format!("<p class=\"error\">{}</p>", escape_html(e)))
        .unwrap_or_default();
    format!(
        "<h1>Sign in</h1>{error}\
         <form method=\"post\" action=\"{}\">\
         <input type=\"hidden\" name=\"csrf_token\" value=\"{}\">\
         <label>Username <input name=\"username\" autocomplete=\"username\"></label>\
         <label>Password <input name=\"password\" type=\"password\" autocomplete=\"current-password\"></label>\
         <button>Sign in</button></form>",
        escape_html(action),
        escape_html(ctx.csrf_token().unwrap_or_default()),
    )
}

fn page(ctx: &RequestContext, title: &str, body: &str) -> String {
    let nonce = escape_html(ctx.csp_nonce().unwrap_or_default());
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{}</title>\
         <script nonce=\"{nonce}\">document.documentElement.dataset.js = \"1\";</script>\
         </head><body>{body}</body></html>",
        escape_html(title),
    )
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
