//! The idempotency middleware.
//!
//! ```text
//! no key header / no actor / no scope -> handler, engine untouched
//! Replay(data)                        -> stored response, handler skipped
//! Reject(_)                           -> conflict response, handler skipped
//! Execute                             -> handler, then complete or release
//! store failure                       -> 503
//! ```
//!
//! A client disconnect drops the whole future. The claim runs on its own task
//! and the Execute section holds a [`idem_core::ReleaseGuard`], so an
//! abandoned slot is released in the background instead of blocking the key
//! until it expires.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::{FutureExt, StreamExt, stream};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use idem_core::{
    CancelSignal, IdempotencyDecision, IdempotencyRequest, IdempotencyService, ReleaseGuard,
};

use crate::error::WebError;
use crate::fingerprint::{BodySha256, Fingerprinter, fingerprinter_for};
use crate::options::{IdempotencyOptions, WebConfig};
use crate::resolve::{ActorResolver, AnonymousActor, HeaderActor, PathScope, ScopeResolver};
use crate::snapshot;

/// Shared state for [`idempotency_middleware`]. Cheap to clone.
#[derive(Clone)]
pub struct IdempotencyState {
    service: IdempotencyService,
    options: Arc<IdempotencyOptions>,
    actor: Arc<dyn ActorResolver>,
    scope: Arc<dyn ScopeResolver>,
    fingerprinter: Arc<dyn Fingerprinter>,
}

impl std::fmt::Debug for IdempotencyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyState")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl IdempotencyState {
    /// Anonymous actor, path scope and body SHA-256 fingerprint.
    #[must_use]
    pub fn new(service: IdempotencyService, options: IdempotencyOptions) -> Self {
        Self {
            service,
            options: Arc::new(options),
            actor: Arc::new(AnonymousActor),
            scope: Arc::new(PathScope),
            fingerprinter: Arc::new(BodySha256),
        }
    }

    /// Build the state from the `[web]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::InvalidConfig`] if the options or the actor header
    /// name do not parse.
    pub fn from_config(service: IdempotencyService, config: &WebConfig) -> Result<Self, WebError> {
        let options = IdempotencyOptions::from_config(config)?;
        let mut state = Self::new(service, options);
        state.fingerprinter = fingerprinter_for(config.fingerprint);

        let actor_header = config.actor_header.trim();
        if !actor_header.is_empty() {
            let name = HeaderName::try_from(actor_header).map_err(|_| {
                WebError::invalid_config(format!("invalid actor header '{actor_header}'"))
            })?;
            state.actor = Arc::new(HeaderActor::new(name));
        }
        Ok(state)
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl ActorResolver + 'static) -> Self {
        self.actor = Arc::new(actor);
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl ScopeResolver + 'static) -> Self {
        self.scope = Arc::new(scope);
        self
    }

    #[must_use]
    pub fn with_fingerprinter(mut self, fingerprinter: impl Fingerprinter + 'static) -> Self {
        self.fingerprinter = Arc::new(fingerprinter);
        self
    }

    #[must_use]
    pub fn options(&self) -> &IdempotencyOptions {
        &self.options
    }

    #[must_use]
    pub const fn service(&self) -> &IdempotencyService {
        &self.service
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`.
///
/// # Errors
///
/// Returns a [`WebError`], rendered as a response, if the store fails or a
/// body cannot be buffered.
pub async fn idempotency_middleware(
    State(state): State<IdempotencyState>,
    request: Request,
    next: Next,
) -> Result<Response, WebError> {
    let Some(key) = idempotency_key(request.headers(), &state.options.header_name) else {
        return Ok(next.run(request).await);
    };

    let (parts, body) = request.into_parts();

    let Some(actor_id) = non_blank(state.actor.resolve_actor(&parts)) else {
        tracing::warn!(path = %parts.uri.path(), "Idempotency key sent but no actor resolved; bypassing");
        return Ok(next.run(Request::from_parts(parts, body)).await);
    };
    let Some(scope) = non_blank(state.scope.resolve_scope(&parts)) else {
        tracing::warn!(path = %parts.uri.path(), "Idempotency key sent but no scope resolved; bypassing");
        return Ok(next.run(Request::from_parts(parts, body)).await);
    };

    let (fingerprint, body) = if state.fingerprinter.reads_body() {
        let bytes = buffer_request_body(body, state.options.max_body_bytes).await?;
        (state.fingerprinter.fingerprint(&bytes), Body::from(bytes))
    } else {
        (state.fingerprinter.fingerprint(&[]), body)
    };

    let idem_request = IdempotencyRequest::from_parts(actor_id, scope, key, fingerprint)?;

    match state.service.decide_detached(&idem_request).await? {
        IdempotencyDecision::Replay(data) => {
            tracing::debug!(key = %idem_request.key, "Replaying stored response");
            Ok(snapshot::replay(&data))
        }
        IdempotencyDecision::Reject(reason) => {
            tracing::debug!(key = %idem_request.key, reason = %reason, "Rejecting idempotent request");
            Ok(conflict_response(&state.options))
        }
        IdempotencyDecision::Execute => {
            // Armed before the next await: a disconnect from here on releases.
            let guard = state.service.release_guard(&idem_request);
            execute(&state, &idem_request, guard, Request::from_parts(parts, body), next).await
        }
    }
}

/// Run the handler as owner of the key, then complete or release.
///
/// `guard` stays armed until the slot is settled.
async fn execute(
    state: &IdempotencyState,
    idem_request: &IdempotencyRequest,
    guard: ReleaseGuard,
    request: Request,
    next: Next,
) -> Result<Response, WebError> {
    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(key = %idem_request.key, "Handler panicked; releasing idempotency key");
            release_quietly(state, idem_request).await;
            guard.disarm();
            std::panic::resume_unwind(panic);
        }
    };

    let outcome = settle(state, idem_request, response).await;
    guard.disarm();
    outcome
}

/// Complete the slot with a retained response, or release it.
async fn settle(
    state: &IdempotencyState,
    idem_request: &IdempotencyRequest,
    response: Response,
) -> Result<Response, WebError> {
    if !state.options.should_retain(response.status()) {
        tracing::debug!(
            key = %idem_request.key,
            status = response.status().as_u16(),
            "Response not retained; releasing idempotency key"
        );
        release_quietly(state, idem_request).await;
        return Ok(response);
    }

    let (parts, body) = response.into_parts();
    let bytes = match buffer_response_body(body, state.options.max_body_bytes).await {
        Ok(ResponseBody::Buffered(bytes)) => bytes,
        Ok(ResponseBody::Oversized(body)) => {
            tracing::warn!(
                key = %idem_request.key,
                limit = state.options.max_body_bytes,
                "Response too large to store; releasing idempotency key"
            );
            release_quietly(state, idem_request).await;
            return Ok(Response::from_parts(parts, body));
        }
        Err(err) => {
            release_quietly(state, idem_request).await;
            return Err(err);
        }
    };

    match snapshot::capture(parts.status, &parts.headers, &bytes, &state.options) {
        Ok(data) => {
            if let Err(err) = state
                .service
                .complete(idem_request, &data, &CancelSignal::never())
                .await
            {
                release_quietly(state, idem_request).await;
                return Err(err.into());
            }
        }
        Err(_) => {
            tracing::warn!(key = %idem_request.key, "Response body is not UTF-8; releasing idempotency key");
            release_quietly(state, idem_request).await;
        }
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}

/// Release after the handler ran. The handler's outcome is what the client
/// gets, so a failure here is only logged; the key stays blocked until it
/// expires.
async fn release_quietly(state: &IdempotencyState, idem_request: &IdempotencyRequest) {
    if let Err(err) = state
        .service
        .release(idem_request, &CancelSignal::never())
        .await
    {
        tracing::error!(key = %idem_request.key, error = %err, "Failed to release idempotency key");
    }
}

/// A handler body after an attempt to buffer it for capture.
enum ResponseBody {
    /// The whole body, within the limit.
    Buffered(Bytes),
    /// Over the limit: the frames read so far followed by the unread rest.
    Oversized(Body),
}

/// Read `body` frame by frame, stopping as soon as `limit` would be exceeded.
///
/// Trailers are dropped; snapshots only hold data.
async fn buffer_response_body(mut body: Body, limit: usize) -> Result<ResponseBody, WebError> {
    let mut buffered: Vec<u8> = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|err| WebError::response_body(err.to_string()))?;
        let Ok(data) = frame.into_data() else {
            continue;
        };
        if buffered.len().saturating_add(data.len()) > limit {
            let head = stream::iter([Ok::<_, axum::Error>(Bytes::from(buffered)), Ok(data)]);
            return Ok(ResponseBody::Oversized(Body::from_stream(
                head.chain(body.into_data_stream()),
            )));
        }
        buffered.extend_from_slice(&data);
    }
    Ok(ResponseBody::Buffered(Bytes::from(buffered)))
}

fn idempotency_key(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

async fn buffer_request_body(body: Body, limit: usize) -> Result<Bytes, WebError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(WebError::PayloadTooLarge { limit })
        }
        Err(err) => Err(WebError::request_body(err.to_string())),
    }
}

fn conflict_response(options: &IdempotencyOptions) -> Response {
    (
        options.conflict_status,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        options.conflict_message.clone(),
    )
        .into_response()
}
