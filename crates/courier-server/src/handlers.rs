//! Request handlers for email submission, the long task and status polling.

use crate::error::{ApiError, Result};
use crate::response::{accepted, json, Response};
use crate::router::Route;
use crate::state::AppState;
use bytes::Bytes;
use courier_jobs::jobs::{EmailData, NotificationJob, ProgressSimulationJob};
use http::{header, HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

/// Body of every notification sent from the form
pub const EMAIL_BODY: &str = "This is a test email sent from a background Courier task.";

/// `submit` value that sends right away
pub const SEND_NOW: &str = "Send";

/// Email form, posted as `application/x-www-form-urlencoded` or JSON
#[derive(Debug, Deserialize)]
pub struct EmailForm {
    pub email: String,
    #[serde(default)]
    pub submit: Option<String>,
}

impl EmailForm {
    /// A missing `submit` counts as "Send"
    pub fn sends_now(&self) -> bool {
        self.submit.as_deref().map_or(true, |submit| submit == SEND_NOW)
    }
}

#[derive(Debug, Serialize)]
struct Submitted {
    id: String,
    message: String,
}

/// Run the handler for `route`
pub async fn dispatch(
    state: &AppState,
    route: Route,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let result = match route {
        Route::SubmitEmail => submit_email(state, headers, &body).await,
        Route::SubmitLongTask => submit_long_task(state).await,
        Route::Status => match params.get("id") {
            Some(id) => task_status(state, id).await,
            None => Err(ApiError::bad_request("Missing task id")),
        },
        Route::Health => health(state).await,
    };
    result.unwrap_or_else(ApiError::into_response)
}

/// `POST /email`
pub async fn submit_email(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Response> {
    let form = parse_form(headers, body)?;
    let email = EmailData {
        subject: state.settings.email_subject.clone(),
        to: form.email.clone(),
        body: EMAIL_BODY.to_string(),
    };

    let (id, message) = if form.sends_now() {
        let id = state.queue.submit::<NotificationJob>(email).await?;
        (id, format!("Sending email to {}", form.email))
    } else {
        let delay = state.settings.email_delay();
        let id = state
            .queue
            .submit_delayed::<NotificationJob>(email, delay)
            .await?;
        (
            id,
            format!("An email will be sent to {} in {}", form.email, describe_delay(delay)),
        )
    };

    tracing::info!(job_id = %id, "{}", message);
    Ok(accepted(&id, &Submitted { id: id.clone(), message }))
}

/// `POST /longtask`
pub async fn submit_long_task(state: &AppState) -> Result<Response> {
    let id = state.queue.submit::<ProgressSimulationJob>(()).await?;
    tracing::info!(job_id = %id, "Long task submitted");
    Ok(accepted(&id, &json!({})))
}

/// `GET /status/{id}`
pub async fn task_status(state: &AppState, id: &str) -> Result<Response> {
    let view = state.queue.status(id).await?;
    Ok(json(StatusCode::OK, &view))
}

/// `GET /health`
pub async fn health(state: &AppState) -> Result<Response> {
    let stats = state.queue.stats().await?;
    Ok(json(
        StatusCode::OK,
        &json!({"status": "ok", "queue": stats}),
    ))
}

fn parse_form(headers: &HeaderMap, body: &[u8]) -> Result<EmailForm> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase());

    match content_type.as_deref() {
        Some("application/json") => Ok(serde_json::from_slice(body)?),
        Some("application/x-www-form-urlencoded") | None => Ok(serde_urlencoded::from_bytes(body)?),
        Some(other) => Err(ApiError::unsupported_media_type(format!(
            "Expected a form or JSON body, got {}",
            other
        ))),
    }
}

/// "one minute", "90 seconds", "2 minutes"
fn describe_delay(delay: Duration) -> String {
    let secs = delay.as_secs();
    match secs {
        1 => "one second".to_string(),
        60 => "one minute".to_string(),
        s if s > 60 && s % 60 == 0 => format!("{} minutes", s / 60),
        s => format!("{} seconds", s),
    }
}
