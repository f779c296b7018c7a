use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, warn};
use triage_core::{build_prompt, AnalyzeRequest};

use crate::{AnalysisResult, Diagnostics};

const DEV_ONLY: &str = "Only available in development";

/// POST handler behind the widget. Always answers with an
/// [`AnalysisResult`] body; provider failures are a 200 with
/// `success: false`, malformed input is a 400 and non-development modes
/// get a 403.
pub async fn analyze(
    State(diag): State<Arc<Diagnostics>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    if !diag.mode().is_development() {
        warn!(target: "triage::api", mode = %diag.mode(), "analysis requested outside development");
        return reply(StatusCode::FORBIDDEN, AnalysisResult::failure(DEV_ONLY));
    }
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            debug!(target: "triage::api", error = %rejection, "rejected analysis payload");
            return reply(StatusCode::BAD_REQUEST, AnalysisResult::failure(rejection.body_text()));
        }
    };
    let record = match request.into_record() {
        Ok(record) => record,
        Err(err) => return reply(StatusCode::BAD_REQUEST, AnalysisResult::failure(err.to_string())),
    };
    let prompt = build_prompt(&record);
    let result = diag.client().analyze(&prompt).await;
    reply(StatusCode::OK, result)
}

fn reply(status: StatusCode, result: AnalysisResult) -> Response {
    (status, Json(result)).into_response()
}
