//! Response envelopes for the sync API.
//!
//! Every body is `{ "data": ... }`. Triggers answer 202 because the sync
//! itself runs on the dispatcher; the body carries the task id to poll.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// `200 { "data": T }`.
pub fn ok<T: Serialize>(data: T) -> Json<DataResponse<T>> {
    Json(DataResponse { data })
}

/// `202 { "data": T }` for work handed to the dispatcher.
pub fn accepted<T: Serialize>(data: T) -> (StatusCode, Json<DataResponse<T>>) {
    (StatusCode::ACCEPTED, ok(data))
}
