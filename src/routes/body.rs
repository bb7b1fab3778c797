use axum::extract::FromRequest;

use crate::error::AppError;

/// JSON request body. A body that does not parse is a `{message}` 400 instead
/// of axum's plain text rejection.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);
