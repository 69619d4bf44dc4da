//! HTTP error responses for the web adapter.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::domain::error::SportfundError;

use super::templates::{BasePage, ErrorTemplate, Nav};

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub fn status_from_error(err: &SportfundError) -> StatusCode {
    match err {
        SportfundError::Validation(_) | SportfundError::DuplicateAccount { .. } => {
            StatusCode::BAD_REQUEST
        }
        SportfundError::NotFound { .. } => StatusCode::NOT_FOUND,
        SportfundError::Database { .. }
        | SportfundError::DatabaseQuery { .. }
        | SportfundError::ConfigParse { .. }
        | SportfundError::ConfigMissing { .. }
        | SportfundError::ConfigInvalid { .. }
        | SportfundError::Catalog { .. }
        | SportfundError::PasswordHash { .. }
        | SportfundError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SportfundError> for WebError {
    fn from(err: SportfundError) -> Self {
        let status = status_from_error(&err);
        if status.is_server_error() {
            // Internal details go to the log, not the page.
            error!(error = %err, "request failed");
            Self::new(status, "Something went wrong. Please try again later.")
        } else {
            Self::new(status, err.to_string())
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let fragment = ErrorTemplate {
            message: &self.message,
            status: self.status.as_u16(),
        };
        let content = match fragment.render() {
            Ok(html) => html,
            Err(_) => return (self.status, self.message).into_response(),
        };
        let nav = Nav::default();
        let page = BasePage {
            title: "Error",
            content: &content,
            nav: &nav,
            notice: None,
        };
        match page.render() {
            Ok(html) => (self.status, Html(html)).into_response(),
            Err(_) => (self.status, Html(content)).into_response(),
        }
    }
}
