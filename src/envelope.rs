//! Uniform response shapes for business handlers.
//!
//! Every handler answers with exactly one of two bodies:
//! `{"errors":[{"field":..,"message":..}, ..]}` when something was rejected,
//! or `{"result":..}` on success. The two are never mixed.

use std::fmt;

use actix_web::{http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};

pub const MISSING: &str = "MISSING";
pub const TAKEN: &str = "TAKEN";
pub const INSECURE: &str = "INSECURE";
pub const FORMAT_INVALID: &str = "FORMAT_INVALID";
pub const FAILED: &str = "FAILED";
pub const LOCKED: &str = "LOCKED";
pub const EXPIRED: &str = "EXPIRED";

/// A single field-scoped rejection, e.g. `("username", "TAKEN")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Non-empty list of field errors in the order they were produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new(first: FieldError) -> Self {
        Self(vec![first])
    }

    /// Returns `None` for an empty list.
    pub fn from_vec(errors: Vec<FieldError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self(errors))
        }
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<FieldError> {
        self.0
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(", "))
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceErrors {
    pub errors: FieldErrors,
}

#[derive(Debug, Serialize)]
pub struct ServiceData<T> {
    pub result: T,
}

pub fn render_errors(status: StatusCode, errors: FieldErrors) -> HttpResponse {
    HttpResponse::build(status).json(ServiceErrors { errors })
}

pub fn render_data<T: Serialize>(status: StatusCode, result: T) -> HttpResponse {
    HttpResponse::build(status).json(ServiceData { result })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_errors_shape_preserves_order() {
        let mut errors = FieldErrors::new(FieldError::new("username", MISSING));
        errors.push(FieldError::new("password", INSECURE));

        let body = serde_json::to_value(ServiceErrors { errors }).unwrap();
        assert_eq!(
            body,
            json!({"errors": [
                {"field": "username", "message": "MISSING"},
                {"field": "password", "message": "INSECURE"}
            ]})
        );
        assert!(body.get("result").is_none());
    }

    #[test]
    fn test_data_shape_has_no_errors() {
        let body = serde_json::to_value(ServiceData { result: json!({"id": 7}) }).unwrap();
        assert_eq!(body, json!({"result": {"id": 7}}));
        assert!(body.get("errors").is_none());
    }

    #[test]
    fn test_empty_error_list_is_refused() {
        assert!(FieldErrors::from_vec(Vec::new()).is_none());
        let errors = FieldErrors::from_vec(vec![FieldError::new("a", "b")]).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.to_string(), "a: b");
    }

    #[actix_web::test]
    async fn test_render_sets_status() {
        let resp = render_errors(
            StatusCode::UNPROCESSABLE_ENTITY,
            FieldErrors::new(FieldError::new("credentials", FAILED)),
        );
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = render_data(StatusCode::CREATED, "ok");
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&body[..], br#"{"result":"ok"}"#);
    }
}
