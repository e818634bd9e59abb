use std::collections::HashMap;

use serde::Serialize;

pub(crate) mod auth;
pub(crate) mod exam;
pub(crate) mod question;
pub(crate) mod result;
pub(crate) mod subject;
pub(crate) mod user;

/// Success envelope: `{"status":"success","data":...}` with optional
/// pagination. The shape is a stable client contract.
#[derive(Debug, Serialize)]
pub(crate) struct ApiSuccess<T> {
    pub(crate) status: &'static str,
    pub(crate) data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) pagination: Option<Pagination>,
}

impl<T> ApiSuccess<T> {
    pub(crate) fn new(data: T) -> Self {
        Self { status: "success", data, pagination: None }
    }

    pub(crate) fn paginated(data: T, pagination: Pagination) -> Self {
        Self { status: "success", data, pagination: Some(pagination) }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Pagination {
    pub(crate) total_count: i64,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let body = serde_json::to_value(ApiSuccess::new(serde_json::json!({"id": 1}))).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["id"], 1);
        assert!(body.get("pagination").is_none());
    }

    #[test]
    fn paginated_envelope_shape() {
        let body = serde_json::to_value(ApiSuccess::paginated(
            vec!["a", "b"],
            Pagination { total_count: 10, skip: 0, limit: 2 },
        ))
        .unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["pagination"]["total_count"], 10);
    }
}
