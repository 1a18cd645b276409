use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct DialRequest {
    pub extension: String,
    pub number: String,
}

#[derive(Debug, Serialize)]
pub struct DialResponse {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
