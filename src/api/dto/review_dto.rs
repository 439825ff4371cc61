//! Review DTOs.

use serde::Deserialize;
use utoipa::ToSchema;

/// Request body for `POST /reviews`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitReviewRequest {
    /// Review body.
    pub text: String,
    /// Uploaded image location.
    #[serde(default)]
    pub image_url: Option<String>,
}
