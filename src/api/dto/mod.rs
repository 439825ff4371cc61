//! Data Transfer Objects for REST request/response serialization.
//!
//! Request bodies live here. Responses mostly reuse the domain and
//! service types directly, which already derive [`utoipa::ToSchema`].

pub mod common_dto;
pub mod deal_dto;
pub mod ledger_dto;
pub mod quest_dto;
pub mod review_dto;

pub use common_dto::*;
pub use deal_dto::*;
pub use ledger_dto::*;
pub use quest_dto::*;
pub use review_dto::*;
