//! sat-core: domain types, the Store/Broker seams, and the submission
//! service that ties formula normalization, deduplication, and job
//! enqueueing together (spec §4.4).

pub mod broker;
pub mod error;
pub mod store;
pub mod submission;
pub mod types;

pub use broker::Broker;
pub use error::ServiceError;
pub use store::Store;
pub use submission::{ResultResponse, StatusResponse, SubmissionService, SubmitResponse};
pub use types::*;
