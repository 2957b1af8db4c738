//! CrudService: generic CRUD over the content model using the safe SQL builder.

mod crud;
mod validation;
pub use crud::{apply_slug, row_to_json, BatchFailure, BatchOutcome, CrudService, BATCH_LIMIT};
pub use validation::{is_valid_email, RequestValidator};
