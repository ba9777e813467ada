//! Utility functions shared by the adapters and the normalizer.
//!
//! - **URL validation**: endpoint checks and link resolution for scraped pages
//! - **Text processing**: control-character stripping and whitespace cleanup

mod text;
mod url_validator;

pub use text::{clean_text, strip_control_chars, truncate_chars};
pub use url_validator::{resolve_link, validate_endpoint, EndpointError};
