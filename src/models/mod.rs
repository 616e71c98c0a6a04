//! Output models for the command-line front end
//!
//! This module defines the records the CLI prints as JSON, one per command.

pub mod responses;

// Re-export commonly used types
pub use responses::{
    CountResponse, ErrorResponse, ExistsResponse, FlushResponse, GetResponse, KeysResponse,
    PolicyResponse, RemoveResponse, SetResponse, SizeResponse, TrimResponse,
};
