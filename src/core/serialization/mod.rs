/*!
 * Serialization Utilities
 *
 * - Bincode for the versioned result frame envelope
 * - JSON for self-describing task values
 */

pub mod bincode;
pub mod json;

pub use bincode::{from_slice_with_header, to_vec_with_header, BincodeError};
pub use json::JsonError;
