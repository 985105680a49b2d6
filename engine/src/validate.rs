//! Validation of listings before they enter the write path.
//!
//! Ids follow the remote store's key constraint: 1 to 1500 characters drawn
//! from `[A-Za-z0-9_-]`.

use crate::{error::Result, Error, Listing};

/// Maximum accepted id length.
pub const MAX_ID_LEN: usize = 1500;

/// Check an id against the remote key constraint.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::MissingRequiredField("id".into()));
    }

    if id.len() > MAX_ID_LEN {
        return Err(Error::InvalidId {
            id: truncate_for_display(id),
            reason: "longer than 1500 characters",
        });
    }

    if !id.bytes().all(is_id_byte) {
        return Err(Error::InvalidId {
            id: id.to_string(),
            reason: "contains characters outside [A-Za-z0-9_-]",
        });
    }

    Ok(())
}

/// Check required fields first, then the id constraint.
pub fn validate_listing(listing: &Listing) -> Result<()> {
    if listing.id.is_empty() {
        return Err(Error::MissingRequiredField("id".into()));
    }
    if listing.title.trim().is_empty() {
        return Err(Error::MissingRequiredField("title".into()));
    }
    validate_id(&listing.id)
}

fn is_id_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn truncate_for_display(id: &str) -> String {
    let mut end = 32.min(id.len());
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &id[..end])
}
