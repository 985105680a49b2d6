//! Sanitizing listings on their way to and from the remote store.
//!
//! Remote document stores reject absent values, so [`clean`] strips them
//! recursively before every remote write. Incoming documents are cleaned,
//! decoded, and have their root-relative media references made absolute by a
//! [`MediaResolver`].

use crate::{error::Result, Error, Listing, RawDocument};
use serde_json::Value;

/// Recursively drop absent (`null`) object fields and array elements.
///
/// Scalars pass through unchanged. `clean(clean(x)) == clean(x)`.
pub fn clean(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, clean(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(clean)
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Merge `patch` into `target` field by field.
///
/// Objects merge recursively; a `null` in the patch removes the field; any
/// other value replaces what was there (arrays included).
pub fn merge_fields(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(base), Value::Object(changes)) => {
            for (key, value) in changes {
                if value.is_null() {
                    base.remove(&key);
                } else {
                    merge_fields(base.entry(key).or_insert(Value::Null), value);
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Whether a media reference is a path on the serving origin (`/img/a.jpg`)
/// rather than an absolute or protocol-relative reference.
pub fn is_root_relative(reference: &str) -> bool {
    reference.starts_with('/') && !reference.starts_with("//")
}

/// Rewrites root-relative media references against a base origin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaResolver {
    base_origin: Option<String>,
}

impl MediaResolver {
    /// Create a resolver for `base_origin` (for example `https://example.com`).
    ///
    /// The origin must be absolute so that resolved references are never
    /// root-relative themselves.
    pub fn new(base_origin: impl Into<String>) -> Result<Self> {
        let origin = base_origin.into();
        let trimmed = origin.trim().trim_end_matches('/');

        if trimmed.is_empty() || is_root_relative(trimmed) || !trimmed.contains("://") {
            return Err(Error::InvalidOrigin(origin));
        }

        Ok(Self {
            base_origin: Some(trimmed.to_string()),
        })
    }

    /// A resolver that leaves every reference unchanged.
    pub fn passthrough() -> Self {
        Self { base_origin: None }
    }

    pub fn base_origin(&self) -> Option<&str> {
        self.base_origin.as_deref()
    }

    /// Resolve a single reference. Idempotent.
    pub fn resolve(&self, reference: &str) -> String {
        match &self.base_origin {
            Some(origin) if is_root_relative(reference) => format!("{origin}{reference}"),
            _ => reference.to_string(),
        }
    }

    /// Resolve every media reference a listing carries.
    pub fn resolve_listing(&self, mut listing: Listing) -> Listing {
        for image in &mut listing.images {
            *image = self.resolve(image);
        }
        if let Some(photo) = listing.contact.as_mut().and_then(|c| c.photo.as_mut()) {
            *photo = self.resolve(photo);
        }
        listing
    }
}

/// Encode a listing as the field set sent to the remote store.
pub fn sanitize_for_remote(listing: &Listing) -> Result<Value> {
    let value =
        serde_json::to_value(listing).map_err(|e| Error::InvalidPayload(e.to_string()))?;
    Ok(clean(value))
}

/// Decode a remote document into a listing ready for the local cache.
///
/// The document key is authoritative over any `id` carried in the fields.
pub fn listing_from_remote(document: &RawDocument, resolver: &MediaResolver) -> Result<Listing> {
    let mut fields = match clean(document.data.clone()) {
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidPayload(format!(
                "document '{}' is not an object: {other}",
                document.id
            )))
        }
    };
    fields.insert("id".into(), Value::String(document.id.clone()));

    let listing: Listing = serde_json::from_value(Value::Object(fields))
        .map_err(|e| Error::InvalidPayload(format!("document '{}': {e}", document.id)))?;

    Ok(resolver.resolve_listing(listing))
}
