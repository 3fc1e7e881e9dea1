//! Bearer-secret check for the admin endpoints

use subtle::ConstantTimeEq;

use super::EdgeRequest;
use crate::error::{FingerprintError, Result};

/// Whether `authorization` is exactly `Bearer <secret>`
///
/// The comparison runs in constant time over the header bytes.
pub fn bearer_matches(authorization: Option<&str>, secret: &str) -> bool {
    match authorization {
        Some(header) => {
            let expected = format!("Bearer {}", secret);
            header.as_bytes().ct_eq(expected.as_bytes()).into()
        }
        None => false,
    }
}

/// Reject the request unless it carries the admin secret
pub fn authorize(req: &EdgeRequest, secret: &str) -> Result<()> {
    if bearer_matches(req.header("authorization"), secret) {
        Ok(())
    } else {
        Err(FingerprintError::Unauthorized)
    }
}
