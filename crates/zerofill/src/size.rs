//! Requested-size validation.
//!
//! Clients ask for a file size in gibibytes. The value arrives as untrusted
//! JSON, so [`SizeSpec::from_json`] accepts only a present, finite, strictly
//! positive number (or a string holding one) and converts it to an exact byte
//! count. The rest of the engine works in bytes only.

use crate::{Error, Result};
use serde_json::Value;

/// Number of bytes in one gibibyte.
pub const GIB: u64 = 1 << 30;

/// A validated request for a file of a given size.
#[derive(Clone, Debug, PartialEq)]
pub struct SizeSpec {
    label: String,
    total_bytes: u64,
}

impl SizeSpec {
    /// Validates a raw `size` value taken from a request body.
    ///
    /// Integral values are scaled with checked integer arithmetic. Fractional
    /// values are scaled by `2^30` in floating point, which is exact for a
    /// power of two, and then floored to whole bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSize`] if the value is missing, not numeric,
    /// not finite, not strictly positive, rounds down to zero bytes, or does
    /// not fit in a `u64` byte count.
    pub fn from_json(raw: &Value) -> Result<Self> {
        match raw {
            Value::Null => Err(Error::invalid_size("size is required")),
            Value::Number(n) => {
                if let Some(whole) = n.as_u64() {
                    Self::from_gib(whole)
                } else if let Some(signed) = n.as_i64() {
                    Err(Error::invalid_size(format!(
                        "size must be greater than 0, got {signed}"
                    )))
                } else {
                    n.as_f64()
                        .ok_or_else(|| Error::invalid_size("size is not a number"))
                        .and_then(Self::from_fractional_gib)
                }
            }
            Value::String(s) => Self::parse(s),
            Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
                Err(Error::invalid_size("size must be a number"))
            }
        }
    }

    /// Parses a size from its textual form, e.g. `"5"` or `" 0.25 "`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`SizeSpec::from_json`].
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_size("size is required"));
        }
        if let Ok(whole) = trimmed.parse::<u64>() {
            return Self::from_gib(whole);
        }
        let value = trimmed
            .parse::<f64>()
            .map_err(|_| Error::invalid_size(format!("`{trimmed}` is not a number")))?;
        Self::from_fractional_gib(value)
    }

    /// Builds a spec for a whole number of gibibytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSize`] if `gib` is zero or the byte count would
    /// overflow.
    pub fn from_gib(gib: u64) -> Result<Self> {
        if gib == 0 {
            return Err(Error::invalid_size("size must be greater than 0"));
        }
        let total_bytes = gib
            .checked_mul(GIB)
            .ok_or_else(|| Error::invalid_size(format!("size {gib} GiB is too large")))?;
        Ok(Self {
            label: gib.to_string(),
            total_bytes,
        })
    }

    fn from_fractional_gib(gib: f64) -> Result<Self> {
        if !gib.is_finite() {
            return Err(Error::invalid_size("size must be finite"));
        }
        if gib <= 0.0 {
            return Err(Error::invalid_size(format!(
                "size must be greater than 0, got {gib}"
            )));
        }
        if gib.fract() == 0.0 && gib < u64::MAX as f64 {
            return Self::from_gib(gib as u64);
        }

        let bytes = (gib * GIB as f64).floor();
        // 2^64 is exactly representable; anything at or above it cannot fit.
        if bytes >= 18_446_744_073_709_551_616.0 {
            return Err(Error::invalid_size(format!("size {gib} GiB is too large")));
        }
        let total_bytes = bytes as u64;
        if total_bytes == 0 {
            return Err(Error::invalid_size(format!(
                "size {gib} GiB is smaller than one byte"
            )));
        }
        Ok(Self {
            label: gib.to_string(),
            total_bytes,
        })
    }

    /// Rejects the request if it exceeds `max_total_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSize`] when the request is above the limit.
    pub fn ensure_within(self, max_total_bytes: u64) -> Result<Self> {
        if self.total_bytes > max_total_bytes {
            return Err(Error::invalid_size(format!(
                "size {} GiB exceeds maximum allowed ({} bytes)",
                self.label, max_total_bytes
            )));
        }
        Ok(self)
    }

    /// Exact number of bytes the generated file will contain.
    pub const fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Canonical decimal rendering of the requested GiB count, used in file
    /// names.
    pub fn label(&self) -> &str {
        &self.label
    }
}
