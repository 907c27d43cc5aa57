//! Replies received from the controller.

use std::fmt;

use bytes::Bytes;

/// A decoded reply to exactly one prior command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    payload: Bytes,
    text: String,
}

impl Reply {
    /// Decode a raw reply payload as UTF-8 text.
    ///
    /// # Errors
    /// Returns the UTF-8 error if the payload is not valid text.
    pub fn decode(payload: Bytes) -> Result<Self, std::str::Utf8Error> {
        let text = std::str::from_utf8(&payload)?.to_string();
        Ok(Self { payload, text })
    }

    /// Reply text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Raw payload as received.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
