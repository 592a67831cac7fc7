//! Filter data parsing
//!
//! Sessions may attach free-text filter data to a provider, written as
//! `key=value` pairs separated by `;`. A value wrapped in double quotes may
//! contain literal `;` or `=`. Provider callbacks do not receive that text
//! as-is: they get a [`FilterDescriptor`] over a flat buffer of
//! NUL-terminated strings alternating key, value, key, value, ...
//!
//! ```text
//! key="a;value=";foo=bar  -->  key\0a;value=\0foo\0bar\0
//! ```

use std::collections::TryReserveError;
use thiserror::Error;

/// Token terminator written in place of unquoted `=` and `;`
pub const TERMINATOR: char = '\0';

/// Filter descriptor type passed alongside the buffer
pub const FILTER_TYPE_KEY_VALUE: u32 = 0;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("failed to reserve {requested} bytes for filter tokens")]
    Allocation {
        requested: usize,
        #[source]
        source: TryReserveError,
    },
}

/// Canonicalized filter data: a contiguous buffer of NUL-terminated tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescriptor {
    buffer: String,
}

impl FilterDescriptor {
    /// Raw token buffer, terminators included
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// Declared buffer length: every byte written, final terminator included
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn filter_type(&self) -> u32 {
        FILTER_TYPE_KEY_VALUE
    }

    /// Tokens in buffer order, without their terminators
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.buffer
            .strip_suffix(TERMINATOR)
            .unwrap_or(&self.buffer)
            .split(TERMINATOR)
    }

    /// Tokens grouped as `(key, value)`; a trailing key without a value pairs
    /// with `""`. The empty token left by a trailing `;` is not a key.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        let mut tokens = self.tokens();
        std::iter::from_fn(move || {
            let key = tokens.next()?;
            match tokens.next() {
                Some(value) => Some((key, value)),
                None if key.is_empty() => None,
                None => Some((key, "")),
            }
        })
    }

    /// Look up the first value recorded for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// Tokenize filter data into a [`FilterDescriptor`].
///
/// Each `"` toggles quoted mode and is dropped. Outside quotes every `=` and
/// `;` becomes a terminator. Empty input yields `None`. The scratch buffer is
/// reserved up front; failure to reserve it is reported rather than aborting.
pub fn tokenize(filter_data: &str) -> Result<Option<FilterDescriptor>, FilterError> {
    if filter_data.is_empty() {
        return Ok(None);
    }

    let requested = filter_data.len() + 1;
    let mut buffer = String::new();
    buffer
        .try_reserve_exact(requested)
        .map_err(|source| FilterError::Allocation { requested, source })?;

    let mut quoted = false;
    for ch in filter_data.chars() {
        match ch {
            '"' => quoted = !quoted,
            '=' | ';' if !quoted => buffer.push(TERMINATOR),
            _ => buffer.push(ch),
        }
    }
    buffer.push(TERMINATOR);

    Ok(Some(FilterDescriptor { buffer }))
}
