//! URI path template substitution.
//!
//! Templates name their parameters as `{name}` or, for greedy labels that may
//! contain `/`, `{name+}`. Two paths are maintained side by side: the decoded
//! path receives values verbatim and the raw path receives them escaped.

use crate::error::ProtocolError;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Bytes escaped in a single path segment: everything but RFC 3986
/// unreserved, so `/` is escaped too.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Bytes escaped in a greedy label, which keeps `/` as a separator.
const GREEDY_PATH: &AsciiSet = &PATH_SEGMENT.remove(b'/');

/// Percent-encodes `value` for use in a URI path. `/` is escaped only when
/// `encode_sep` is set.
pub fn escape_path(value: &str, encode_sep: bool) -> String {
    let set = if encode_sep { PATH_SEGMENT } else { GREEDY_PATH };
    utf8_percent_encode(value, set).to_string()
}

/// Path template with pending parameter replacements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathReplace {
    template: String,
    path: String,
    raw_path: String,
}

impl PathReplace {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            path: template.clone(),
            raw_path: template.clone(),
            template,
        }
    }

    /// Substitutes the parameter named `key`.
    ///
    /// A plain label escapes every reserved byte including `/`; a greedy label
    /// keeps `/` as a segment separator.
    pub fn replace_element(&mut self, key: &str, value: &str) -> Result<(), ProtocolError> {
        let plain = format!("{{{}}}", key);
        let greedy = format!("{{{}+}}", key);

        let (label, encode_sep) = if self.path.contains(&plain) {
            (plain, true)
        } else if self.path.contains(&greedy) {
            (greedy, false)
        } else {
            return Err(ProtocolError::InvalidPath {
                template: self.template.clone(),
                reason: format!("no path parameter named {:?}", key),
            });
        };

        self.path = self.path.replacen(&label, value, 1);
        self.raw_path = self
            .raw_path
            .replacen(&label, &escape_path(value, encode_sep), 1);
        Ok(())
    }

    /// Returns the decoded and raw paths.
    pub fn encode(&self) -> (String, String) {
        (self.path.clone(), self.raw_path.clone())
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

/// Splits a URI template into its path and static query parts.
pub fn split_template(uri: &str) -> (&str, Option<&str>) {
    match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri, None),
    }
}
