//! Request parameter sets.
//!
//! A [`ParameterSet`] is both the signing input and the wire payload of a
//! gateway request. It keeps insertion order (XML bodies and GET query
//! strings are emitted in that order) while signing canonicalizes by key.
//!
//! Values are a small tagged type, [`ParamValue`], so that integers and
//! floats are rendered the same way on every platform: plain decimal, no
//! thousands separators, no exponent notation.

use std::fmt::{self, Display, Formatter};

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;

use crate::error::{Error, ValidationError};

/// Name of the signature field. It never takes part in its own input.
pub const SIGN_FIELD: &str = "sign";

/// Name of the field that selects the signing algorithm.
pub const SIGN_TYPE_FIELD: &str = "sign_type";

/// Application identifier field.
pub const APP_ID_FIELD: &str = "appid";

/// Merchant identifier field.
pub const MCH_ID_FIELD: &str = "mch_id";

/// Application identifier used by combined-payment requests.
pub const COMBINE_APP_ID_FIELD: &str = "combine_appid";

/// Merchant identifier used by combined-payment requests.
pub const COMBINE_MCH_ID_FIELD: &str = "combine_mch_id";

/// Per-request random string.
pub const NONCE_STR_FIELD: &str = "nonce_str";

/// Root element of every XML request and response body.
pub const XML_ROOT: &str = "xml";

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Free text, sent as-is.
    Text(String),
    /// Integer amount or counter, e.g. `total_fee`.
    Int(i64),
    /// Floating point value.
    Float(f64),
}

impl ParamValue {
    /// Returns `true` for an empty text value. Numbers are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            // `f64`'s Display is locale-free and never switches to exponent form.
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Ordered, key-unique mapping from field name to [`ParamValue`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: Vec<(String, ParamValue)>,
}

impl ParameterSet {
    /// Creates an empty parameter set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets `key` to `value`.
    ///
    /// An existing key keeps its position and has its value replaced.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Builder-style variant of [`ParameterSet::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Returns the raw value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Returns the value under `key` rendered as a string, or `""` if absent.
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.get(key).map(ToString::to_string).unwrap_or_default()
    }

    /// Removes `key`, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Returns `true` if `key` is absent or holds an empty string.
    #[must_use]
    pub fn is_empty_value(&self, key: &str) -> bool {
        self.get(key).is_none_or(ParamValue::is_empty)
    }

    /// Returns `true` if `key` is present, even with an empty value.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Checks that every key in `keys` is present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the first missing key.
    pub fn require_non_empty(&self, keys: &[&str]) -> Result<(), ValidationError> {
        match keys.iter().find(|key| self.is_empty_value(key)) {
            Some(key) => Err(ValidationError::missing(*key)),
            None => Ok(()),
        }
    }

    /// Renders the set as an `application/x-www-form-urlencoded` query string.
    ///
    /// Keys appear in insertion order; empty values are skipped.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.iter().filter(|(_, v)| !v.is_empty()) {
            serializer.append_pair(key, &value.to_string());
        }
        serializer.finish()
    }

    /// Renders the set as the gateway's XML request body.
    ///
    /// Every non-empty entry becomes a leaf element under `<xml>`, in
    /// insertion order, with its text escaped.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(16 + self.entries.len() * 32);
        out.push('<');
        out.push_str(XML_ROOT);
        out.push('>');
        for (key, value) in self.iter().filter(|(_, v)| !v.is_empty()) {
            let text = value.to_string();
            out.push('<');
            out.push_str(key);
            out.push('>');
            out.push_str(&escape(text.as_str()));
            out.push_str("</");
            out.push_str(key);
            out.push('>');
        }
        out.push_str("</");
        out.push_str(XML_ROOT);
        out.push('>');
        out
    }

    /// Parses a flat gateway XML document into a parameter set.
    ///
    /// Each direct child of the root element becomes a text entry; text and
    /// CDATA content are concatenated. Deeper nesting is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Xml`] if the document is not well-formed.
    pub fn from_xml(xml: &str) -> Result<Self, Error> {
        // Whitespace between fields never reaches a value: text is only
        // collected inside depth-2 elements, and is kept verbatim there.
        let mut reader = Reader::from_str(xml);

        let mut params = Self::new();
        let mut depth = 0usize;
        let mut field: Option<String> = None;
        let mut text = String::new();

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    depth += 1;
                    if depth == 2 {
                        field = Some(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                        text.clear();
                    }
                }
                Event::Empty(empty) if depth == 1 => {
                    params.set(String::from_utf8_lossy(empty.name().as_ref()), "");
                }
                Event::Text(t) if depth == 2 => {
                    text.push_str(&t.unescape().map_err(quick_xml::Error::from)?);
                }
                Event::CData(data) if depth == 2 => {
                    text.push_str(&String::from_utf8_lossy(&data));
                }
                Event::End(_) => {
                    if depth == 2
                        && let Some(key) = field.take()
                    {
                        params.set(key, std::mem::take(&mut text));
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(params)
    }
}

impl<K, V> FromIterator<(K, V)> for ParameterSet
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}
