//! Single-pass field extraction from JSON documents.
//!
//! The document is walked entry by entry with `serde_json`; every scalar
//! whose key matches a [`FieldSpec`] is copied into [`ExtractedFields`] as
//! soon as it is seen. A structural error later in the document therefore
//! leaves earlier matches in place.

use std::fmt;

use log::{debug, warn};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde_json::value::RawValue;

use crate::{
    error::{AcquireError, ParseError},
    model::{ExtractedFields, FieldId},
};

/// How deep below the top-level object entries are still reported.
const MAX_NESTING: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Number,
    Bool,
    Null,
    Object,
    Array,
}

impl ValueKind {
    fn of(raw: &str) -> Self {
        match raw.as_bytes().first() {
            Some(b'"') => ValueKind::String,
            Some(b'{') => ValueKind::Object,
            Some(b'[') => ValueKind::Array,
            Some(b't') | Some(b'f') => ValueKind::Bool,
            Some(b'n') => ValueKind::Null,
            _ => ValueKind::Number,
        }
    }
}

/// Where in the document a key is allowed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Root,
    /// Only inside the top-level object stored under this key.
    Within(&'static str),
}

/// One key -> destination mapping.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub field: FieldId,
    pub scope: Scope,
    /// Restricts the match to values of this JSON type.
    pub kind: Option<ValueKind>,
}

impl FieldSpec {
    pub const fn new(key: &'static str, field: FieldId, scope: Scope) -> Self {
        Self {
            key,
            field,
            scope,
            kind: None,
        }
    }

    pub const fn of_kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    fn matches(&self, entry: &Entry<'_>) -> bool {
        if self.key != entry.key {
            return false;
        }

        let in_scope = match self.scope {
            Scope::Root => entry.parent.is_none(),
            Scope::Within(parent) => entry.parent == Some(parent),
        };

        in_scope && self.kind.is_none_or(|kind| kind == entry.kind)
    }
}

/// Keys read from the geolocation document.
pub const GEO_KEYS: &[FieldSpec] = &[
    FieldSpec::new("loc", FieldId::Loc, Scope::Root),
    FieldSpec::new("timezone", FieldId::Timezone, Scope::Root),
    FieldSpec::new("city", FieldId::City, Scope::Root),
];

/// Keys read from the `current` block of the weather document.
pub const WEATHER_KEYS: &[FieldSpec] = &[
    FieldSpec::new("time", FieldId::Time, Scope::Within("current")).of_kind(ValueKind::String),
    FieldSpec::new("temperature_2m", FieldId::Temperature, Scope::Within("current")),
    FieldSpec::new("relative_humidity_2m", FieldId::Humidity, Scope::Within("current")),
    FieldSpec::new("wind_speed_10m", FieldId::WindSpeed, Scope::Within("current")),
    FieldSpec::new("weather_code", FieldId::WeatherCode, Scope::Within("current")),
];

/// A scalar key/value pair as reported by [`traverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    /// Key of the enclosing object, `None` for top-level entries.
    pub parent: Option<&'a str>,
    pub key: &'a str,
    /// Unescaped text for strings, raw JSON text otherwise.
    pub value: &'a str,
    pub kind: ValueKind,
}

/// Calls `visit` once per scalar entry of the top-level object and of the
/// objects nested directly inside it, in document order.
///
/// Anything after the last `}` (trailing NULs, garbage from a fixed-size
/// receive buffer) is ignored.
pub fn traverse(doc: &[u8], visit: &mut dyn FnMut(&Entry<'_>)) -> Result<(), ParseError> {
    let start = doc
        .iter()
        .position(|b| !b.is_ascii_whitespace() && *b != 0)
        .ok_or(ParseError::Empty)?;
    let end = doc
        .iter()
        .rposition(|b| *b == b'}')
        .ok_or(ParseError::Unterminated)?;
    if end < start {
        return Err(ParseError::Unterminated);
    }

    let text =
        std::str::from_utf8(&doc[start..=end]).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let mut de = serde_json::Deserializer::from_str(text);
    de.deserialize_map(ObjectWalker {
        parent: None,
        depth: MAX_NESTING,
        visit,
    })
    .map_err(|e| ParseError::Malformed(e.to_string()))?;
    de.end().map_err(|e| ParseError::Malformed(e.to_string()))
}

struct ObjectWalker<'v, 'p> {
    parent: Option<&'p str>,
    depth: usize,
    visit: &'v mut dyn FnMut(&Entry<'_>),
}

impl<'de> Visitor<'de> for ObjectWalker<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let ObjectWalker {
            parent,
            depth,
            visit,
        } = self;

        while let Some(key) = map.next_key::<String>()? {
            let raw: &'de RawValue = map.next_value()?;
            let text = raw.get();

            match ValueKind::of(text) {
                ValueKind::Object => {
                    if depth == 0 {
                        continue;
                    }
                    let mut nested = serde_json::Deserializer::from_str(text);
                    nested
                        .deserialize_map(ObjectWalker {
                            parent: Some(&key),
                            depth: depth - 1,
                            visit: &mut *visit,
                        })
                        .map_err(de::Error::custom)?;
                }
                ValueKind::Array => {}
                ValueKind::String => {
                    let value: String = serde_json::from_str(text).map_err(de::Error::custom)?;
                    visit(&Entry {
                        parent,
                        key: &key,
                        value: &value,
                        kind: ValueKind::String,
                    });
                }
                kind => visit(&Entry {
                    parent,
                    key: &key,
                    value: text,
                    kind,
                }),
            }
        }

        Ok(())
    }
}

/// Result of one [`extract`] call.
#[derive(Debug, Default)]
pub struct Extraction {
    pub matched: usize,
    /// Matched values that could not be stored (e.g. a `loc` without comma).
    pub rejected: Vec<AcquireError>,
}

/// Copies every entry of `doc` that matches one of `keys` into `fields`.
///
/// Keys compare by full length and content; unmatched keys are ignored. On a
/// parse error the values stored before the error point stay in `fields`.
pub fn extract(
    doc: &[u8],
    keys: &[FieldSpec],
    fields: &mut ExtractedFields,
) -> Result<Extraction, ParseError> {
    let mut outcome = Extraction::default();

    traverse(doc, &mut |entry| {
        let Some(wanted) = keys.iter().find(|k| k.matches(entry)) else {
            return;
        };

        match fields.assign(wanted.field, entry.value) {
            Ok(()) => {
                debug!("Extracted {} = {}", wanted.key, entry.value);
                outcome.matched += 1;
            }
            Err(err) => {
                warn!("Rejected value for '{}': {err}", wanted.key);
                outcome.rejected.push(err);
            }
        }
    })?;

    Ok(outcome)
}
