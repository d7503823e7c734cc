//! Streaming inspection of the source document.
//!
//! Every operation here is a single forward pass driven through serde's
//! `DeserializeSeed` machinery with `IgnoredAny` value skipping, so the
//! document is never materialized. Each call reopens the file, which makes
//! the pass restartable. Malformed JSON surfaces as [`KgError::Parse`].

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Value;

use crate::error::{KgError, Result};

pub(crate) type JsonFileDeserializer =
    serde_json::Deserializer<serde_json::de::IoRead<BufReader<File>>>;

pub(crate) fn open_document(path: &Path) -> Result<JsonFileDeserializer> {
    let file = File::open(path)?;
    Ok(serde_json::Deserializer::from_reader(BufReader::new(file)))
}

pub(crate) fn parse_error(path: &Path, err: serde_json::Error) -> KgError {
    KgError::Parse(format!("{}: {}", path.display(), err))
}

/// Ordered distinct top-level key names of the document's root object.
pub fn collection_names(path: &Path) -> Result<Vec<String>> {
    let mut de = open_document(path)?;
    TopLevelNames
        .deserialize(&mut de)
        .map_err(|e| parse_error(path, e))
}

/// Number of elements under a top-level key when it is array-valued;
/// 0 when the value is a scalar (or an object).
pub fn count_collection_items(path: &Path, name: &str) -> Result<u64> {
    let mut de = open_document(path)?;
    CollectionCount { name }
        .deserialize(&mut de)
        .map_err(|e| parse_error(path, e))
}

/// First value stored under a top-level key. Used for scalar metadata
/// collections; errors if the key does not occur in the document.
pub fn read_metadata_value(path: &Path, name: &str) -> Result<Value> {
    let mut de = open_document(path)?;
    let found = MetadataValue { name }
        .deserialize(&mut de)
        .map_err(|e| parse_error(path, e))?;
    found.ok_or_else(|| {
        KgError::Schema(format!(
            "top-level key '{}' not found in {}",
            name,
            path.display()
        ))
    })
}

// ── Top-level key names ─────────────────────────────────────────────────────

struct TopLevelNames;

impl<'de> DeserializeSeed<'de> for TopLevelNames {
    type Value = Vec<String>;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for TopLevelNames {
    type Value = Vec<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a JSON object at the document root")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut names: Vec<String> = Vec::new();
        while let Some(key) = map.next_key::<String>()? {
            if !names.contains(&key) {
                names.push(key);
            }
            map.next_value::<IgnoredAny>()?;
        }
        Ok(names)
    }
}

// ── Item count under one key ────────────────────────────────────────────────

struct CollectionCount<'a> {
    name: &'a str,
}

impl<'de> DeserializeSeed<'de> for CollectionCount<'_> {
    type Value = u64;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for CollectionCount<'_> {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a JSON object at the document root")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut count = 0u64;
        while let Some(key) = map.next_key::<String>()? {
            if key == self.name {
                count = map.next_value_seed(ElementCount)?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(count)
    }
}

/// Counts sequence elements without building them; any non-array value
/// counts as zero.
struct ElementCount;

impl<'de> DeserializeSeed<'de> for ElementCount {
    type Value = u64;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ElementCount {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "any JSON value")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut count = 0u64;
        while seq.next_element::<IgnoredAny>()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(0)
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> std::result::Result<Self::Value, E> {
        Ok(0)
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> std::result::Result<Self::Value, E> {
        Ok(0)
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> std::result::Result<Self::Value, E> {
        Ok(0)
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> std::result::Result<Self::Value, E> {
        Ok(0)
    }

    fn visit_str<E: de::Error>(self, _: &str) -> std::result::Result<Self::Value, E> {
        Ok(0)
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(0)
    }
}

// ── Scalar metadata extraction ──────────────────────────────────────────────

struct MetadataValue<'a> {
    name: &'a str,
}

impl<'de> DeserializeSeed<'de> for MetadataValue<'_> {
    type Value = Option<Value>;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for MetadataValue<'_> {
    type Value = Option<Value>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a JSON object at the document root")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut found: Option<Value> = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == self.name && found.is_none() {
                found = Some(map.next_value::<Value>()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}
