//! Chunked record reader over one top-level item collection.
//!
//! Records stream one at a time off the document (same seeded-deserializer
//! pass as [`super::inspect`]) and are grouped into batches of `chunk_size`.
//! `limit` bounds the number of emitted *batches*, not records; a reached
//! limit abandons the rest of the stream instead of scanning it to the end.

use std::fmt;
use std::path::Path;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};

use crate::error::{KgError, Result};
use crate::source::inspect::{open_document, parse_error};

/// One source record: a JSON object keyed by field name.
pub type Record = Map<String, Value>;

/// Sentinel message used to abort the deserializer once the consumer is
/// done with the stream. Never surfaced to callers.
const STREAM_STOPPED: &str = "item stream stopped";

/// Stream `collection` in batches of `chunk_size` records, invoking `f` per
/// batch. `limit` caps the number of batches (0 = unlimited). The final
/// batch may be short; it is emitted only if the limit was not reached
/// first. Errors returned by `f` propagate unchanged.
pub fn for_each_item_batch<F>(
    path: &Path,
    collection: &str,
    chunk_size: usize,
    limit: usize,
    mut f: F,
) -> Result<()>
where
    F: FnMut(Vec<Record>) -> Result<()>,
{
    if chunk_size == 0 {
        return Err(KgError::Schema("chunk size must be non-zero".to_string()));
    }

    let mut de = open_document(path)?;
    let mut failure: Option<KgError> = None;
    let seed = ItemBatches {
        collection,
        chunk_size,
        limit,
        callback: &mut f,
        failure: &mut failure,
    };

    match seed.deserialize(&mut de) {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Some(cause) = failure {
                return Err(cause);
            }
            if err.to_string().contains(STREAM_STOPPED) {
                return Ok(());
            }
            Err(parse_error(path, err))
        }
    }
}

/// Collect the first `limit` batches of a collection into memory. Intended
/// for small samples; the full converter path streams via
/// [`for_each_item_batch`].
pub fn read_sample_items(
    path: &Path,
    collection: &str,
    chunk_size: usize,
    limit: usize,
) -> Result<Vec<Record>> {
    let mut items = Vec::new();
    for_each_item_batch(path, collection, chunk_size, limit, |batch| {
        items.extend(batch);
        Ok(())
    })?;
    Ok(items)
}

struct ItemBatches<'a, F> {
    collection: &'a str,
    chunk_size: usize,
    limit: usize,
    callback: &'a mut F,
    failure: &'a mut Option<KgError>,
}

impl<'de, F> DeserializeSeed<'de> for ItemBatches<'_, F>
where
    F: FnMut(Vec<Record>) -> Result<()>,
{
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de, F> Visitor<'de> for ItemBatches<'_, F>
where
    F: FnMut(Vec<Record>) -> Result<()>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a JSON object at the document root")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let ItemBatches {
            collection,
            chunk_size,
            limit,
            callback,
            failure,
        } = self;
        while let Some(key) = map.next_key::<String>()? {
            if key == collection {
                map.next_value_seed(BatchSequence {
                    chunk_size,
                    limit,
                    callback: &mut *callback,
                    failure: &mut *failure,
                })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

struct BatchSequence<'a, F> {
    chunk_size: usize,
    limit: usize,
    callback: &'a mut F,
    failure: &'a mut Option<KgError>,
}

impl<'de, F> DeserializeSeed<'de> for BatchSequence<'_, F>
where
    F: FnMut(Vec<Record>) -> Result<()>,
{
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, F> Visitor<'de> for BatchSequence<'_, F>
where
    F: FnMut(Vec<Record>) -> Result<()>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "an array of record objects")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let BatchSequence {
            chunk_size,
            limit,
            callback,
            failure,
        } = self;
        let mut chunk: Vec<Record> = Vec::with_capacity(chunk_size);
        let mut emitted = 0usize;

        while let Some(record) = seq.next_element::<Record>()? {
            chunk.push(record);
            if chunk.len() == chunk_size {
                if let Err(err) = (*callback)(std::mem::take(&mut chunk)) {
                    *failure = Some(err);
                    return Err(de::Error::custom(STREAM_STOPPED));
                }
                emitted += 1;
                if limit > 0 && emitted == limit {
                    return Err(de::Error::custom(STREAM_STOPPED));
                }
            }
        }

        if !chunk.is_empty() {
            if let Err(err) = (*callback)(chunk) {
                *failure = Some(err);
                return Err(de::Error::custom(STREAM_STOPPED));
            }
        }
        Ok(())
    }
}
