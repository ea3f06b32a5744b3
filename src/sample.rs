//! The sample reconstructor (§4.F): rebuilds one original sample document
//! from a decoded [`Chunk`] and a sample index.

use bson::{Bson, Document};

use crate::chunk::Chunk;
use crate::error::{FtdcError, Result};
use crate::record::OriginalType;
use crate::scalar::restore_float;

/// Reconstructs the sample at `sample_index` (0 = the reference sample,
/// `1..npoints` = successive delta-reconstructed samples) as a `bson::Document`.
pub fn reconstruct_sample(chunk: &Chunk, sample_index: usize) -> Result<Document> {
    if sample_index >= chunk.npoints {
        return Err(FtdcError::RangeError {
            index: sample_index,
            npoints: chunk.npoints,
        });
    }

    let mut doc = chunk.reference.clone();

    for metric in &chunk.metrics {
        // The `.inc` half of a timestamp pair is folded into its sibling's
        // write below; it never gets its own document write.
        if metric.original_type == OriginalType::TimestampInc {
            continue;
        }

        let value = metric.values[sample_index];
        let path: Vec<&str> = metric
            .parent_path
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(metric.key_name.as_str()))
            .collect();

        let bson_value = match metric.original_type {
            OriginalType::F64 => Bson::Double(restore_float(value)),
            OriginalType::I32 => Bson::Int32(value as i32),
            OriginalType::I64 => Bson::Int64(value),
            OriginalType::Bool => Bson::Boolean(value != 0),
            OriginalType::DatetimeMs => Bson::DateTime(bson::DateTime::from_millis(value)),
            OriginalType::TimestampSec => {
                let inc = find_inc_sibling(chunk, metric, sample_index).unwrap_or(0);
                Bson::Timestamp(bson::Timestamp {
                    time: value as u32,
                    increment: inc as u32,
                })
            }
            OriginalType::TimestampInc => unreachable!("filtered out above"),
        };

        set_nested_value(&mut doc, &path, bson_value);
    }

    Ok(doc)
}

fn find_inc_sibling(chunk: &Chunk, metric: &crate::record::Metric, sample_index: usize) -> Option<i64> {
    let inc_key = format!("{}.inc", metric.dotted_key());
    chunk
        .metrics
        .iter()
        .find(|m| m.original_type == OriginalType::TimestampInc && m.dotted_key() == inc_key)
        .map(|m| m.values[sample_index])
}

/// Writes `value` into `doc` at `path`, creating intermediate documents as
/// needed. Array segments in `path` are numeric strings and are interpreted
/// as indices; the array is extended with `Bson::Null` if a metric
/// addresses an index past the reference tree's current length (should not
/// happen given the reference already has every element, but the setter is
/// shared with sparser reconstruction paths so it stays defensive).
fn set_nested_value(doc: &mut Document, path: &[&str], value: Bson) {
    match path.split_first() {
        None => {}
        Some((key, [])) => {
            doc.insert(*key, value);
        }
        Some((key, rest)) => {
            let entry = doc
                .entry(key.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            set_in_bson(entry, rest, value);
        }
    }
}

/// Recursive helper operating directly on `Bson` so the same code handles
/// both document and array containers uniformly.
fn set_in_bson(current: &mut Bson, path: &[&str], value: Bson) {
    match path.split_first() {
        None => {}
        Some((key, [])) => assign_leaf(current, key, value),
        Some((key, rest)) => {
            let child = navigate_or_create(current, key);
            set_in_bson(child, rest, value);
        }
    }
}

fn assign_leaf(container: &mut Bson, key: &str, value: Bson) {
    match container {
        Bson::Document(d) => {
            d.insert(key, value);
        }
        Bson::Array(a) => {
            if let Ok(idx) = key.parse::<usize>() {
                while a.len() <= idx {
                    a.push(Bson::Null);
                }
                a[idx] = value;
            }
        }
        _ => {}
    }
}

fn navigate_or_create<'a>(container: &'a mut Bson, key: &str) -> &'a mut Bson {
    match container {
        Bson::Document(d) => d
            .entry(key.to_string())
            .or_insert_with(|| Bson::Document(Document::new())),
        Bson::Array(a) => {
            let idx: usize = key.parse().unwrap_or(0);
            while a.len() <= idx {
                a.push(Bson::Document(Document::new()));
            }
            &mut a[idx]
        }
        _ => container,
    }
}
