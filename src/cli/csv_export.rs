//! CSV export (§4.L): flattens reconstructed sample documents to dotted
//! columns and writes them as a single CSV file.

use std::collections::BTreeMap;
use std::io::Write;

use bson::{Bson, Document};

use crate::error::{FtdcError, Result};

/// Flattens one sample document into `dotted.path -> formatted value` pairs,
/// in depth-first field order. Array indices become numeric path segments,
/// matching the metric key scheme used everywhere else in this crate.
pub fn flatten_document(doc: &Document) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (key, value) in doc {
        flatten_value(key, value, &mut out);
    }
    out
}

fn flatten_value(path: &str, value: &Bson, out: &mut Vec<(String, String)>) {
    match value {
        Bson::Document(d) => {
            for (key, v) in d {
                flatten_value(&format!("{path}.{key}"), v, out);
            }
        }
        Bson::Array(a) => {
            for (i, v) in a.iter().enumerate() {
                flatten_value(&format!("{path}.{i}"), v, out);
            }
        }
        Bson::Null => {}
        other => out.push((path.to_string(), format_scalar(other))),
    }
}

fn format_scalar(value: &Bson) -> String {
    match value {
        Bson::Double(v) => v.to_string(),
        Bson::Int32(v) => v.to_string(),
        Bson::Int64(v) => v.to_string(),
        Bson::Boolean(v) => v.to_string(),
        Bson::String(v) => v.clone(),
        Bson::DateTime(v) => v.to_chrono().to_rfc3339(),
        Bson::Timestamp(t) => format!("{}:{}", t.time, t.increment),
        other => other.to_string(),
    }
}

/// Writes `samples` as a CSV file at `out`. The column set is the union of
/// every sample's flattened keys, in first-seen order, so a run of samples
/// whose schema is stable produces a stable, readable header.
pub fn write_csv(samples: &[Document], out: impl Write) -> Result<()> {
    let mut columns: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut rows: Vec<BTreeMap<String, String>> = Vec::with_capacity(samples.len());

    for doc in samples {
        let flat = flatten_document(doc);
        let mut row = BTreeMap::new();
        for (key, value) in flat {
            if seen.insert(key.clone()) {
                columns.push(key.clone());
            }
            row.insert(key, value);
        }
        rows.push(row);
    }

    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(&columns)
        .map_err(|e| FtdcError::corrupt_with("writing CSV header", e))?;
    for row in &rows {
        let record: Vec<&str> = columns
            .iter()
            .map(|c| row.get(c).map(String::as_str).unwrap_or(""))
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| FtdcError::corrupt_with("writing CSV row", e))?;
    }
    writer
        .flush()
        .map_err(|e| FtdcError::corrupt_with("flushing CSV writer", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn flattens_nested_documents_and_arrays() {
        let d = doc! { "srv": { "conns": 10i32, "hist": [1i32, 2, 3] } };
        let flat = flatten_document(&d);
        let keys: Vec<&str> = flat.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["srv.conns", "srv.hist.0", "srv.hist.1", "srv.hist.2"]);
    }

    #[test]
    fn writes_header_as_union_of_all_sample_keys() {
        let a = doc! { "x": 1i32 };
        let b = doc! { "x": 2i32, "y": 3i32 };
        let mut buf = Vec::new();
        write_csv(&[a, b], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "x,y");
        assert_eq!(lines.next().unwrap(), "1,");
        assert_eq!(lines.next().unwrap(), "2,3");
    }
}
