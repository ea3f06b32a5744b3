//! JSON export (§4.M): serializes reconstructed sample documents to JSON,
//! either as newline-delimited objects or as a single JSON array.

use std::io::Write;

use bson::Document;

use crate::error::{FtdcError, Result};

pub struct JsonExportOptions {
    pub pretty: bool,
    pub array: bool,
}

pub fn write_json(samples: &[Document], options: &JsonExportOptions, mut out: impl Write) -> Result<()> {
    if options.array {
        let values: Vec<serde_json::Value> = samples
            .iter()
            .map(|d| serde_json::to_value(d).map_err(|e| FtdcError::corrupt_with("converting sample to JSON value", e)))
            .collect::<Result<_>>()?;
        let text = if options.pretty {
            serde_json::to_string_pretty(&values)
        } else {
            serde_json::to_string(&values)
        }
        .map_err(|e| FtdcError::corrupt_with("serializing JSON array", e))?;
        writeln!(out, "{text}").map_err(FtdcError::Io)?;
        return Ok(());
    }

    for doc in samples {
        let value = serde_json::to_value(doc)
            .map_err(|e| FtdcError::corrupt_with("converting sample to JSON value", e))?;
        let text = if options.pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        }
        .map_err(|e| FtdcError::corrupt_with("serializing JSON line", e))?;
        writeln!(out, "{text}").map_err(FtdcError::Io)?;
    }
    Ok(())
}
