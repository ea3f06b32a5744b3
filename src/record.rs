//! The record scanner (§4.C): a hand-rolled, duplicate-preserving walk of a
//! BSON-shaped embedded record.
//!
//! This must never be replaced with a call into the `bson` crate's decoder
//! (used elsewhere in this codebase for metadata documents and the
//! reconstruction template). A dictionary-backed decoder silently collapses
//! repeated field names, and FTDC reference samples rely on the exact,
//! ordered, duplicate-preserving walk the producing server performed.

use crate::error::{FtdcError, Result};
use crate::scalar::normalize_float;

/// The original BSON scalar type a [`Metric`] was extracted from, needed to
/// restore the correct scalar when reconstructing a sample (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginalType {
    F64,
    I32,
    I64,
    Bool,
    DatetimeMs,
    TimestampSec,
    TimestampInc,
}

/// One numeric time series extracted from a reference sample (§3).
#[derive(Debug, Clone)]
pub struct Metric {
    pub parent_path: Vec<String>,
    pub key_name: String,
    pub values: Vec<i64>,
    pub original_type: OriginalType,
}

impl Metric {
    pub(crate) fn new(parent_path: &[String], key_name: impl Into<String>, value: i64, ty: OriginalType) -> Self {
        Metric {
            parent_path: parent_path.to_vec(),
            key_name: key_name.into(),
            values: vec![value],
            original_type: ty,
        }
    }

    /// The fully-qualified dotted key, e.g. `serverStatus.connections.current`.
    pub fn dotted_key(&self) -> String {
        if self.parent_path.is_empty() {
            self.key_name.clone()
        } else {
            let mut key = self.parent_path.join(".");
            key.push('.');
            key.push_str(&self.key_name);
            key
        }
    }
}

/// Scans the raw bytes of a reference sample, returning metrics in
/// left-to-right depth-first order with `values = [reference_value]`.
pub fn scan_reference(bytes: &[u8]) -> Result<Vec<Metric>> {
    let mut cur = Cursor::new(bytes);
    let metrics = scan_document(&mut cur, &[])?;
    Ok(metrics)
}

/// A plain byte-slice cursor. Kept separate from `bytes::Bytes` because the
/// recursive document walk needs cheap position bookkeeping (for the
/// per-document size check) rather than a consuming `Buf`.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(FtdcError::Truncated { context });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn skip(&mut self, n: usize, context: &'static str) -> Result<()> {
        self.take(n, context)?;
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "type byte")?[0])
    }

    fn read_i32_le(&mut self) -> Result<i32> {
        let b = self.take(4, "int32")?;
        Ok(i32::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.take(4, "uint32")?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_i64_le(&mut self) -> Result<i64> {
        let b = self.take(8, "int64")?;
        Ok(i64::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_f64_le(&mut self) -> Result<f64> {
        let b = self.take(8, "float64")?;
        Ok(f64::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_cstring(&mut self) -> Result<String> {
        let start = self.pos;
        loop {
            if self.pos >= self.buf.len() {
                return Err(FtdcError::Truncated { context: "cstring" });
            }
            if self.buf[self.pos] == 0 {
                break;
            }
            self.pos += 1;
        }
        let s = String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned();
        self.pos += 1; // consume the terminating 0x00
        Ok(s)
    }
}

/// Scans one document or array (the two are wire-identical: a size prefix
/// followed by elements and a terminator) starting at the cursor's current
/// position, which it must be for it to recurse uniformly into both.
fn scan_document(cur: &mut Cursor, parent_path: &[String]) -> Result<Vec<Metric>> {
    let start = cur.pos;
    let declared_size = cur.read_u32_le()? as usize;
    let end = start + declared_size;
    if declared_size < 5 || end > cur.buf.len() {
        return Err(FtdcError::corrupt("embedded record size prefix out of range"));
    }

    let mut metrics = Vec::new();
    loop {
        let type_byte = cur.read_u8()?;
        if type_byte == 0x00 {
            break;
        }
        let field_name = cur.read_cstring()?;
        parse_element(cur, type_byte, &field_name, parent_path, &mut metrics)?;
    }

    if cur.pos != end {
        return Err(FtdcError::corrupt(
            "embedded record size prefix did not match bytes consumed to terminator",
        ));
    }

    Ok(metrics)
}

fn parse_element(
    cur: &mut Cursor,
    type_byte: u8,
    field_name: &str,
    parent_path: &[String],
    out: &mut Vec<Metric>,
) -> Result<()> {
    match type_byte {
        0x01 => {
            // double
            let v = cur.read_f64_le()?;
            out.push(Metric::new(parent_path, field_name, normalize_float(v), OriginalType::F64));
        }
        0x02 => {
            // string: int32 length (includes trailing NUL) + bytes
            let len = cur.read_i32_le()? as usize;
            cur.skip(len, "string payload")?;
        }
        0x03 | 0x04 => {
            // embedded document / array: identical wire shape
            let mut nested_path = parent_path.to_vec();
            nested_path.push(field_name.to_string());
            let nested = scan_document(cur, &nested_path)?;
            out.extend(nested);
        }
        0x05 => {
            // binary: int32 length + 1 subtype byte + payload
            let len = cur.read_i32_le()? as usize;
            cur.skip(1, "binary subtype")?;
            cur.skip(len, "binary payload")?;
        }
        0x06 => {
            // undefined (deprecated): no payload
        }
        0x07 => {
            // ObjectId: 12 raw bytes, never extracted as a metric
            cur.skip(12, "object id")?;
        }
        0x08 => {
            let b = cur.read_u8()?;
            let value = if b != 0 { 1 } else { 0 };
            out.push(Metric::new(parent_path, field_name, value, OriginalType::Bool));
        }
        0x09 => {
            let millis = cur.read_i64_le()?;
            out.push(Metric::new(parent_path, field_name, millis, OriginalType::DatetimeMs));
        }
        0x0A => {
            // null: no payload
        }
        0x0B => {
            // regex: pattern cstring + options cstring
            cur.read_cstring()?;
            cur.read_cstring()?;
        }
        0x0C => {
            // DBPointer (deprecated): string + 12-byte object id
            let len = cur.read_i32_le()? as usize;
            cur.skip(len, "dbpointer namespace")?;
            cur.skip(12, "dbpointer object id")?;
        }
        0x0D | 0x0E => {
            // JavaScript code / symbol (deprecated): string
            let len = cur.read_i32_le()? as usize;
            cur.skip(len, "code or symbol payload")?;
        }
        0x0F => {
            // JavaScript code with scope: total length includes itself
            let total_len = cur.read_i32_le()? as usize;
            if total_len < 4 {
                return Err(FtdcError::corrupt("code-with-scope length underflow"));
            }
            cur.skip(total_len - 4, "code-with-scope payload")?;
        }
        0x10 => {
            let v = cur.read_i32_le()?;
            out.push(Metric::new(parent_path, field_name, i64::from(v), OriginalType::I32));
        }
        0x11 => {
            // Timestamp: increment first on the wire, then seconds.
            let inc = cur.read_u32_le()?;
            let secs = cur.read_u32_le()?;
            out.push(Metric::new(parent_path, field_name, i64::from(secs), OriginalType::TimestampSec));
            out.push(Metric::new(
                parent_path,
                format!("{field_name}.inc"),
                i64::from(inc),
                OriginalType::TimestampInc,
            ));
        }
        0x12 => {
            let v = cur.read_i64_le()?;
            out.push(Metric::new(parent_path, field_name, v, OriginalType::I64));
        }
        0x13 => {
            // Decimal128: 16 raw bytes
            cur.skip(16, "decimal128")?;
        }
        0x7F | 0xFF => {
            // MaxKey / MinKey: no payload
        }
        other => {
            return Err(FtdcError::UnsupportedType {
                type_byte: other,
                field: field_name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cstring(s: &str) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.push(0);
        v
    }

    /// Builds a minimal top-level BSON document from pre-encoded elements
    /// (type byte + name + value bytes, each already assembled by the
    /// caller), wrapping them with the size prefix and terminator.
    fn doc(elements: &[u8]) -> Vec<u8> {
        let mut body = elements.to_vec();
        body.push(0x00);
        let size = (body.len() + 4) as u32;
        let mut out = size.to_le_bytes().to_vec();
        out.extend(body);
        out
    }

    #[test]
    fn single_int32_scalar() {
        let mut elem = vec![0x10];
        elem.extend(cstring("count"));
        elem.extend(100i32.to_le_bytes());
        let bytes = doc(&elem);

        let metrics = scan_reference(&bytes).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].dotted_key(), "count");
        assert_eq!(metrics[0].values, vec![100]);
        assert_eq!(metrics[0].original_type, OriginalType::I32);
    }

    #[test]
    fn timestamp_expands_to_two_metrics_in_order() {
        let mut elem = vec![0x11];
        elem.extend(cstring("t"));
        elem.extend(7u32.to_le_bytes()); // increment (first on wire)
        elem.extend(1000u32.to_le_bytes()); // seconds
        let bytes = doc(&elem);

        let metrics = scan_reference(&bytes).unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].dotted_key(), "t");
        assert_eq!(metrics[0].original_type, OriginalType::TimestampSec);
        assert_eq!(metrics[0].values, vec![1000]);
        assert_eq!(metrics[1].dotted_key(), "t.inc");
        assert_eq!(metrics[1].original_type, OriginalType::TimestampInc);
        assert_eq!(metrics[1].values, vec![7]);
    }

    #[test]
    fn float_stores_normalized_bit_pattern() {
        let mut elem = vec![0x01];
        elem.extend(cstring("x"));
        elem.extend(1.5f64.to_le_bytes());
        let bytes = doc(&elem);

        let metrics = scan_reference(&bytes).unwrap();
        assert_eq!(metrics[0].values, vec![4_609_434_218_613_702_656]);
    }

    #[test]
    fn object_id_is_skipped_without_shifting_index() {
        let mut oid_elem = vec![0x07];
        oid_elem.extend(cstring("_id"));
        oid_elem.extend([0u8; 12]);

        let mut next_elem = vec![0x10];
        next_elem.extend(cstring("n"));
        next_elem.extend(42i32.to_le_bytes());

        let mut body = oid_elem;
        body.extend(next_elem);
        let bytes = doc(&body);

        let metrics = scan_reference(&bytes).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].dotted_key(), "n");
    }

    #[test]
    fn duplicate_top_level_keys_preserved() {
        let mut first = vec![0x10];
        first.extend(cstring("dup"));
        first.extend(1i32.to_le_bytes());

        let mut second = vec![0x10];
        second.extend(cstring("dup"));
        second.extend(2i32.to_le_bytes());

        let mut body = first;
        body.extend(second);
        let bytes = doc(&body);

        let metrics = scan_reference(&bytes).unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].values, vec![1]);
        assert_eq!(metrics[1].values, vec![2]);
    }

    #[test]
    fn nested_document_and_array_keys() {
        // srv: { conns: 10, hist: [1, 2, 3] }
        let mut conns = vec![0x10];
        conns.extend(cstring("conns"));
        conns.extend(10i32.to_le_bytes());

        let mut arr_elems = Vec::new();
        for (i, v) in [1i32, 2, 3].iter().enumerate() {
            let mut e = vec![0x10];
            e.extend(cstring(&i.to_string()));
            e.extend(v.to_le_bytes());
            arr_elems.extend(e);
        }
        let arr_bytes = doc(&arr_elems);

        let mut hist_elem = vec![0x04];
        hist_elem.extend(cstring("hist"));
        hist_elem.extend(arr_bytes);

        let mut srv_body = conns;
        srv_body.extend(hist_elem);
        let srv_bytes = doc(&srv_body);

        let mut top_elem = vec![0x03];
        top_elem.extend(cstring("srv"));
        top_elem.extend(srv_bytes);

        let bytes = doc(&top_elem);
        let metrics = scan_reference(&bytes).unwrap();

        let keys: Vec<_> = metrics.iter().map(Metric::dotted_key).collect();
        assert_eq!(
            keys,
            vec!["srv.conns", "srv.hist.0", "srv.hist.1", "srv.hist.2"]
        );
    }

    #[test]
    fn unsupported_type_byte_is_fatal() {
        let mut elem = vec![0xEE];
        elem.extend(cstring("weird"));
        let bytes = doc(&elem);

        let err = scan_reference(&bytes).unwrap_err();
        assert!(matches!(err, FtdcError::UnsupportedType { type_byte: 0xEE, .. }));
    }

    #[test]
    fn size_prefix_mismatch_is_corrupt() {
        let mut elem = vec![0x10];
        elem.extend(cstring("n"));
        elem.extend(1i32.to_le_bytes());
        let mut bytes = doc(&elem);
        // Corrupt the declared size so it no longer matches consumed bytes.
        let wrong_size = (bytes.len() as u32) + 4;
        bytes[0..4].copy_from_slice(&wrong_size.to_le_bytes());

        let err = scan_reference(&bytes).unwrap_err();
        assert!(matches!(err, FtdcError::Corrupt { .. }));
    }
}
