//! The delta-matrix decoder (§4.E): `metrics_count × deltas_count` signed
//! deltas, varint-encoded, with a zero run-length counter that persists
//! across metric-row boundaries.

use bytes::Buf;

use crate::error::Result;
use crate::varint::{read_varint, varint_to_signed};

/// Decodes the metric-major delta matrix. Returns `deltas[metric][sample]`.
///
/// The `zeros_remaining` counter is shared across the whole matrix by
/// design (§4.E): a zero run started near the end of one metric's row does
/// not reset when the next row begins, it keeps draining.
pub fn decode_matrix(src: &mut impl Buf, metrics_count: usize, deltas_count: usize) -> Result<Vec<Vec<i64>>> {
    let mut matrix = Vec::with_capacity(metrics_count);
    let mut zeros_remaining: u64 = 0;

    for _ in 0..metrics_count {
        let mut row = Vec::with_capacity(deltas_count);
        for _ in 0..deltas_count {
            if zeros_remaining > 0 {
                row.push(0);
                zeros_remaining -= 1;
                continue;
            }

            let v = read_varint(src)?;
            if v == 0 {
                zeros_remaining = read_varint(src)?;
                row.push(0);
            } else {
                row.push(varint_to_signed(v));
            }
        }
        matrix.push(row);
    }

    Ok(matrix)
}

/// Reconstructs absolute values from a reference value and a delta row,
/// wrapping in 64-bit two's complement (§4.D step 8 — counters may
/// legitimately wrap, and that wrap is intentional, not an error).
pub fn undelta(reference: i64, deltas: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(deltas.len() + 1);
    let mut acc = reference;
    out.push(acc);
    for &d in deltas {
        acc = acc.wrapping_add(d);
        out.push(acc);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varint::write_varint;
    use bytes::Bytes;

    fn encode_varints(values: &[u64]) -> Vec<u8> {
        let mut out = Vec::new();
        for &v in values {
            out.extend(write_varint(v));
        }
        out
    }

    #[test]
    fn s1_single_scalar_three_deltas() {
        // deltas [5, 3, -2] -> -2 as u64 bit pattern
        let wire = encode_varints(&[5, 3, (-2i64) as u64]);
        let mut buf = Bytes::from(wire);
        let matrix = decode_matrix(&mut buf, 1, 3).unwrap();
        let values = undelta(100, &matrix[0]);
        assert_eq!(values, vec![100, 105, 108, 106]);
    }

    #[test]
    fn s2_rle_run() {
        // delta row [5, 0,0,0, 5] encoded as varint(5), varint(0), varint(2), varint(5)
        let wire = encode_varints(&[5, 0, 2, 5]);
        let mut buf = Bytes::from(wire);
        let matrix = decode_matrix(&mut buf, 1, 5).unwrap();
        let values = undelta(50, &matrix[0]);
        assert_eq!(values, vec![50, 55, 55, 55, 55, 60]);
    }

    #[test]
    fn s3_cross_metric_rle() {
        // varint(0), varint(5): one zero now, five more leftover -> six
        // total zeros split 3/3 across two metrics of width 3.
        let wire = encode_varints(&[0, 5]);
        let mut buf = Bytes::from(wire);
        let matrix = decode_matrix(&mut buf, 2, 3).unwrap();
        assert_eq!(matrix, vec![vec![0, 0, 0], vec![0, 0, 0]]);
    }

    #[test]
    fn rle_leftover_spans_exactly_into_next_row_start() {
        // Row 0 (width 2): varint(0), varint(2) -> 3 zeros requested, only 2 fit
        // in this row, 1 leftover must open row 1 without reading a fresh varint.
        // Row 1 then reads a real varint for its second slot.
        let wire = encode_varints(&[0, 2, 9]);
        let mut buf = Bytes::from(wire);
        let matrix = decode_matrix(&mut buf, 2, 2).unwrap();
        assert_eq!(matrix[0], vec![0, 0]);
        assert_eq!(matrix[1][0], 0);
        assert_eq!(matrix[1][1], 9);
    }

    #[test]
    fn undelta_law_matches_reference_plus_running_sum() {
        let reference = 1_000i64;
        let deltas = vec![1, -1, 0, 5, -10];
        let values = undelta(reference, &deltas);
        assert_eq!(values[0], reference);
        for k in 0..deltas.len() {
            assert_eq!(values[k + 1], values[k].wrapping_add(deltas[k]));
        }
    }

    #[test]
    fn undelta_wraps_on_overflow() {
        let values = undelta(i64::MAX, &[1]);
        assert_eq!(values, vec![i64::MAX, i64::MIN]);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut buf = Bytes::from(vec![0x05u8]); // one delta, but two are expected
        let err = decode_matrix(&mut buf, 1, 2).unwrap_err();
        assert!(matches!(err, crate::error::FtdcError::Truncated { .. }));
    }
}
