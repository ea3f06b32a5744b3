//! The file iterator (§4.G) and the public `Reader` API (§6).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use bson::Document;
use chrono::{DateTime, Utc};
use num_enum::TryFromPrimitive;

use crate::chunk::{decode_chunk, Chunk};
use crate::error::{FtdcError, Result};

/// Framed-record classification (§3, §6). Persisted on the wire as the
/// `type` field of every outer document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(i32)]
pub enum DocType {
    Metadata = 0,
    MetricChunk = 1,
    PeriodicMetadata = 2,
}

/// One outer framed record, before any chunk-specific decoding (§3).
#[derive(Debug, Clone)]
pub struct FramedRecord {
    pub doc_id: Option<DateTime<Utc>>,
    pub doc_type: DocType,
    pub doc: Document,
}

/// The largest framed record this reader will accept before declaring the
/// file corrupt. Guards against a runaway allocation on a garbled size
/// prefix; 100 MiB comfortably exceeds any chunk MongoDB actually emits.
const SANITY_CAP: usize = 100 * 1024 * 1024;

/// Reads an FTDC file as a stream of framed records, metric chunks, or
/// reconstructed samples (§4.G, §6).
pub struct Reader {
    file: File,
    path: PathBuf,
    lenient: bool,
    current_metadata: Option<Rc<Document>>,
}

impl Reader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FtdcError::NotFound { path: path.clone() }
            } else {
                FtdcError::Io(e)
            }
        })?;
        Ok(Reader {
            file,
            path,
            lenient: false,
            current_metadata: None,
        })
    }

    /// When `true`, a corrupt framed record is logged and skipped instead
    /// of aborting the whole walk (§4.G, §7).
    pub fn lenient(&mut self, lenient: bool) -> &mut Self {
        self.lenient = lenient;
        self
    }

    /// Rewinds to the start of the file so a fresh top-to-bottom walk can
    /// begin; every `iter_*` call implicitly does this.
    fn rewind(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.current_metadata = None;
        Ok(())
    }

    /// Reads the next framed record's raw bytes (size prefix + body), with
    /// no interpretation of their content.
    ///
    /// Failures here are **not** resumable: a garbled size prefix means the
    /// offset of the next record can't be known, and a truncated body means
    /// there is nothing left to resynchronize against. Contrast
    /// [`decode_frame_body`], whose failures happen only after this method
    /// has already consumed exactly `size` bytes.
    fn read_raw_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut size_buf = [0u8; 4];
        match self.file.read(&mut size_buf)? {
            0 => return Ok(None), // clean EOF between records
            n if n < 4 => {
                return Err(FtdcError::Truncated {
                    context: "framed record size prefix",
                })
            }
            _ => {}
        }
        let size = u32::from_le_bytes(size_buf) as usize;
        if size < 5 || size > SANITY_CAP {
            return Err(FtdcError::corrupt("framed record size out of sane range"));
        }

        let mut rest = vec![0u8; size - 4];
        self.file.read_exact(&mut rest).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FtdcError::Truncated {
                    context: "framed record body",
                }
            } else {
                FtdcError::Io(e)
            }
        })?;

        let mut whole = size_buf.to_vec();
        whole.extend(rest);
        Ok(Some(whole))
    }

    /// Every framed record, metadata and metric chunks alike, undecoded
    /// beyond the outer BSON envelope (§4.G, §6).
    pub fn iter_framed(&mut self) -> FramedRecords<'_> {
        FramedRecords {
            reader: self,
            done: false,
            started: false,
        }
    }

    /// Decoded metric chunks, each with `chunk_id`/`metadata` attached from
    /// the surrounding stream (§4.G). Skips metadata/periodic-metadata
    /// records after folding metadata into `current_metadata`.
    pub fn iter_chunks(&mut self) -> Chunks<'_> {
        Chunks {
            inner: self.iter_framed(),
        }
    }

    /// Reconstructed samples across all chunks, streamed one document at a
    /// time, optionally filtered to a time range. `start` is inclusive;
    /// `end` is inclusive on chunk boundary — iteration stops as soon as a
    /// chunk's `chunk_id > end` (§4.F, §5, §6).
    pub fn iter_samples(&mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Samples<'_> {
        Samples {
            chunks: self.iter_chunks(),
            start,
            end,
            current: None,
            next_index: 0,
            finished: false,
        }
    }

    /// All metadata (type=0) document bodies, in file order.
    pub fn metadata(&mut self) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        for record in self.iter_framed() {
            let record = record?;
            if record.doc_type == DocType::Metadata {
                out.push(record.doc.get_document("doc").cloned().unwrap_or_default());
            }
        }
        Ok(out)
    }

    /// `(first_chunk_id, last_chunk_id)`, or `(None, None)` if the file has
    /// no metric chunks.
    pub fn time_range(&mut self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let mut first = None;
        let mut last = None;
        for record in self.iter_framed() {
            let record = record?;
            if record.doc_type == DocType::MetricChunk {
                if first.is_none() {
                    first = record.doc_id;
                }
                last = record.doc_id;
            }
        }
        Ok((first, last))
    }
}

/// Parses one framed record's already-fully-read bytes into a
/// [`FramedRecord`]. Pure function: by the time this runs, `whole` has
/// already been consumed from the file, so a failure here never loses the
/// caller's place in the stream (§4.G).
fn decode_frame_body(whole: &[u8]) -> Result<FramedRecord> {
    let doc: Document =
        bson::from_slice(whole).map_err(|e| FtdcError::corrupt_with("generic BSON decode of framed record", e))?;

    let doc_id = doc.get_datetime("_id").ok().map(|dt| dt.to_chrono());
    let type_val = doc
        .get_i32("type")
        .map_err(|_| FtdcError::corrupt("framed record missing integer 'type' field"))?;
    let doc_type =
        DocType::try_from_primitive(type_val).map_err(|_| FtdcError::corrupt("unknown framed record type"))?;

    Ok(FramedRecord { doc_id, doc_type, doc })
}

/// Lazily walks a file as a stream of [`FramedRecord`]s (§4.G, §5 — nothing
/// beyond the current record is materialized).
///
/// In lenient mode, a failure while *interpreting* an already-fully-read
/// frame (bad BSON, missing `type`, unknown `type`) is logged and skipped;
/// the next record's size prefix is always at a known offset because
/// [`Reader::read_raw_frame`] already consumed this record's declared size.
/// A failure while *reading* a frame (garbled size prefix, truncated body)
/// is not resumable — there is no known offset to resync to — and ends
/// iteration, silently in lenient mode, as an error in strict mode.
pub struct FramedRecords<'a> {
    reader: &'a mut Reader,
    done: bool,
    started: bool,
}

impl<'a> Iterator for FramedRecords<'a> {
    type Item = Result<FramedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            if let Err(e) = self.reader.rewind() {
                self.done = true;
                return Some(Err(e));
            }
        }
        let lenient = self.reader.lenient;

        loop {
            match self.reader.read_raw_frame() {
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    if lenient {
                        log::error!("skipping corrupt framed record in {}: {e}", self.reader.path.display());
                        return None;
                    }
                    return Some(Err(e));
                }
                Ok(Some(whole)) => match decode_frame_body(&whole) {
                    Ok(record) => return Some(Ok(record)),
                    Err(e) => {
                        if lenient {
                            log::error!(
                                "skipping corrupt framed record in {}: {e}; resuming at next record boundary",
                                self.reader.path.display()
                            );
                            continue;
                        }
                        self.done = true;
                        return Some(Err(e));
                    }
                },
            }
        }
    }
}

/// Lazily decodes [`FramedRecords`] into [`Chunk`]s, folding metadata
/// records into `Reader::current_metadata` as it passes over them and
/// skipping periodic-metadata records (§4.G).
pub struct Chunks<'a> {
    inner: FramedRecords<'a>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.inner.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };
            let lenient = self.inner.reader.lenient;

            match record.doc_type {
                DocType::Metadata => {
                    let metadata_doc = record.doc.get_document("doc").cloned().unwrap_or_default();
                    self.inner.reader.current_metadata = Some(Rc::new(metadata_doc));
                }
                DocType::PeriodicMetadata => {}
                DocType::MetricChunk => {
                    let Some(binary) = record.doc.get("data").and_then(|b| b.as_binary()) else {
                        if lenient {
                            log::error!(
                                "metric chunk record missing binary 'data' field in {}, skipping",
                                self.inner.reader.path.display()
                            );
                            continue;
                        }
                        return Some(Err(FtdcError::corrupt("metric chunk record missing binary 'data' field")));
                    };
                    match decode_chunk(&binary.bytes) {
                        Ok(mut chunk) => {
                            chunk.chunk_id = record.doc_id;
                            chunk.metadata = self.inner.reader.current_metadata.clone();
                            return Some(Ok(chunk));
                        }
                        Err(e) => {
                            if lenient {
                                log::error!(
                                    "skipping corrupt metric chunk at {:?} in {}: {e}",
                                    record.doc_id,
                                    self.inner.reader.path.display()
                                );
                                continue;
                            }
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}

/// Lazily reconstructs every sample of every [`Chunk`] yielded by `chunks`,
/// one document at a time, filtered to `[start, end]` on chunk boundaries
/// (§4.F, §5).
pub struct Samples<'a> {
    chunks: Chunks<'a>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    current: Option<Chunk>,
    next_index: usize,
    finished: bool,
}

impl<'a> Iterator for Samples<'a> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(chunk) = &self.current {
                if self.next_index < chunk.size() {
                    let idx = self.next_index;
                    self.next_index += 1;
                    return Some(crate::sample::reconstruct_sample(chunk, idx));
                }
                self.current = None;
            }

            match self.chunks.next() {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(Ok(chunk)) => {
                    if let (Some(start), Some(chunk_id)) = (self.start, chunk.chunk_id) {
                        if chunk_id < start {
                            continue;
                        }
                    }
                    if let (Some(end), Some(chunk_id)) = (self.end, chunk.chunk_id) {
                        if chunk_id > end {
                            self.finished = true;
                            return None;
                        }
                    }
                    self.next_index = 0;
                    self.current = Some(chunk);
                }
            }
        }
    }
}
