//! Virtual files embedded in a capture as runs of file-chunk records
//!
//! Producers may store a file gzip-compressed under `<path>.gz`. Lookups by
//! the plain path fall back to the compressed copy and inflate it on read.

use super::Document;
use crate::capture::Record;
use flate2::read::GzDecoder;
use std::io::{self, Read};

const GZ_SUFFIX: &str = ".gz";

/// A file reassembled from its chunk records
#[derive(Debug, Clone)]
pub struct DocumentFile<'a> {
    document: &'a Document,
    path: String,
    compressed: bool,
    /// Frame positions of the chunks, in order
    chunks: Vec<u32>,
}

impl<'a> DocumentFile<'a> {
    /// Path the file was requested by, without any `.gz` suffix
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True when the stored copy is gzip-compressed
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Number of chunk records the file spans
    #[must_use]
    pub fn n_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Stored size in bytes, before any decompression
    #[must_use]
    pub fn stored_size(&self) -> usize {
        self.raw_chunks().map(<[u8]>::len).sum()
    }

    fn raw_chunks(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        let document = self.document;
        self.chunks.iter().filter_map(move |&position| match document.frame(position)?.record {
            Record::FileChunk(chunk) => Some(chunk.data),
            _ => None,
        })
    }

    /// File contents, inflated when stored compressed
    ///
    /// # Errors
    /// Returns an error if a compressed copy is not valid gzip.
    pub fn bytes(&self) -> io::Result<Vec<u8>> {
        let mut stored = Vec::with_capacity(self.stored_size());
        for data in self.raw_chunks() {
            stored.extend_from_slice(data);
        }
        if !self.compressed {
            return Ok(stored);
        }

        let mut inflated = Vec::with_capacity(stored.len() * 4);
        GzDecoder::new(stored.as_slice()).read_to_end(&mut inflated)?;
        Ok(inflated)
    }

    /// File contents as text; invalid UTF-8 is replaced
    ///
    /// # Errors
    /// See [`bytes`](Self::bytes).
    pub fn read_to_string(&self) -> io::Result<String> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }
}

impl Document {
    /// Find the virtual file recorded for `path`
    ///
    /// An uncompressed copy wins over `<path>.gz`.
    #[must_use]
    pub fn lookup_file(&self, path: &str) -> Option<DocumentFile<'_>> {
        if let Some(file) = self.collect_file(path, path, false) {
            return Some(file);
        }
        if path.ends_with(GZ_SUFFIX) {
            return None;
        }
        self.collect_file(path, &format!("{path}{GZ_SUFFIX}"), true)
    }

    /// Virtual file paths, sorted, with `.gz` stripped and duplicates removed
    #[must_use]
    pub fn list_files(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .files
            .keys()
            .map(|path| path.strip_suffix(GZ_SUFFIX).unwrap_or(path).to_string())
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }

    /// Gather the chunk run for `stored_path` starting at its first chunk
    fn collect_file(
        &self,
        path: &str,
        stored_path: &str,
        compressed: bool,
    ) -> Option<DocumentFile<'_>> {
        let &first = self.files.get(stored_path)?;
        let index = &self.categories.file_chunks;
        let start = index.first_at_or_after(first)?;

        let mut chunks = Vec::new();
        for position in (start..index.len()).filter_map(|nth| index.get(nth)) {
            let Some(frame) = self.frame(position) else { continue };
            let Record::FileChunk(chunk) = &frame.record else { continue };
            if chunk.path != stored_path {
                continue;
            }
            chunks.push(position);
            if chunk.is_last {
                break;
            }
        }

        Some(DocumentFile { document: self, path: path.to_string(), compressed, chunks })
    }
}
