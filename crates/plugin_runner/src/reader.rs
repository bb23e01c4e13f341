use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK_SIZE_BYTES: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundedLine {
    /// One record without its delimiter. `terminated` is false only for a final
    /// record that ended at EOF without a newline.
    Line {
        line_number: usize,
        bytes: Vec<u8>,
        terminated: bool,
    },
    /// Terminal: the reader yields nothing after this. The rest of the stream
    /// can still be consumed with [`AsyncBoundedLineReader::discard_to_end`].
    LineTooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
    },
    /// Terminal: the reader yields nothing after this.
    IoError { line_number: usize, message: String },
}

/// Newline-delimited reader with a hard cap on record size.
///
/// The line buffer starts at `initial_line_bytes` and grows as needed up to
/// `max_line_bytes`. Unlike a lenient scanner, exceeding the cap ends the stream.
pub struct AsyncBoundedLineReader<R> {
    reader: R,
    initial_line_bytes: usize,
    max_line_bytes: usize,
    chunk: Box<[u8]>,
    chunk_pos: usize,
    chunk_len: usize,
    current_line: Vec<u8>,
    line_number: usize,
    done: bool,
}

impl<R: AsyncRead + Unpin> AsyncBoundedLineReader<R> {
    pub fn new(reader: R, initial_line_bytes: usize, max_line_bytes: usize) -> Self {
        let initial_line_bytes = initial_line_bytes.min(max_line_bytes);
        Self {
            reader,
            initial_line_bytes,
            max_line_bytes,
            chunk: vec![0u8; CHUNK_SIZE_BYTES].into_boxed_slice(),
            chunk_pos: 0,
            chunk_len: 0,
            current_line: Vec::with_capacity(initial_line_bytes),
            line_number: 0,
            done: false,
        }
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    fn take_line(&mut self, terminated: bool) -> BoundedLine {
        self.line_number += 1;
        let bytes = std::mem::take(&mut self.current_line);
        self.current_line.reserve(self.initial_line_bytes);
        BoundedLine::Line {
            line_number: self.line_number,
            bytes,
            terminated,
        }
    }

    fn too_long(&mut self, observed_bytes: usize) -> BoundedLine {
        self.line_number += 1;
        self.done = true;
        self.current_line = Vec::new();
        BoundedLine::LineTooLong {
            line_number: self.line_number,
            observed_bytes,
            max_line_bytes: self.max_line_bytes,
        }
    }

    /// Reads the remainder of the stream without buffering it, returning the number
    /// of bytes dropped. Keeps the pipe open so the writer is never cut off after
    /// an oversized line.
    pub async fn discard_to_end(&mut self) -> io::Result<u64> {
        let mut discarded = (self.chunk_len - self.chunk_pos) as u64;
        self.done = true;
        self.chunk_pos = 0;
        self.chunk_len = 0;
        loop {
            match self.reader.read(&mut self.chunk).await {
                Ok(0) => return Ok(discarded),
                Ok(n) => discarded += n as u64,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn next_line(&mut self) -> Option<BoundedLine> {
        if self.done {
            return None;
        }

        loop {
            if self.chunk_pos >= self.chunk_len {
                self.chunk_pos = 0;
                match self.reader.read(&mut self.chunk).await {
                    Ok(0) => {
                        self.done = true;
                        self.chunk_len = 0;
                        if self.current_line.is_empty() {
                            return None;
                        }
                        return Some(self.take_line(false));
                    }
                    Ok(n) => self.chunk_len = n,
                    Err(err) => {
                        self.done = true;
                        self.line_number += 1;
                        return Some(BoundedLine::IoError {
                            line_number: self.line_number,
                            message: err.to_string(),
                        });
                    }
                }
            }

            let slice = &self.chunk[self.chunk_pos..self.chunk_len];
            let newline_idx = slice.iter().position(|b| *b == b'\n');
            let segment_len = newline_idx.unwrap_or(slice.len());

            let observed = self.current_line.len().saturating_add(segment_len);
            if observed > self.max_line_bytes {
                return Some(self.too_long(observed));
            }

            let end = self.chunk_pos + segment_len;
            self.current_line
                .extend_from_slice(&self.chunk[self.chunk_pos..end]);

            match newline_idx {
                Some(_) => {
                    self.chunk_pos = end + 1;
                    return Some(self.take_line(true));
                }
                None => self.chunk_pos = self.chunk_len,
            }
        }
    }
}
