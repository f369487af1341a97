use bzip2::{Decompress, Status};
use std::fs::File;
use std::io::{self, BufRead, Read};
use std::path::Path;
use tracing::debug;

/// Spare output capacity guaranteed before each call into the decoder.
const MIN_OUTPUT_SPARE: usize = 64 * 1024;

/// Streams decompressed bytes out of a bzip2 source, one compressed window at a time.
///
/// Each [`read`](ByteStreamer::read) pulls at most `window_size` compressed bytes
/// from the source and returns everything they decompress to, which can be more
/// or less than what the caller asked for. An empty result together with
/// [`is_exhausted`](ByteStreamer::is_exhausted) marks the end of the stream.
///
/// Concatenated bzip2 streams (multistream dumps) are decoded back to back.
pub struct ByteStreamer<R> {
    source: R,
    decoder: Decompress,
    window: Vec<u8>,
    window_size: usize,
    exhausted: bool,
    streams_finished: u64,
    // BufRead state
    pending: Vec<u8>,
    pos: usize,
}

impl ByteStreamer<File> {
    pub fn open(path: impl AsRef<Path>, window_size: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file, window_size))
    }
}

impl<R: Read> ByteStreamer<R> {
    pub fn new(source: R, window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            source,
            decoder: Decompress::new(false),
            window: Vec::with_capacity(window_size),
            window_size,
            exhausted: false,
            streams_finished: 0,
            pending: Vec::new(),
            pos: 0,
        }
    }

    /// Decompresses the next compressed window. `_requested` is a hint only.
    pub fn read(&mut self, _requested: usize) -> io::Result<Vec<u8>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        self.window.clear();
        (&mut self.source)
            .take(self.window_size as u64)
            .read_to_end(&mut self.window)?;

        if self.window.is_empty() {
            self.exhausted = true;
            if self.decoder.total_in() > 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "compressed archive ends in the middle of a bzip2 stream",
                ));
            }
            debug!(streams = self.streams_finished, "Compressed input exhausted");
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(self.window.len().saturating_mul(4));
        let mut input: &[u8] = &self.window;

        loop {
            if out.capacity() - out.len() < MIN_OUTPUT_SPARE {
                out.reserve(self.window.len().max(MIN_OUTPUT_SPARE));
            }

            let before = self.decoder.total_in();
            let status = self
                .decoder
                .decompress_vec(input, &mut out)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let consumed = (self.decoder.total_in() - before) as usize;
            input = &input[consumed..];

            if matches!(status, Status::StreamEnd) {
                self.streams_finished += 1;
                self.decoder = Decompress::new(false);
            }

            // Output left room to spare, so the decoder has nothing buffered.
            if input.is_empty() && out.len() < out.capacity() {
                break;
            }
        }

        Ok(out)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn streams_finished(&self) -> u64 {
        self.streams_finished
    }
}

impl<R: Read> Read for ByteStreamer<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for ByteStreamer<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.pending.len() && !self.exhausted {
            self.pending = Self::read(self, self.window_size)?;
            self.pos = 0;
        }
        Ok(&self.pending[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.pending.len());
    }
}
