use std::{
    fs::File,
    io::{self, BufRead, BufReader, Seek, SeekFrom},
    path::Path,
};

/// A line-oriented cursor over the training data that can be rewound.
pub struct LineSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl LineSource<BufReader<File>> {
    /// Opens the file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead + Seek> LineSource<R> {
    /// Creates a new `LineSource`.
    ///
    /// # Arguments
    /// * `reader` - The underlying reader, positioned at the first line to read.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// The current byte offset.
    pub fn position(&mut self) -> io::Result<u64> {
        self.reader.stream_position()
    }

    /// Moves the cursor back to an offset previously returned by `position`.
    pub fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    /// Reads the next line without its terminator, invalid utf-8 is replaced.
    ///
    /// # Returns
    /// `None` at the end of the data.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }

        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }

        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    /// Whether there's nothing left to read.
    pub fn at_eof(&mut self) -> io::Result<bool> {
        Ok(self.reader.fill_buf()?.is_empty())
    }
}
