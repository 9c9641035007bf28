use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;

/// Unified input reader that handles both file and pipe input with buffered reading.
///
/// Bytes looked at with [`InputReader::peek`] are replayed by the following
/// reads, so a stream can be probed before it is processed, even from stdin.
pub struct InputReader {
    reader: Box<dyn Read>,
    is_pipe: bool,
    replay: Vec<u8>,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path_str = input_path.as_ref().to_string_lossy();
        let is_pipe = path_str == "-";

        let reader: Box<dyn Read> = if is_pipe {
            Box::new(io::stdin().lock())
        } else {
            let file = File::open(input_path)?;
            Box::new(BufReader::new(file))
        };

        Ok(Self {
            reader,
            is_pipe,
            replay: Vec::new(),
        })
    }

    /// Returns up to `len` bytes from the start of the remaining input
    /// without consuming them. Shorter only at end of input.
    pub fn peek(&mut self, len: usize) -> Result<&[u8]> {
        while self.replay.len() < len {
            let filled = self.replay.len();
            self.replay.resize(len, 0);
            let bytes_read = self.reader.read(&mut self.replay[filled..])?;
            self.replay.truncate(filled + bytes_read);
            if bytes_read == 0 {
                break;
            }
        }

        Ok(&self.replay[..self.replay.len().min(len)])
    }

    /// Read a chunk of data into the provided buffer
    /// Returns the number of bytes read, 0 indicates EOF
    pub fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if !self.replay.is_empty() {
            let n = buffer.len().min(self.replay.len());
            buffer[..n].copy_from_slice(&self.replay[..n]);
            self.replay.drain(..n);
            return Ok(n);
        }

        let bytes_read = self.reader.read(buffer)?;
        Ok(bytes_read)
    }

    /// Check if this is pipe input
    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Process data in chunks using a callback function
    /// The callback receives each chunk and should return Ok(true) to continue or Ok(false) to stop
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let bytes_read = self.read_chunk(&mut buffer)?;
            if bytes_read == 0 {
                break; // EOF
            }

            if !callback(&buffer[..bytes_read])? {
                break;
            }
        }

        Ok(())
    }
}

#[test]
fn peeked_bytes_are_replayed() -> Result<()> {
    let path = std::env::temp_dir().join(format!("vvcd-input-{}.266", std::process::id()));
    let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    std::fs::write(&path, &data)?;

    let mut reader = InputReader::new(&path)?;
    assert!(!reader.is_pipe());
    assert_eq!(reader.peek(100)?, &data[..100]);
    assert_eq!(reader.peek(4)?, &data[..4]);

    let mut collected = Vec::new();
    reader.process_chunks(64, |chunk| {
        collected.extend_from_slice(chunk);
        Ok(true)
    })?;
    std::fs::remove_file(&path)?;

    assert_eq!(collected, data);
    Ok(())
}
