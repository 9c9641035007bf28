use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use vvc::structs::layer::SinkId;

pub fn create_path_with_suffix(base_path: &Path, suffix: &str) -> PathBuf {
    let file_name = base_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut path = base_path.to_path_buf();
    path.set_file_name(format!("{file_name}.{suffix}"));
    path
}

/// `BASE.sinkN.266`
pub fn sink_path(base_path: &Path, sink: SinkId) -> PathBuf {
    create_path_with_suffix(base_path, &format!("sink{sink}.266"))
}

/// `BASE.index.yaml`
pub fn index_path(base_path: &Path) -> PathBuf {
    create_path_with_suffix(base_path, "index.yaml")
}

/// Annex-B output of one sink.
pub struct SinkWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
    packets: u64,
}

impl SinkWriter {
    pub fn create(path: PathBuf) -> Result<Self> {
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            writer,
            bytes_written: 0,
            packets: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Appends one access unit and returns the offset it was written at.
    pub fn write_access_unit(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.bytes_written;
        self.writer.write_all(data)?;
        self.bytes_written += data.len() as u64;
        self.packets += 1;
        Ok(offset)
    }

    pub fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[test]
fn sink_file_names() {
    assert_eq!(
        sink_path(Path::new("out/clip"), SinkId(2)),
        Path::new("out/clip.sink2.266")
    );
    assert_eq!(
        index_path(Path::new("/tmp/seq.266")),
        Path::new("/tmp/seq.266.index.yaml")
    );
}
