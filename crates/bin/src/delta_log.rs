//! Debug log of mapping changes, one JSON object per line.

use std::{
    fs::OpenOptions,
    io::{BufWriter, Write},
    path::Path,
};

use rosetta::MappingDelta;

/// Append every change in `delta` to the file at `path`, creating it if needed.
pub fn append(path: &Path, delta: &MappingDelta) -> rosetta::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for change in delta.changes() {
        serde_json::to_writer(&mut writer, change)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
