//! Zip archive helpers shared by the fetcher (writes one entry per endpoint response) and the
//! coordinator (merges one archive per node under a per-node directory prefix, preserving each
//! entry's original compression rather than re-deflating it).

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub type ArchiveResult<T> = Result<T, zip::result::ZipError>;

pub fn create(path: &Path) -> ArchiveResult<ZipWriter<File>> {
    let file = File::create(path)?;
    Ok(ZipWriter::new(file))
}

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Writes one entry, fully buffered, for the fetcher's per-request responses.
pub fn write_entry(writer: &mut ZipWriter<File>, name: &str, bytes: &[u8]) -> ArchiveResult<()> {
    writer.start_file(name, file_options())?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Adds an empty directory entry, used for the cluster-aggregate `<ip>/` prefixes.
pub fn write_dir(writer: &mut ZipWriter<File>, name: &str) -> ArchiveResult<()> {
    writer.add_directory(name, file_options())
}

/// Merges every entry of the archive at `src_path` into `writer`, each renamed under `prefix`
/// (e.g. `192.0.2.1/`). Entries are raw-copied: their original compressed bytes and method are
/// preserved rather than being decompressed and re-deflated.
pub fn merge_prefixed(
    writer: &mut ZipWriter<File>,
    prefix: &str,
    src_path: &Path,
) -> ArchiveResult<()> {
    write_dir(writer, prefix)?;

    let src_file = File::open(src_path)?;
    let mut src = ZipArchive::new(src_file)?;
    for i in 0..src.len() {
        let entry = src.by_index(i)?;
        let name = entry.name().to_string();
        if name.is_empty() {
            continue;
        }
        let renamed = format!("{prefix}{name}");
        writer.raw_copy_file_rename(entry, &renamed)?;
    }
    Ok(())
}

pub fn finish(mut writer: ZipWriter<File>) -> ArchiveResult<File> {
    writer.finish()
}

/// Reads a zip file's entry names back out, used by tests to assert archive layout.
pub fn entry_names(path: &Path) -> ArchiveResult<Vec<String>> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i)?.name().to_string());
    }
    Ok(names)
}

pub fn read_entry(path: &Path, name: &str) -> ArchiveResult<Vec<u8>> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut entry = archive.by_name(name)?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read_entry_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");

        let mut writer = create(&path).unwrap();
        write_entry(&mut writer, "node/stats.txt", b"hello").unwrap();
        finish(writer).unwrap();

        let names = entry_names(&path).unwrap();
        assert_eq!(names, vec!["node/stats.txt".to_string()]);
        assert_eq!(read_entry(&path, "node/stats.txt").unwrap(), b"hello");
    }

    #[test]
    fn merge_prefixed_namespaces_entries_under_node_ip() {
        let dir = tempfile::tempdir().unwrap();
        let node_archive = dir.path().join("node.zip");
        let mut node_writer = create(&node_archive).unwrap();
        write_entry(&mut node_writer, "test.txt", b"node payload").unwrap();
        finish(node_writer).unwrap();

        let aggregate = dir.path().join("aggregate.zip");
        let mut agg_writer = create(&aggregate).unwrap();
        merge_prefixed(&mut agg_writer, "192.0.2.1/", &node_archive).unwrap();
        finish(agg_writer).unwrap();

        let mut names = entry_names(&aggregate).unwrap();
        names.sort();
        assert_eq!(
            names,
            vec!["192.0.2.1/".to_string(), "192.0.2.1/test.txt".to_string()]
        );
        assert_eq!(
            read_entry(&aggregate, "192.0.2.1/test.txt").unwrap(),
            b"node payload"
        );
    }
}
