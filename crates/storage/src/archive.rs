//! Compression for the compress operation: one zip archive of every matched
//! file, or each file compressed on its own.

use crate::connector::ReadResult;
use crate::error::{ErrorKind, Result};
use crate::options::Compression;
use crate::path;
use bzip2::{Compression as BzCompression, write::BzEncoder};
use exn::ResultExt;
use flate2::{Compression as GzCompression, write::GzEncoder};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use tracing::instrument;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const BZIP2_LEVEL: BzCompression = BzCompression::best();
const GZIP_LEVEL: GzCompression = GzCompression::best();

/// One compressed file, ready to hand back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressEntry {
    /// Full path of the source file.
    pub path: String,
    /// File name with the compression extension appended.
    pub name: String,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

impl Compression {
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some("gz"),
            Self::Bzip2 => Some("bz2"),
            Self::Zip => Some("zip"),
        }
    }

    fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some("application/gzip"),
            Self::Bzip2 => Some("application/x-bzip2"),
            Self::Zip => Some("application/zip"),
        }
    }

    /// Compress one file's content. A zip holds it as its only entry,
    /// under `name`.
    #[instrument(skip(input), fields(format = ?self, input_size = input.len(), output_size))]
    pub fn compress(&self, name: &str, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match self {
            Self::None => output.extend_from_slice(input),
            Self::Zip => output = zip_archive([(name, input)])?,
            Self::Gzip => {
                let mut encoder = GzEncoder::new(&mut output, GZIP_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::BackendUnavailable("gzip encoder".into()))?;
                encoder.finish().or_raise(|| ErrorKind::BackendUnavailable("gzip encoder".into()))?;
            },
            Self::Bzip2 => {
                let mut encoder = BzEncoder::new(&mut output, BZIP2_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::BackendUnavailable("bzip2 encoder".into()))?;
                encoder.finish().or_raise(|| ErrorKind::BackendUnavailable("bzip2 encoder".into()))?;
            },
        }
        tracing::Span::current().record("output_size", output.len());
        Ok(output)
    }
}

fn zip_archive<'a>(files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Result<Vec<u8>> {
    let failed = || ErrorKind::BackendUnavailable("zip archive".into());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        zip.start_file(name, options).or_raise(failed)?;
        zip.write_all(content).or_raise(failed)?;
    }
    Ok(zip.finish().or_raise(failed)?.into_inner())
}

/// Pack files read below `base` into a single zip entry. Archive entries
/// are named by their path relative to `base`.
pub(crate) fn bundle(base: &str, files: &[(String, ReadResult)]) -> Result<CompressEntry> {
    let entries = files.iter().map(|(full_path, read)| {
        let name = path::relative_to(full_path, base).filter(|relative| !relative.is_empty()).unwrap_or(path::name(full_path));
        (name, read.content.as_slice())
    });
    let content = zip_archive(entries)?;
    tracing::debug!(base, files = files.len(), bytes = content.len(), "bundled zip archive");
    let name = match path::name(base) {
        "" => "archive.zip".to_string(),
        stem => format!("{stem}.zip"),
    };
    Ok(CompressEntry { path: base.to_string(), name, content_type: Compression::Zip.content_type().map(str::to_string), content })
}

/// Compress the content read from `full_path` into an entry.
pub(crate) fn compress(full_path: &str, read: ReadResult, compression: Compression) -> Result<CompressEntry> {
    let content = compression.compress(path::name(full_path), &read.content)?;
    let name = match compression.extension() {
        Some(extension) => format!("{}.{extension}", path::name(full_path)),
        None => path::name(full_path).to_string(),
    };
    let content_type = compression.content_type().map(str::to_string).or(read.content_type);
    Ok(CompressEntry { path: full_path.to_string(), name, content_type, content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::read::BzDecoder;
    use flate2::read::GzDecoder;
    use rstest::rstest;
    use std::io::Read;
    use zip::ZipArchive;

    fn read(content: &[u8]) -> ReadResult {
        ReadResult { content: content.to_vec(), content_type: Some("text/plain".into()), hash: None }
    }

    fn decode(compression: Compression, bytes: &[u8]) -> Vec<u8> {
        let mut output = Vec::new();
        match compression {
            Compression::None => output.extend_from_slice(bytes),
            Compression::Gzip => {
                GzDecoder::new(bytes).read_to_end(&mut output).unwrap();
            },
            Compression::Bzip2 => {
                BzDecoder::new(bytes).read_to_end(&mut output).unwrap();
            },
            Compression::Zip => {
                let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
                archive.by_index(0).unwrap().read_to_end(&mut output).unwrap();
            },
        }
        output
    }

    fn unzip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|index| {
                let mut file = archive.by_index(index).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    #[rstest]
    #[case(Compression::None, "notes.txt", Some("text/plain"))]
    #[case(Compression::Gzip, "notes.txt.gz", Some("application/gzip"))]
    #[case(Compression::Bzip2, "notes.txt.bz2", Some("application/x-bzip2"))]
    #[case(Compression::Zip, "notes.txt.zip", Some("application/zip"))]
    fn test_compress_entry(#[case] compression: Compression, #[case] name: &str, #[case] content_type: Option<&str>) {
        let body = b"the same line, again and again and again and again".repeat(20);
        let entry = compress("bucket/docs/notes.txt", read(&body), compression).unwrap();
        assert_eq!(entry.path, "bucket/docs/notes.txt");
        assert_eq!(entry.name, name);
        assert_eq!(entry.content_type.as_deref(), content_type);
        assert_eq!(decode(compression, &entry.content), body);
    }

    #[test]
    fn test_bundle() {
        let files = vec![
            ("bucket/docs/a.txt".to_string(), read(b"alpha")),
            ("bucket/docs/img/logo.png".to_string(), read(b"png")),
        ];
        let entry = bundle("bucket/docs/", &files).unwrap();
        assert_eq!(entry.path, "bucket/docs/");
        assert_eq!(entry.name, "docs.zip");
        assert_eq!(entry.content_type.as_deref(), Some("application/zip"));
        assert_eq!(
            unzip(&entry.content),
            vec![("a.txt".to_string(), b"alpha".to_vec()), ("img/logo.png".to_string(), b"png".to_vec())]
        );
        assert_eq!(bundle("", &files).unwrap().name, "archive.zip");
    }
}
