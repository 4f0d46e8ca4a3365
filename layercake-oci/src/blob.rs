//! Blobs and the one-pass counting digest writer.
//!
//! Every blob source is written through [`CountingDigestWriter`], which
//! forwards bytes to the destination while feeding a SHA-256 hasher and a
//! byte counter. The [`BlobDescriptor`] only exists once the writer has been
//! consumed by [`CountingDigestWriter::finish`].

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use sha2::{Digest as _, Sha256};

use crate::digest::DescriptorDigest;
use crate::Result;

// ---------------------------------------------------------------------------
// BlobDescriptor
// ---------------------------------------------------------------------------

/// Size and (optionally) digest of a fully written blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobDescriptor {
    size: u64,
    digest: Option<DescriptorDigest>,
}

impl BlobDescriptor {
    pub fn new(size: u64, digest: DescriptorDigest) -> Self {
        Self {
            size,
            digest: Some(digest),
        }
    }

    /// Descriptor for content whose digest was not computed.
    pub fn without_digest(size: u64) -> Self {
        Self { size, digest: None }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn has_digest(&self) -> bool {
        self.digest.is_some()
    }

    pub fn digest(&self) -> Option<&DescriptorDigest> {
        self.digest.as_ref()
    }
}

// ---------------------------------------------------------------------------
// CountingDigestWriter
// ---------------------------------------------------------------------------

/// A [`Write`] decorator that hashes and counts everything written through it.
pub struct CountingDigestWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes_written: u64,
}

impl<W: Write> CountingDigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_written: 0,
        }
    }

    /// Bytes forwarded to the inner writer so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush the inner writer and finalize the digest.
    pub fn finish(mut self) -> io::Result<(W, BlobDescriptor)> {
        self.inner.flush()?;
        let digest = DescriptorDigest::from_sha256_bytes(&self.hasher.finalize());
        Ok((self.inner, BlobDescriptor::new(self.bytes_written, digest)))
    }
}

impl<W: Write> Write for CountingDigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Run `write` against a counting digest writer wrapping `out` and return the
/// destination together with the descriptor of everything written.
pub fn write_with_digest<W, F>(out: W, write: F) -> io::Result<(W, BlobDescriptor)>
where
    W: Write,
    F: FnOnce(&mut CountingDigestWriter<W>) -> io::Result<()>,
{
    let mut writer = CountingDigestWriter::new(out);
    write(&mut writer)?;
    writer.finish()
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Producer callback for [`Blob::from_writer`].
pub type BlobWriterFn = Box<dyn FnOnce(&mut dyn Write) -> io::Result<()> + Send>;

/// A byte payload that can be written out exactly once.
pub enum Blob {
    Empty,
    Bytes { data: Vec<u8>, hashing: bool },
    Reader(Box<dyn Read + Send>),
    File(PathBuf),
    Writer(BlobWriterFn),
}

impl Blob {
    pub fn empty() -> Self {
        Blob::Empty
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Blob::Bytes {
            data: data.into(),
            hashing: true,
        }
    }

    /// Bytes whose descriptor carries only a size.
    pub fn from_bytes_unhashed(data: impl Into<Vec<u8>>) -> Self {
        Blob::Bytes {
            data: data.into(),
            hashing: false,
        }
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Blob::Reader(Box::new(reader))
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Blob::File(path.into())
    }

    pub fn from_writer<F>(write: F) -> Self
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()> + Send + 'static,
    {
        Blob::Writer(Box::new(write))
    }

    /// Stream the blob into `out`, returning its descriptor.
    pub fn write_to<W: Write>(self, out: W) -> Result<BlobDescriptor> {
        let hashing = !matches!(self, Blob::Bytes { hashing: false, .. });

        let (_, descriptor) = write_with_digest(out, |sink| match self {
            Blob::Empty => Ok(()),
            Blob::Bytes { data, .. } => sink.write_all(&data),
            Blob::Reader(mut reader) => io::copy(&mut reader, sink).map(drop),
            Blob::File(path) => {
                let mut file = File::open(&path)?;
                io::copy(&mut file, sink).map(drop)
            }
            Blob::Writer(write) => write(sink),
        })?;

        if hashing {
            Ok(descriptor)
        } else {
            Ok(BlobDescriptor::without_digest(descriptor.size()))
        }
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blob::Empty => f.write_str("Blob::Empty"),
            Blob::Bytes { data, hashing } => f
                .debug_struct("Blob::Bytes")
                .field("len", &data.len())
                .field("hashing", hashing)
                .finish(),
            Blob::Reader(_) => f.write_str("Blob::Reader"),
            Blob::File(path) => f.debug_tuple("Blob::File").field(path).finish(),
            Blob::Writer(_) => f.write_str("Blob::Writer"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
