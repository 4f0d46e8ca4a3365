use std::io::{self, Read};

use flate2::read::GzDecoder;
use tracing::warn;

use crate::blob::{write_with_digest, BlobDescriptor};
use crate::Result;

/// Wrap `reader` in a decompressor chosen by the layer media type.
pub fn decompressor<'a, R: Read + 'a>(media_type: &str, reader: R) -> Result<Box<dyn Read + 'a>> {
    if media_type.contains("gzip") {
        Ok(Box::new(GzDecoder::new(reader)))
    } else if media_type.contains("zstd") {
        Ok(Box::new(zstd::Decoder::new(reader)?))
    } else if media_type.contains("tar") && !media_type.contains('+') {
        // Uncompressed tar.
        Ok(Box::new(reader))
    } else {
        warn!(media_type, "unknown compression; assuming gzip");
        Ok(Box::new(GzDecoder::new(reader)))
    }
}

/// Digest and size of the uncompressed stream behind `reader`.
///
/// The digest of the result is the layer's diff ID.
pub fn uncompressed_descriptor<R: Read>(media_type: &str, reader: R) -> Result<BlobDescriptor> {
    let mut decoded = decompressor(media_type, reader)?;
    let (_, descriptor) = write_with_digest(io::sink(), |sink| {
        io::copy(&mut decoded, sink).map(drop)
    })?;
    Ok(descriptor)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Blob;
    use crate::manifest::MEDIA_TYPE_OCI_LAYER_GZIP;
    use crate::OciError;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn gzip_diff_id_matches_plain_digest() {
        let plain = b"uncompressed tar bytes".to_vec();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let diff = uncompressed_descriptor(MEDIA_TYPE_OCI_LAYER_GZIP, &compressed[..]).unwrap();
        let expected = Blob::from_bytes(plain.clone()).write_to(io::sink()).unwrap();
        assert_eq!(diff, expected);

        let blob = Blob::from_bytes(compressed).write_to(io::sink()).unwrap();
        assert_ne!(blob.digest(), diff.digest());
    }

    #[test]
    fn zstd_stream_decodes() {
        let plain = b"zstd layer".to_vec();
        let compressed = zstd::encode_all(&plain[..], 3).unwrap();
        let diff =
            uncompressed_descriptor("application/vnd.oci.image.layer.v1.tar+zstd", &compressed[..])
                .unwrap();
        assert_eq!(diff.size(), plain.len() as u64);
    }

    #[test]
    fn plain_tar_passes_through() {
        let diff =
            uncompressed_descriptor("application/vnd.oci.image.layer.v1.tar", &b"abc"[..]).unwrap();
        assert_eq!(diff.size(), 3);
    }

    #[test]
    fn corrupt_gzip_is_io_error() {
        let err = uncompressed_descriptor(MEDIA_TYPE_OCI_LAYER_GZIP, &b"not gzip"[..]).unwrap_err();
        assert!(matches!(err, OciError::Io(_)));
    }
}
