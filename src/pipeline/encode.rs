//! Byte-level encoders: PNG for single cards and backgrounds, ZIP for batches.
//!
//! Archive entries are stored uncompressed. PNG data is already deflated,
//! so a second deflate pass only costs time.

use crate::error::CardError;
use image::RgbaImage;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Encode an RGBA image as PNG.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Pack `(name, bytes)` entries into a ZIP archive, in the given order.
pub fn write_archive(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, CardError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (name, bytes) in entries {
        zip.start_file(name.as_str(), options)
            .map_err(|e| CardError::ArchiveFailed(format!("{name}: {e}")))?;
        zip.write_all(bytes)
            .map_err(|e| CardError::ArchiveFailed(format!("{name}: {e}")))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| CardError::ArchiveFailed(e.to_string()))?;
    let bytes = cursor.into_inner();
    debug!("Archive: {} entries, {} bytes", entries.len(), bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Read;

    #[test]
    fn encode_small_image() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let back = image::load_from_memory(&png).unwrap();
        assert_eq!((back.width(), back.height()), (10, 10));
    }

    #[test]
    fn archive_keeps_entry_order() {
        let entries = vec![
            ("b_1.png".to_string(), b"one".to_vec()),
            ("a_2.png".to_string(), b"two".to_vec()),
            ("c_3.png".to_string(), b"three".to_vec()),
        ];
        let bytes = write_archive(&entries).unwrap();
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 3);
        for (i, (name, data)) in entries.iter().enumerate() {
            let mut file = zip.by_index(i).unwrap();
            assert_eq!(file.name(), name);
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).unwrap();
            assert_eq!(&buf, data);
        }
    }

    #[test]
    fn empty_archive_is_valid() {
        let bytes = write_archive(&[]).unwrap();
        let zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 0);
    }
}
