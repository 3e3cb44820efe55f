use std::io::{Cursor, Write};

use bytes::Bytes;
use zip::write::SimpleFileOptions;

/// Build an in-memory zip archive from `(path, contents)` pairs.
pub(crate) fn zip_bytes(files: &[(&str, &[u8])]) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(contents).expect("write zip entry");
    }
    Bytes::from(writer.finish().expect("finish zip").into_inner())
}
