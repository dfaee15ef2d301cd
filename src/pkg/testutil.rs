use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::SimpleFileOptions;

pub fn temp_dir(prefix: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time drift")
        .as_nanos();
    let dir =
        std::env::temp_dir().join(format!("goyp-{}-{}-{}", prefix, std::process::id(), nonce));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn write_file(root: &Path, rel: &str, text: &str) -> PathBuf {
    let p = root.join(rel);
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).expect("mkdir parent");
    }
    fs::write(&p, text).expect("write file");
    p
}

pub fn write_zip(path: &Path, entries: &[&str]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir zip parent");
    }
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::<u8>::new()));
    let opts = SimpleFileOptions::default();
    for name in entries {
        zip.start_file(*name, opts).expect("start entry");
        zip.write_all(b"!<arch>\n").expect("write entry");
    }
    let bytes = zip.finish().expect("finish zip").into_inner();
    fs::write(path, bytes).expect("write zip");
}
