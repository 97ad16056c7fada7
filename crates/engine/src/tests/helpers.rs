use std::fs;
use std::path::Path;

/// Counts segment files (`seg...`, excluding `.tmp` siblings) directly under `dir`.
pub fn count_segment_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.starts_with("seg") && !name.ends_with(".tmp"))
                .unwrap_or(false)
        })
        .count()
}
