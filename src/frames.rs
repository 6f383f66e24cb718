use anyhow::{Context, Result, bail};
use itertools::Itertools;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Lists the images directly inside `dir` in natural name order, so that
/// `frame2.png` comes before `frame10.png`.
///
/// The order is the temporal order the model is told to assume, hence the
/// care taken over numeric runs.
pub fn enumerate(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read image directory {}", dir.display()))?;

    let mut frames = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .path();
        if path.is_file() && is_image(&path) {
            frames.push(path);
        }
    }

    if frames.is_empty() {
        bail!("No .png/.jpg images found in {}", dir.display());
    }

    frames.sort_by_cached_key(|path| NaturalKey::new(&file_name(path)));
    Ok(frames)
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            EXTENSIONS
                .iter()
                .any(|known| extension.eq_ignore_ascii_case(known))
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Chunk {
    Text(String),
    /// Digits with leading zeros stripped, so that length then lexical order
    /// equals numeric order for any run length.
    Number(String),
}

impl Ord for Chunk {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Chunk::Text(a), Chunk::Text(b)) => a.cmp(b),
            (Chunk::Number(a), Chunk::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Less,
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Chunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct NaturalKey {
    chunks: Vec<Chunk>,
    name: String,
}

impl NaturalKey {
    fn new(name: &str) -> Self {
        let mut chunks = Vec::new();
        let runs = name.chars().group_by(|c| c.is_ascii_digit());
        for (is_digit, run) in &runs {
            let run: String = run.collect();
            if is_digit {
                // Keep text and number runs on alternating positions.
                if chunks.is_empty() {
                    chunks.push(Chunk::Text(String::new()));
                }
                let trimmed = run.trim_start_matches('0');
                chunks.push(Chunk::Number(trimmed.to_owned()));
            } else {
                chunks.push(Chunk::Text(run));
            }
        }

        Self {
            chunks,
            name: name.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"not really an image").unwrap();
    }

    fn names(frames: &[PathBuf]) -> Vec<String> {
        frames.iter().map(|path| file_name(path)).collect()
    }

    #[test]
    fn numeric_runs_sort_by_value() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["img2.png", "img10.png", "img1.png"] {
            touch(dir.path(), name);
        }

        let frames = enumerate(dir.path()).unwrap();
        assert_eq!(names(&frames), ["img1.png", "img2.png", "img10.png"]);
    }

    #[test]
    fn mixed_segments_and_long_numbers() {
        let mut keys = [
            "walk_b_3.jpg",
            "walk_a_20.jpg",
            "walk_a_3.jpg",
            "99999999999999999999999999.png",
            "100000000000000000000000000.png",
            "007.png",
            "8.png",
        ]
        .map(|name| NaturalKey::new(name));
        keys.sort();

        let sorted: Vec<&str> = keys.iter().map(|key| key.name.as_str()).collect();
        assert_eq!(
            sorted,
            [
                "007.png",
                "8.png",
                "99999999999999999999999999.png",
                "100000000000000000000000000.png",
                "walk_a_3.jpg",
                "walk_a_20.jpg",
                "walk_b_3.jpg",
            ]
        );
    }

    #[test]
    fn keeps_only_images_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a1.PNG", "a2.jpeg", "a3.Jpg", "notes.txt", "a4.gif", "noext"] {
            touch(dir.path(), name);
        }
        std::fs::create_dir(dir.path().join("a0.png")).unwrap();

        let frames = enumerate(dir.path()).unwrap();
        assert_eq!(names(&frames), ["a1.PNG", "a2.jpeg", "a3.Jpg"]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "readme.md");

        let error = enumerate(dir.path()).unwrap_err();
        assert!(error.to_string().starts_with("No .png/.jpg images found"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(enumerate(&dir.path().join("absent")).is_err());
    }
}
