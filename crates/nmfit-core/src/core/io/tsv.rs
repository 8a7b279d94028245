use crate::core::image::{HeightMap, ImageError};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TsvError {
    #[error("I/O error reading height map: {0}")]
    Io(#[from] io::Error),

    #[error("Line {line}: could not parse '{token}' as a height value")]
    Parse { line: usize, token: String },

    #[error("Line {line}: expected {expected} columns, found {found}")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Reads a whitespace-separated height matrix, as emitted by AFM image
/// simulators. Blank lines and `#` comment lines are skipped.
pub fn read_height_map<R: Read>(reader: R) -> Result<HeightMap, TsvError> {
    let reader = BufReader::new(reader);
    let mut data = Vec::new();
    let mut cols = None;
    let mut rows = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut width = 0;
        for token in trimmed.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| TsvError::Parse {
                line: idx + 1,
                token: token.to_string(),
            })?;
            data.push(value);
            width += 1;
        }

        match cols {
            None => cols = Some(width),
            Some(expected) if expected != width => {
                return Err(TsvError::RaggedRow {
                    line: idx + 1,
                    expected,
                    found: width,
                });
            }
            _ => {}
        }
        rows += 1;
    }

    let cols = cols.ok_or(ImageError::Empty)?;
    Ok(HeightMap::new(rows, cols, data)?)
}

pub fn read_height_map_from_path(path: &Path) -> Result<HeightMap, TsvError> {
    let file = std::fs::File::open(path)?;
    read_height_map(file)
}
