use crate::level::Level;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Error type for level loading. Any of these fails the whole run before
/// search starts.
#[derive(Debug)]
pub enum LevelError {
    /// IO error when reading from file
    Io(io::Error),
    /// Grid larger than `MAX_DIM` in either axis
    SizeExceeded(String),
    /// Missing player, crate/goal mismatch, bad symbol
    Malformed(String),
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::Io(err) => write!(f, "IO error: {}", err),
            LevelError::SizeExceeded(msg) => write!(f, "level too large: {}", msg),
            LevelError::Malformed(msg) => write!(f, "invalid level: {}", msg),
        }
    }
}

impl std::error::Error for LevelError {}

impl From<io::Error> for LevelError {
    fn from(err: io::Error) -> Self {
        LevelError::Io(err)
    }
}

/// A collection of levels parsed from a single stream.
pub struct Levels {
    levels: Vec<Level>,
}

impl Levels {
    /// Parse a level stream.
    ///
    /// Lines are processed in order. Empty lines are skipped. A line
    /// beginning with `;` starts a new level named by the trimmed remainder
    /// of the line; grid rows before the first `;` belong to a level named
    /// by its ordinal. Rows keep their original lengths.
    pub fn from_text(contents: &str) -> Result<Self, LevelError> {
        let mut levels = Vec::new();
        let mut current_name: Option<String> = None;
        let mut current_rows: Vec<&str> = Vec::new();

        let flush = |name: &mut Option<String>,
                         rows: &mut Vec<&str>,
                         levels: &mut Vec<Level>|
         -> Result<(), LevelError> {
            if rows.is_empty() {
                return Ok(());
            }
            let name = name
                .take()
                .unwrap_or_else(|| format!("#{}", levels.len() + 1));
            levels.push(Level::from_lines(&name, rows)?);
            rows.clear();
            Ok(())
        };

        for line in contents.lines() {
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix(';') {
                flush(&mut current_name, &mut current_rows, &mut levels)?;
                current_name = Some(rest.trim().to_string());
                continue;
            }
            current_rows.push(line);
        }
        flush(&mut current_name, &mut current_rows, &mut levels)?;

        Ok(Levels { levels })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LevelError> {
        let contents = fs::read_to_string(path)?;
        Self::from_text(&contents)
    }

    /// Hand the parsed levels over to the caller, which will typically wrap
    /// each in an `Rc` for sharing with its search states.
    pub fn into_levels(self) -> Vec<Level> {
        self.levels
    }

    pub fn get(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
