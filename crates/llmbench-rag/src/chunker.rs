//! Fixed-size overlapping chunking.
//!
//! Windows are measured in characters, not bytes, so multi-byte text is
//! never split inside a code point.

use serde::{Deserialize, Serialize};

use crate::error::RagError;
use crate::Result;

/// One window of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Split `content` into windows of `chunk_size` characters, each starting
/// `chunk_size - overlap` characters after the previous one. The last window
/// is truncated to whatever remains.
///
/// ```
/// let chunks = llmbench_rag::chunk("0123456789", 4, 1).unwrap();
/// assert_eq!(chunks, vec!["0123", "3456", "6789", "9"]);
/// ```
pub fn chunk(content: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    validate(chunk_size, overlap)?;
    if content.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = content.chars().collect();
    let step = chunk_size - overlap;
    let mut windows = Vec::with_capacity(chars.len().div_ceil(step));
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        start += step;
    }
    Ok(windows)
}

/// Same as [`chunk`], tagging each window with its position.
pub fn chunks(content: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(chunk(content, chunk_size, overlap)?
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk { index, text })
        .collect())
}

/// Check chunking parameters without touching any content.
pub fn validate(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidArgument(
            "chunk size must be positive".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(RagError::InvalidArgument(format!(
            "overlap ({overlap}) must be smaller than chunk size ({chunk_size})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_windows() {
        assert_eq!(
            chunk("0123456789", 4, 1).unwrap(),
            vec!["0123", "3456", "6789", "9"]
        );
    }

    #[test]
    fn test_no_overlap() {
        assert_eq!(chunk("abcdef", 3, 0).unwrap(), vec!["abc", "def"]);
    }

    #[test]
    fn test_content_shorter_than_window() {
        assert_eq!(chunk("abc", 10, 2).unwrap(), vec!["abc"]);
    }

    #[test]
    fn test_empty_content() {
        assert!(chunk("", 4, 1).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            chunk("abc", 0, 0),
            Err(RagError::InvalidArgument(_))
        ));
        assert!(matches!(
            chunk("abc", 4, 4),
            Err(RagError::InvalidArgument(_))
        ));
        assert!(matches!(
            chunk("abc", 4, 9),
            Err(RagError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invalid_parameters_rejected_for_empty_content() {
        assert!(chunk("", 2, 2).is_err());
    }

    #[test]
    fn test_multibyte_characters() {
        assert_eq!(chunk("héllo", 2, 0).unwrap(), vec!["hé", "ll", "o"]);
    }

    #[test]
    fn test_chunks_are_indexed() {
        let out = chunks("abcdef", 4, 2).unwrap();
        let indices: Vec<usize> = out.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(out[2].text, "ef");
    }
}
