//! Character-count chunkers. No tokenizer is involved here.

/// Slices `text` into pieces of at most `chunk_size` characters.
pub fn split_fixed_width(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Splits on the largest separator that occurs, recursing into pieces that are still
/// too long, then merges neighbours back up to `chunk_size` characters.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    separators: Vec<String>,
}

impl RecursiveCharacterSplitter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
            .into_iter()
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut merged = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0;

        for piece in pieces {
            let piece_len = char_len(piece);
            let joined_len = if current.is_empty() {
                piece_len
            } else {
                current_len + separator_len + piece_len
            };
            if joined_len > self.chunk_size && !current.is_empty() {
                merged.push(current.join(separator).trim().to_string());
                current.clear();
                current_len = 0;
            }
            current_len = if current.is_empty() {
                piece_len
            } else {
                current_len + separator_len + piece_len
            };
            current.push(piece);
        }
        if !current.is_empty() {
            merged.push(current.join(separator).trim().to_string());
        }
        merged
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_respects_char_boundaries() {
        assert_eq!(split_fixed_width("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(split_fixed_width("äöüß", 2), vec!["äö", "üß"]);
        assert!(split_fixed_width("", 3).is_empty());
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let splitter = RecursiveCharacterSplitter::new(20);
        let chunks = splitter.split("first paragraph\n\nsecond paragraph\n\nthird");
        assert_eq!(chunks, vec!["first paragraph", "second paragraph", "third"]);
    }

    #[test]
    fn every_chunk_fits() {
        let splitter = RecursiveCharacterSplitter::new(10);
        let text = "one two three four five six seven eight nine ten averyveryverylongword";
        let chunks = splitter.split(text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat().replace(' ', ""), text.replace(' ', ""));
    }

    #[test]
    fn short_text_is_single_chunk() {
        let splitter = RecursiveCharacterSplitter::new(1000);
        assert_eq!(splitter.split("alpha beta gamma"), vec!["alpha beta gamma"]);
    }
}
