use crate::llm::TokenCounter;

/// Greedily packs lines into chunks of at most `limit` tokens. A single line over the
/// limit becomes a chunk of its own. Joining the result with `'\n'` gives back `text`.
///
/// Blank lines never open a chunk: they stay with the text before them (or the text
/// after them at the start), so only an entirely blank `text` yields a blank chunk.
pub fn split_by_tokens(text: &str, limit: usize, counter: &dyn TokenCounter) -> Vec<String> {
    let newline_tokens = counter.count("\n");
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0;
    let mut current_has_text = false;

    for line in text.split('\n') {
        let line_tokens = counter.count(line);
        let blank = line.trim().is_empty();
        if !blank && current_has_text && current_tokens + newline_tokens + line_tokens > limit {
            chunks.push(current.join("\n"));
            current.clear();
            current_tokens = 0;
            current_has_text = false;
        }
        current_has_text |= !blank;
        current_tokens = if current.is_empty() {
            line_tokens
        } else {
            current_tokens + newline_tokens + line_tokens
        };
        current.push(line);
    }

    if !current.is_empty() {
        chunks.push(current.join("\n"));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CharCounter;

    impl TokenCounter for CharCounter {
        fn count(&self, text: &str) -> usize {
            text.chars().count()
        }
    }

    #[test]
    fn packs_lines_greedily() {
        let chunks = split_by_tokens("aa\nbb\ncc\ndddddddd\ne", 5, &CharCounter);
        assert_eq!(chunks, vec!["aa\nbb", "cc", "dddddddd", "e"]);
    }

    #[test]
    fn conserves_lines_in_order() {
        let text = "first line\n\nsecond line that is longer\nthird\n";
        for limit in 1..40 {
            let chunks = split_by_tokens(text, limit, &CharCounter);
            assert_eq!(chunks.join("\n"), text, "limit {}", limit);
        }
    }

    #[test]
    fn trailing_blank_lines_stay_with_an_oversized_line() {
        let long = "x".repeat(20);
        let text = format!("{long}\n");
        assert_eq!(split_by_tokens(&text, 10, &CharCounter), vec![text.clone()]);

        let text = format!("ab\n{long}\n  \n");
        assert_eq!(
            split_by_tokens(&text, 10, &CharCounter),
            vec!["ab".to_string(), format!("{long}\n  \n")]
        );
    }

    #[test]
    fn leading_blank_lines_join_the_first_text() {
        let chunks = split_by_tokens("\n\nabcdefgh\nij", 5, &CharCounter);
        assert_eq!(chunks, vec!["\n\nabcdefgh", "ij"]);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }

    #[test]
    fn blank_text_is_a_single_chunk() {
        assert_eq!(split_by_tokens("\n \n", 1, &CharCounter), vec!["\n \n"]);
    }
}
