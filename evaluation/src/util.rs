pub const OPTION_LETTERS: &[char] = &['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J'];

/// Render options as `(A) ...` lines for multiple-choice prompts.
pub fn format_lettered_options(options: &[String]) -> String {
    options
        .iter()
        .enumerate()
        .take(OPTION_LETTERS.len())
        .map(|(i, opt)| format!("({}) {}", OPTION_LETTERS[i], opt))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render options as `[0] ...` lines for index-answer prompts.
pub fn format_indexed_options(options: &[String]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, opt)| format!("[{}] {}", i, opt))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lettered_options() {
        let options = vec!["Echo".to_string(), "CT Angiography".to_string()];
        assert_eq!(format_lettered_options(&options), "(A) Echo\n(B) CT Angiography");
    }

    #[test]
    fn test_format_indexed_options() {
        let options = vec!["first".to_string(), "second".to_string()];
        assert_eq!(format_indexed_options(&options), "[0] first\n[1] second");
    }
}
