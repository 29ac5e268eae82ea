//! Word tokenization shared by the text index and metadata derivation

/// Split text into lowercase alphanumeric words.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let words: Vec<String> = tokenize("Budget-2024: the BUDGET, review!").collect();
        assert_eq!(words, vec!["budget", "2024", "the", "budget", "review"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert_eq!(tokenize(" \n\t ,.").count(), 0);
    }
}
