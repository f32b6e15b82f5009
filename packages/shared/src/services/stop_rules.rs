//! Stop (word categories) round rules. Pure functions; no I/O.

use rand::seq::SliceRandom;
use rand::Rng;

/// Letters a round can be played on. Q, W, X and Y never come up.
pub const ALPHABET: [char; 22] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'R', 'S', 'T',
    'U', 'V', 'Z',
];

pub const DEFAULT_CATEGORIES: &str = "Nome, Cor, CEP, Animal";

pub fn available_letters(used: &[char]) -> Vec<char> {
    ALPHABET
        .iter()
        .copied()
        .filter(|letter| !used.contains(letter))
        .collect()
}

/// Draws a letter not yet used this session, or `None` once every letter
/// has been played.
pub fn draw_letter<R: Rng + ?Sized>(used: &[char], rng: &mut R) -> Option<char> {
    available_letters(used).choose(rng).copied()
}

pub fn normalize_response(raw: &str) -> String {
    raw.to_uppercase()
}

/// Splits a comma-separated category prompt, trimming entries and dropping
/// empty ones.
pub fn parse_categories(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|category| !category.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_alphabet_excludes_rare_letters() {
        assert_eq!(ALPHABET.len(), 22);
        for letter in ['Q', 'W', 'X', 'Y'] {
            assert!(!ALPHABET.contains(&letter));
        }
    }

    #[test]
    fn test_draw_letter_exhausts_to_none() {
        let mut rng = StdRng::seed_from_u64(1);
        let used: Vec<char> = ALPHABET.to_vec();

        assert_eq!(draw_letter(&used, &mut rng), None);
    }

    #[test]
    fn test_draw_letter_picks_the_last_available() {
        let mut rng = StdRng::seed_from_u64(1);
        let used: Vec<char> = ALPHABET.iter().copied().filter(|l| *l != 'M').collect();

        assert_eq!(draw_letter(&used, &mut rng), Some('M'));
    }

    #[test]
    fn test_normalize_response() {
        assert_eq!(normalize_response("arara azul"), "ARARA AZUL");
        assert_eq!(normalize_response("São Paulo"), "SÃO PAULO");
    }

    #[test]
    fn test_parse_categories() {
        assert_eq!(
            parse_categories(DEFAULT_CATEGORIES),
            vec!["Nome", "Cor", "CEP", "Animal"]
        );
        assert_eq!(parse_categories(" Fruta ,, ,Carro"), vec!["Fruta", "Carro"]);
        assert!(parse_categories(" , ").is_empty());
    }

    proptest! {
        #[test]
        fn prop_letters_never_repeat_until_exhausted(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut used: Vec<char> = Vec::new();

            while let Some(letter) = draw_letter(&used, &mut rng) {
                prop_assert!(ALPHABET.contains(&letter));
                prop_assert!(!used.contains(&letter));
                used.push(letter);
            }

            prop_assert_eq!(used.len(), ALPHABET.len());
        }
    }
}
