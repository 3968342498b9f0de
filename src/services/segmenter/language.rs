// src/services/segmenter/language.rs

//! Statement language guess by stopword frequency.

const DEFAULT_LANGUAGE: &str = "english";

const STOPWORDS: &[(&str, &[&str])] = &[
    (
        "english",
        &[
            "the", "of", "and", "to", "is", "in", "that", "it", "for", "you", "are", "with", "on",
            "each", "which", "be", "this", "from", "line", "number",
        ],
    ),
    (
        "portuguese",
        &[
            "de", "que", "o", "a", "e", "do", "da", "em", "um", "uma", "para", "com", "não",
            "os", "as", "cada", "linha", "entrada", "saída", "número",
        ],
    ),
    (
        "spanish",
        &[
            "de", "que", "el", "la", "y", "en", "los", "las", "del", "un", "una", "por", "con",
            "para", "cada", "línea", "entrada", "salida", "número", "es",
        ],
    ),
];

/// Guess the language of `text`, falling back to English when no stopword
/// is found.
pub fn detect_language(text: &str) -> &'static str {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut best = (DEFAULT_LANGUAGE, 0usize);
    for &(language, stopwords) in STOPWORDS {
        let score = words
            .iter()
            .filter(|word| stopwords.contains(&word.as_str()))
            .count();
        if score > best.1 {
            best = (language, score);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english() {
        let text = "Problem A. Stars\nYou are given the number of stars in the sky. \
                    Each line of the input contains an integer.";
        assert_eq!(detect_language(text), "english");
    }

    #[test]
    fn test_portuguese() {
        let text = "Problema B. Pontes\nDada uma lista de pontes, determine o número \
                    de ilhas que não estão conectadas. A entrada contém uma linha.";
        assert_eq!(detect_language(text), "portuguese");
    }

    #[test]
    fn test_spanish() {
        let text = "Problema C. Puentes\nDada una lista de puentes, determine el número \
                    de islas en el mapa. La entrada contiene los datos del problema.";
        assert_eq!(detect_language(text), "spanish");
    }

    #[test]
    fn test_empty_text_defaults() {
        assert_eq!(detect_language(""), "english");
        assert_eq!(detect_language("12 34 56"), "english");
    }
}
