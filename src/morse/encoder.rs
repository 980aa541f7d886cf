// src/morse/encoder.rs  -  Text -> dot/dash/space symbol string
use std::fmt;

/// One token of a [`MorseSymbols`] string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Dot,
    Dash,
    /// Separator / word boundary
    Space,
}

impl Symbol {
    pub(crate) fn from_char(c: char) -> Option<Self> {
        match c {
            '.' => Some(Symbol::Dot),
            '-' => Some(Symbol::Dash),
            ' ' => Some(Symbol::Space),
            _   => None,
        }
    }

    pub fn is_element(self) -> bool { self != Symbol::Space }
}

/// Ordered sequence over `{'.', '-', ' '}`.
///
/// Only [`encode`] and [`char_symbols`] build these, so the alphabet holds by
/// construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MorseSymbols(String);

impl MorseSymbols {
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }

    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.0.chars().filter_map(Symbol::from_char)
    }
}

impl fmt::Display for MorseSymbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ITU table, letters + digits. Space is its own word-boundary token.
pub fn char_to_morse(c: char) -> Option<&'static str> {
    match c.to_ascii_uppercase() {
        'A' => Some(".-"),    'B' => Some("-..."),  'C' => Some("-.-."),
        'D' => Some("-.."),   'E' => Some("."),      'F' => Some("..-."),
        'G' => Some("--."),   'H' => Some("...."),   'I' => Some(".."),
        'J' => Some(".---"),  'K' => Some("-.-"),    'L' => Some(".-.."),
        'M' => Some("--"),    'N' => Some("-."),     'O' => Some("---"),
        'P' => Some(".--."),  'Q' => Some("--.-"),   'R' => Some(".-."),
        'S' => Some("..."),   'T' => Some("-"),      'U' => Some("..-"),
        'V' => Some("...-"),  'W' => Some(".--"),    'X' => Some("-..-"),
        'Y' => Some("-.--"),  'Z' => Some("--.."),
        '0' => Some("-----"), '1' => Some(".----"),  '2' => Some("..---"),
        '3' => Some("...--"), '4' => Some("....-"),  '5' => Some("....."),
        '6' => Some("-...."), '7' => Some("--..."),  '8' => Some("---.."),
        '9' => Some("----."),
        ' ' => Some(" "),
        _   => None,
    }
}

/// Code for a single source character. Unmapped characters become a bare
/// word boundary, same as a space.
pub fn char_symbols(c: char) -> &'static str {
    char_to_morse(c).unwrap_or(" ")
}

/// Encode full text: per-character codes joined with single spaces.
/// Total; never fails.
pub fn encode(text: &str) -> MorseSymbols {
    let mut out = String::with_capacity(text.len() * 5);
    let mut unknown = Vec::new();

    for (i, c) in text.chars().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match char_to_morse(c) {
            Some(code) => out.push_str(code),
            None => {
                unknown.push(c);
                out.push(' ');
            }
        }
    }

    if !unknown.is_empty() {
        log::warn!("[encoder] {} unmapped char(s) sent as word space: {:?}", unknown.len(), unknown);
    }
    MorseSymbols(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cq_is_joined_with_single_spaces() {
        assert_eq!(encode("CQ").as_str(), "-.-. --.-");
    }

    #[test]
    fn lowercase_folds_to_uppercase() {
        assert_eq!(encode("cq dx"), encode("CQ DX"));
    }

    #[test]
    fn space_becomes_boundary_token_between_separators() {
        // separator + word token + separator
        assert_eq!(encode("E E").as_str(), ".   .");
    }

    #[test]
    fn unknown_chars_become_word_boundaries() {
        assert_eq!(encode("E?E").as_str(), encode("E E").as_str());
        assert_eq!(encode("ä").as_str(), " ");
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(encode("").is_empty());
    }

    #[test]
    fn output_alphabet_is_closed() {
        let s = encode("Hello, World! 73 de DD6DS @ 599 #");
        assert!(s.as_str().chars().all(|c| matches!(c, '.' | '-' | ' ')));
        assert_eq!(s.symbols().count(), s.len());
    }

    #[test]
    fn digits_are_five_elements() {
        for d in '0'..='9' {
            assert_eq!(char_symbols(d).len(), 5, "{d}");
        }
    }
}
