//! Card number and expiry extraction from recognized text

use super::TextLine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditCardInfo {
    /// Four groups of four digits separated by single spaces
    pub number: String,
    /// `MM/YY`, or empty when no plausible expiry was read
    pub expiry: String,
}

/// Glyphs the recognizer commonly reads in place of digits.
const LOOKALIKES: &[(char, char)] = &[
    ('D', '0'),
    ('C', '0'),
    ('p', '0'),
    ('L', '1'),
    ('E', '2'),
    ('e', '2'),
    ('H', '4'),
    ('b', '6'),
];

fn substitute_lookalikes(text: &str) -> String {
    text.chars()
        .map(|c| {
            LOOKALIKES
                .iter()
                .find(|(from, _)| *from == c)
                .map_or(c, |(_, to)| *to)
        })
        .collect()
}

fn is_grouped(text: &str, group: usize, groups: usize, separator: char, accept: fn(char) -> bool) -> bool {
    let parts: Vec<&str> = text.split(separator).collect();
    parts.len() == groups
        && parts
            .iter()
            .all(|part| part.chars().count() == group && part.chars().all(accept))
}

fn is_alnum(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn looks_like_number(text: &str) -> bool {
    is_grouped(text, 4, 4, ' ', is_alnum)
}

fn looks_like_expiry(text: &str) -> bool {
    is_grouped(text, 2, 2, '/', is_alnum)
}

fn is_valid_expiry(text: &str) -> bool {
    let b = text.as_bytes();
    b.len() == 5
        && matches!(b[0], b'0'..=b'1')
        && b[1].is_ascii_digit()
        && b[2] == b'/'
        && matches!(b[3], b'0'..=b'3')
        && b[4].is_ascii_digit()
}

/// Finds the first text block holding a readable card number.
///
/// Within each block the first number-shaped and the first expiry-shaped
/// lines are taken, lookalike glyphs are mapped to digits, and the block is
/// accepted only if the number then consists of digits alone.
pub fn extract_card(lines: &[TextLine]) -> Option<CreditCardInfo> {
    let mut blocks: Vec<usize> = Vec::new();
    for line in lines {
        if !blocks.contains(&line.block) {
            blocks.push(line.block);
        }
    }

    blocks.into_iter().find_map(|block| {
        let in_block = || lines.iter().filter(move |l| l.block == block);

        let number = in_block()
            .find(|l| looks_like_number(&l.text))
            .map(|l| substitute_lookalikes(&l.text))?;
        if !is_grouped(&number, 4, 4, ' ', is_digit) {
            return None;
        }

        let expiry = in_block()
            .find(|l| looks_like_expiry(&l.text))
            .map(|l| substitute_lookalikes(&l.text))
            .filter(|e| is_valid_expiry(e))
            .unwrap_or_default();

        Some(CreditCardInfo { number, expiry })
    })
}
