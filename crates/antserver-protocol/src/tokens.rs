//! Token splitting for protocol lines.

/// Token delimiter.
pub const DELIMITER: char = '/';

/// Split a line into `/`-delimited tokens.
///
/// Each search for the delimiter resumes right after the previous match, and
/// whatever follows the last delimiter is pushed as the final token. Empty
/// tokens are preserved, a line without a delimiter yields itself, and an
/// empty line yields a single empty token. No trimming or unescaping is done.
pub fn split_tokens(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    while let Some(offset) = line[start..].find(DELIMITER) {
        let end = start + offset;
        tokens.push(&line[start..end]);
        start = end + DELIMITER.len_utf8();
    }
    tokens.push(&line[start..]);
    tokens
}
