//! Replacement of characters that are not allowed in file names.

use phf::{phf_map, Map};

// full-width look-alikes of the reserved characters
static SUBSTITUTES: Map<char, char> = phf_map! {
    '<' => '＜',
    '>' => '＞',
    ':' => '：',
    '"' => '＂',
    '/' => '／',
    '\\' => '＼',
    '|' => '｜',
    '?' => '？',
    '*' => '＊',
};

/// Replaces every character that is reserved in file names with a visually similar one.
///
/// All other characters are kept as they are.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| SUBSTITUTES.get(&c).copied().unwrap_or(c))
        .collect()
}
