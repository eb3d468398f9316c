pub(crate) const CR: u8 = 13;
pub(crate) const LF: u8 = 10;
pub(crate) const SP: u8 = 32;
pub(crate) const TAB: u8 = 9;
pub(crate) const SLASH: u8 = 47;
pub(crate) const QUESTION: u8 = 63;
pub(crate) const AMPERSAND: u8 = 38;
pub(crate) const EQUALS: u8 = 61;
pub(crate) const PLUS: u8 = 43;
pub(crate) const PERIOD: u8 = 46;

pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, SP | TAB | CR | LF)
}

/// Offset of the first occurrence of `needle` in `haystack`.  An empty needle never matches.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }

    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
