//! Byte sequence search and replacement.

use memchr::memmem;

/// Number of non-overlapping occurrences of `needle` in `haystack`.
pub fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() {
        return 0;
    }
    memmem::find_iter(haystack, needle).count()
}

/// Replaces every non-overlapping occurrence of `search`, scanning left to right.
///
/// Returns the new buffer and the number of replacements. The replacement may
/// differ in length from the search sequence.
pub fn replace_all(data: &[u8], search: &[u8], replace: &[u8]) -> (Vec<u8>, usize) {
    if search.is_empty() {
        return (data.to_vec(), 0);
    }

    let finder = memmem::Finder::new(search);
    let mut out = Vec::with_capacity(data.len());
    let mut last = 0;
    let mut count = 0;
    for pos in finder.find_iter(data) {
        out.extend_from_slice(&data[last..pos]);
        out.extend_from_slice(replace);
        last = pos + search.len();
        count += 1;
    }
    out.extend_from_slice(&data[last..]);
    (out, count)
}
