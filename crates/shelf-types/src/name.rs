//! Display-name handling for uploaded files.
//!
//! Names come straight from clients (multipart filenames, query strings, local
//! paths). They are persisted in the mapping file and echoed back in HTML and
//! `Content-Disposition` headers, so a small set of characters is replaced
//! before anything is stored.

/// Replace every control character (code point < 0x20), `"` and `\` with `_`.
///
/// All other characters, including non-ASCII ones, are kept as-is.
///
/// ```
/// use shelf_types::sanitize_display_name;
///
/// assert_eq!(sanitize_display_name("a\"b\\c\nd.txt"), "a_b_c_d.txt");
/// assert_eq!(sanitize_display_name("résumé.pdf"), "résumé.pdf");
/// ```
pub fn sanitize_display_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == '"' || c == '\\' || (c as u32) < 0x20 {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Strip any directory part from a client-supplied filename.
///
/// Both `/` and `\` count as separators since browsers on different
/// platforms send either.
pub fn base_name(name: &str) -> &str {
    match name.rfind(['/', '\\']) {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}
