//! Server-rendered index page.

use std::fmt::Write;

use shelf_types::FileId;

const STYLE: &str = "body{font-family:sans-serif;margin:2rem;} \
table{border-collapse:collapse;} \
td,th{padding:.4rem .6rem;border-bottom:1px solid #ddd;} \
code{background:#f5f5f5;padding:.1rem .3rem;border-radius:3px;} \
.muted{color:#777}";

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Human-readable size limit, in the largest unit that divides it exactly.
fn size_note(max_file_size: u64) -> String {
    match max_file_size {
        0 => "no limit".to_string(),
        max if max % MIB == 0 => format!("{} MB", max / MIB),
        max if max % KIB == 0 => format!("{} KB", max / KIB),
        max => format!("{max} bytes"),
    }
}

/// Render the index page: upload form, size note and file table.
pub fn render_index(entries: &[(FileId, String)], max_file_size: u64) -> String {
    let mut html = String::with_capacity(1024 + entries.len() * 256);
    html.push_str("<!doctype html><html><head><meta charset=\"utf-8\">");
    html.push_str("<title>Shelf</title>");
    let _ = write!(html, "<style>{STYLE}</style>");
    html.push_str("</head><body><h1>Shelf</h1>");
    let _ = write!(
        html,
        "<p class=\"muted\">Max upload size: {}</p>",
        size_note(max_file_size)
    );

    html.push_str("<h2>Upload</h2>");
    html.push_str(
        "<form method=\"POST\" action=\"/upload\" enctype=\"multipart/form-data\">\
         <input type=\"file\" name=\"file\" required> \
         <button type=\"submit\">Upload</button>",
    );
    html.push_str("</form>");
    html.push_str(
        "<p class=\"muted\">Or via curl: \
         <code>curl -F file=@/path/to/file http://127.0.0.1:8000/upload</code></p>",
    );

    html.push_str("<h2>Files</h2>");
    html.push_str(
        "<table><thead><tr><th>ID</th><th>Name</th><th>Actions</th></tr></thead><tbody>",
    );
    if entries.is_empty() {
        html.push_str("<tr><td colspan=3 class=\"muted\">No files yet</td></tr>");
    }
    // Ids are alphanumeric; only names need escaping.
    for (id, name) in entries {
        let _ = write!(
            html,
            "<tr><td><code>{id}</code></td><td>{name}</td>\
             <td><a href=\"/download/{id}\">download</a> &nbsp;\
             <a href=\"#\" onclick=\"fetch('/delete/{id}',{{method:'DELETE'}})\
             .then(()=>location.reload())\">delete</a></td></tr>",
            name = escape(name),
        );
    }
    html.push_str("</tbody></table></body></html>");
    html
}
