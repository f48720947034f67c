use std::fmt::Write as _;

const REDIRECT_MARKER: &str = "#REDIRECT";
const REDIRECT_HEAD_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    /// True when invalid UTF-8 sequences were replaced by `\xNN` escapes.
    pub escaped: bool,
}

pub fn decode_page_text(bytes: &[u8]) -> DecodedText {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return DecodedText {
            text: text.to_string(),
            escaped: false,
        };
    }

    let mut text = String::with_capacity(bytes.len() + 16);
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
        for byte in chunk.invalid() {
            let _ = write!(text, "\\x{byte:02x}");
        }
    }
    DecodedText {
        text,
        escaped: true,
    }
}

pub fn is_redirect(text: &str) -> bool {
    let head: String = text.chars().take(REDIRECT_HEAD_CHARS).collect();
    head.to_uppercase().starts_with(REDIRECT_MARKER)
}

/// `3 pages have been <verb>.`, `1 page has been <verb>.` or `No pages have been <verb>.`
pub fn count_message(count: usize, verb: &str) -> String {
    match count {
        0 => format!("No pages have been {verb}."),
        1 => format!("1 page has been {verb}."),
        _ => format!("{count} pages have been {verb}."),
    }
}
