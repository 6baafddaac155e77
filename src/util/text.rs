use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Maximum length of an article preview, in characters.
pub const PREVIEW_MAX_CHARS: usize = 200;

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Calculates the display width of a string in terminal columns.
///
/// CJK characters and emoji count as two columns, combining marks as zero.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncates a string to fit within `max_width` terminal columns.
///
/// Appends "..." when text is cut. Widths of 3 or less return as many
/// characters as fit, without an ellipsis. Returns `Cow::Borrowed` when the
/// string already fits.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    if max_width <= ELLIPSIS_WIDTH {
        let mut byte_end = 0;
        let mut current_width = 0;
        for (idx, c) in s.char_indices() {
            let char_width = UnicodeWidthChar::width(c).unwrap_or(0);
            if current_width + char_width > max_width {
                break;
            }
            current_width += char_width;
            byte_end = idx + c.len_utf8();
        }
        if byte_end == s.len() {
            return Cow::Borrowed(s);
        }
        return Cow::Owned(s[..byte_end].to_string());
    }

    let target_width = max_width - ELLIPSIS_WIDTH;
    let mut current_width = 0;
    let mut cut_point = None;

    for (idx, c) in s.char_indices() {
        let char_width = UnicodeWidthChar::width(c).unwrap_or(0);
        if cut_point.is_none() && current_width + char_width > target_width {
            cut_point = Some(idx);
        }
        if current_width + char_width > max_width {
            let cut = cut_point.unwrap_or(idx);
            return Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS));
        }
        current_width += char_width;
    }

    Cow::Borrowed(s)
}

/// Truncates a string to at most `max_chars` characters (not bytes).
///
/// When text is cut, trailing whitespace is trimmed and "..." is appended;
/// the ellipsis counts toward the limit.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }
    if max_chars <= ELLIPSIS.len() {
        return Cow::Owned(s.chars().take(max_chars).collect());
    }

    let kept: String = s.chars().take(max_chars - ELLIPSIS.len()).collect();
    Cow::Owned(format!("{}{}", kept.trim_end(), ELLIPSIS))
}

/// SEC-001: Strip terminal control characters and ANSI escape sequences.
///
/// Feed text ends up in terminal output (CLI listings, logs), so CSI and OSC
/// sequences, bare ESC, DEL and C0 controls are removed. Tab, newline and
/// carriage return are preserved.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control =
        |b: u8| b == 0x1b || b == 0x7f || (b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r');

    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| is_control(b)) {
        return Cow::Borrowed(s);
    }

    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];
        if b == 0x1b && i + 1 < len && bytes[i + 1] == b'[' {
            // CSI: parameters until a final byte in 0x40..=0x7e
            i += 2;
            while i < len {
                let c = bytes[i];
                i += 1;
                if (0x40..=0x7e).contains(&c) {
                    break;
                }
            }
        } else if b == 0x1b && i + 1 < len && bytes[i + 1] == b']' {
            // OSC: until BEL or ST
            i += 2;
            while i < len {
                if bytes[i] == 0x07 {
                    i += 1;
                    break;
                }
                if bytes[i] == 0x1b && i + 1 < len && bytes[i + 1] == b'\\' {
                    i += 2;
                    break;
                }
                i += 1;
            }
        } else if is_control(b) {
            i += 1;
        } else {
            let start = i;
            while i < len && !is_control(bytes[i]) {
                i += 1;
            }
            // Control bytes are ASCII, so they never split a multi-byte sequence.
            out.push_str(&s[start..i]);
        }
    }

    Cow::Owned(out)
}

/// Decodes HTML/XML character references in a single pass.
///
/// Handles the five XML builtins, `&nbsp;`, and numeric references in
/// decimal (`&#39;`) and hex (`&#x27;`) form. Unknown or malformed references
/// are left untouched. `&amp;lt;` decodes to `&lt;`, never to `<`.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];

        // References longer than this are not entities we know.
        let semi = after.char_indices().take(12).find(|&(_, c)| c == ';');
        let decoded = semi.and_then(|(end, _)| decode_reference(&after[..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Whether a `<` at the start of `s` opens a tag (`<p`, `</p`, `<!--`, `<?xml`).
fn opens_tag(s: &str) -> bool {
    matches!(
        s[1..].chars().next(),
        Some(c) if c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?')
    )
}

/// Removes markup, dropping everything from a tag's `<` to the next `>`.
///
/// A `<` that does not open a tag (`a < b`) is literal text, as is one with
/// no closing `>` after it, so the output never contains a complete tag.
pub fn strip_tags(s: &str) -> Cow<'_, str> {
    if !s.contains('<') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        if !opens_tag(tail) {
            out.push('<');
            rest = &tail[1..];
            continue;
        }
        match tail.find('>') {
            Some(close) => {
                // Tags separate words ("a<br>b" reads as "a b").
                out.push(' ');
                rest = &tail[close + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Collapses every run of whitespace to a single space and trims both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds a plain-text preview from resolved HTML content.
///
/// Markup is stripped before entities are decoded, so escaped text such as
/// `a &lt; b` survives. Decoding can still surface double-escaped markup
/// (`&lt;p&gt;`), which a second pass removes.
pub fn make_preview(html: &str) -> String {
    let stripped = strip_tags(html);
    let decoded = decode_entities(&stripped);
    let text = strip_tags(&decoded);
    let collapsed = collapse_whitespace(&text);
    truncate_chars(&collapsed, PREVIEW_MAX_CHARS).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ascii_truncation() {
        assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
        assert_eq!(truncate_to_width("Short", 10), "Short");
    }

    #[test]
    fn test_cjk_truncation() {
        assert_eq!(truncate_to_width("你好世界", 7), "你好...");
        assert_eq!(truncate_to_width("你好", 10), "你好");
    }

    #[test]
    fn test_narrow_widths() {
        assert_eq!(truncate_to_width("Test", 0), "");
        assert_eq!(truncate_to_width("Test", 1), "T");
        assert_eq!(truncate_to_width("Test", 3), "Tes");
        assert_eq!(truncate_to_width("你好", 1), "");
    }

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("héllo", 5), "héllo");
        assert_eq!(truncate_chars("héllo wörld", 8), "héllo...");
        assert!(matches!(truncate_chars("short", 200), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let result = strip_control_chars("Hello, world!");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_ansi_and_osc() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_control_chars("\x1b]0;title\x07safe"), "safe");
        assert_eq!(strip_control_chars("a\x00b\x07c"), "abc");
        assert_eq!(strip_control_chars("tab\tnew\nline"), "tab\tnew\nline");
    }

    #[test]
    fn test_decode_named_entities() {
        assert_eq!(
            decode_entities("Tom &amp; Jerry&apos;s Blog"),
            "Tom & Jerry's Blog"
        );
        assert_eq!(
            decode_entities("&lt;p&gt;&quot;hi&quot;&lt;/p&gt;"),
            "<p>\"hi\"</p>"
        );
    }

    #[test]
    fn test_decode_numeric_entities() {
        assert_eq!(decode_entities("it&#39;s"), "it's");
        assert_eq!(decode_entities("it&#x27;s"), "it's");
        assert_eq!(decode_entities("&#X263A;"), "\u{263a}");
    }

    #[test]
    fn test_decode_is_single_pass() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_decode_leaves_unknown_references() {
        assert_eq!(decode_entities("AT&T"), "AT&T");
        assert_eq!(decode_entities("&bogus; &#xZZ;"), "&bogus; &#xZZ;");
        assert_eq!(decode_entities("a & b"), "a & b");
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(collapse_whitespace(&strip_tags("<p>Hello <b>world</b></p>")), "Hello world");
        assert_eq!(strip_tags("1 < 2"), "1 < 2");
        assert_eq!(strip_tags("a < b and c > d"), "a < b and c > d");
        assert_eq!(collapse_whitespace(&strip_tags("<!-- note -->x")), "x");
        assert_eq!(collapse_whitespace(&strip_tags("line<br/>break")), "line break");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(collapse_whitespace("a\u{a0}\u{a0}b"), "a b");
    }

    #[test]
    fn test_preview_from_double_escaped_html() {
        let preview = make_preview("&lt;p&gt;Hello&amp;nbsp;there&lt;/p&gt;");
        assert_eq!(preview, "Hello&nbsp;there");
    }

    #[test]
    fn test_preview_keeps_escaped_comparisons() {
        assert_eq!(
            make_preview("<p>If a &lt; b and c &gt; d then done</p>"),
            "If a < b and c > d then done"
        );
        assert_eq!(make_preview("x &lt;= 3 &amp;&amp; y&gt;2"), "x <= 3 && y>2");
    }

    #[test]
    fn test_preview_truncates_long_content() {
        let html = format!("<p>{}</p>", "word ".repeat(100));
        let preview = make_preview(&html);
        assert!(preview.chars().count() <= PREVIEW_MAX_CHARS);
        assert!(preview.ends_with("..."));
    }

    fn contains_tag(s: &str) -> bool {
        s.match_indices('<')
            .any(|(open, _)| opens_tag(&s[open..]) && s[open..].contains('>'))
    }

    proptest! {
        #[test]
        fn preview_is_bounded_and_tag_free(input in ".{0,600}") {
            let preview = make_preview(&input);
            prop_assert!(preview.chars().count() <= PREVIEW_MAX_CHARS);
            prop_assert!(!contains_tag(&preview));
        }

        #[test]
        fn preview_of_generated_markup_is_tag_free(
            words in proptest::collection::vec("[a-z&;#<>/ ]{0,12}", 0..40)
        ) {
            let html = words.join("<span class=\"x\">");
            let preview = make_preview(&html);
            prop_assert!(preview.chars().count() <= PREVIEW_MAX_CHARS);
            prop_assert!(!contains_tag(&preview));
        }
    }
}
