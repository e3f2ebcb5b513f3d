use quick_xml::escape::partial_escape;

/// Replace characters that are not legal in XML 1.0 with U+FFFD so spliced
/// replacement text can never corrupt the document part.
pub fn make_valid_xml(s: &str) -> String {
    let mut result = String::with_capacity(s.len());

    for c in s.chars() {
        if is_valid_xml_char(c) {
            result.push(c);
        } else {
            result.push('\u{FFFD}');
        }
    }

    result
}

fn is_valid_xml_char(c: char) -> bool {
    matches!(c,
        '\u{0009}' | '\u{000A}' | '\u{000D}' |
        '\u{0020}'..='\u{D7FF}' |
        '\u{E000}'..='\u{FFFD}' |
        '\u{10000}'..='\u{10FFFF}'
    )
}

/// Escape text for splicing into element content. Only `&`, `<`, `>` are
/// escaped, matching how word processors serialize run text, so escaped
/// needles line up byte-for-byte with document content.
pub fn escape_text(s: &str) -> String {
    partial_escape(&make_valid_xml(s)).into_owned()
}

/// Fold a Unicode superscript digit to its ASCII digit.
pub fn fold_superscript(c: char) -> Option<char> {
    Some(match c {
        '\u{2070}' => '0',
        '\u{00B9}' => '1',
        '\u{00B2}' => '2',
        '\u{00B3}' => '3',
        '\u{2074}' => '4',
        '\u{2075}' => '5',
        '\u{2076}' => '6',
        '\u{2077}' => '7',
        '\u{2078}' => '8',
        '\u{2079}' => '9',
        _ => return None,
    })
}
