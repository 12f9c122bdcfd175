use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strips markup, decodes the predefined XML entities and collapses
/// whitespace.
pub fn ssml_to_plain_text(ssml: &str) -> String {
    let without_tags = TAG.replace_all(ssml, " ");
    let decoded = without_tags
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_decodes_entities() {
        let ssml = r#"<speak version="1.0">
            <prosody rate="+10%">Fish &amp; chips</prosody><break time="1s"/>cost &lt;5&gt;
        </speak>"#;
        assert_eq!(ssml_to_plain_text(ssml), "Fish & chips cost <5>");
    }

    #[test]
    fn amp_is_decoded_last() {
        assert_eq!(ssml_to_plain_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape_xml(r#"a<b & "c">'"#), "a&lt;b &amp; &quot;c&quot;&gt;&apos;");
    }
}
