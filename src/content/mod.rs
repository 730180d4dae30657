use std::borrow::Cow;
use std::collections::HashSet;

/// Tags the post renderer is allowed to emit. Anything outside this list is
/// stripped before the content is stored.
const ALLOWED_TAGS: &[&str] = &[
    "p", "strong", "em", "br", "ul", "li", "ol", "a", "blockquote", "h1", "h2", "h3", "h4", "h5",
    "h6", "pre", "code", "span", "img", "hr", "div",
];

const ALLOWED_ATTRIBUTES: &[&str] = &["href", "target", "rel", "class", "style", "src"];

/// Inline style properties that survive sanitization. The editor only ever
/// writes text color and simple box styling.
const ALLOWED_STYLE_PROPS: &[&str] = &["color", "background", "border", "padding", "border-radius"];

/// Sanitizes rich-text HTML coming from the authoring form. Scripting
/// vectors are removed entirely; `style` attributes are reduced to the
/// allowed property set.
pub fn sanitize_html(input: &str) -> String {
    let tags: HashSet<&str> = ALLOWED_TAGS.iter().copied().collect();
    let attributes: HashSet<&str> = ALLOWED_ATTRIBUTES.iter().copied().collect();

    let mut builder = ammonia::Builder::empty();
    builder
        .tags(tags)
        .generic_attributes(attributes)
        // "rel" is author-controlled here; leaving link_rel set would clash
        // with it being an allowed attribute.
        .link_rel(None)
        .attribute_filter(|_element, attribute, value| {
            if attribute != "style" {
                return Some(Cow::Borrowed(value));
            }
            let filtered = filter_style(value);
            if filtered.is_empty() {
                None
            } else {
                Some(Cow::Owned(filtered))
            }
        });

    builder.clean(input).to_string()
}

fn filter_style(value: &str) -> String {
    value
        .split(';')
        .filter_map(|declaration| {
            let (prop, val) = declaration.split_once(':')?;
            let prop = prop.trim();
            let val = val.trim();
            if val.is_empty() || !ALLOWED_STYLE_PROPS.contains(&prop) {
                return None;
            }
            Some(format!("{}: {}", prop, val))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Strips all markup, leaving plain text. Used for reading-time estimation.
pub fn strip_html(input: &str) -> String {
    ammonia::Builder::empty().clean(input).to_string()
}

/// Estimated reading time in minutes at ~200 words per minute, never zero.
pub fn reading_time(html: &str) -> i64 {
    let words = strip_html(html).split_whitespace().count() as i64;
    ((words + 199) / 200).max(1)
}

/// The authoring form treats an untouched editor (`<p></p>`) the same as an
/// empty body.
pub fn is_blank_html(html: &str) -> bool {
    let trimmed = html.trim();
    trimmed.is_empty() || trimmed == "<p></p>"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_removes_script_tags() {
        let html = "<p>hello</p><script>alert('x')</script>";
        let clean = sanitize_html(html);
        assert!(clean.contains("<p>hello</p>"));
        assert!(!clean.contains("script"));
        assert!(!clean.contains("alert"));
    }

    #[test]
    fn sanitize_drops_event_handlers() {
        let html = r#"<img src="/uploads/a.png" onerror="steal()">"#;
        let clean = sanitize_html(html);
        assert!(clean.contains("src=\"/uploads/a.png\""));
        assert!(!clean.contains("onerror"));
    }

    #[test]
    fn sanitize_keeps_editor_formatting() {
        let html = r#"<h2>Title</h2><ul><li><strong>bold</strong> and <em>italic</em></li></ul><hr>"#;
        let clean = sanitize_html(html);
        assert!(clean.contains("<h2>Title</h2>"));
        assert!(clean.contains("<strong>bold</strong>"));
        assert!(clean.contains("<em>italic</em>"));
    }

    #[test]
    fn style_filter_keeps_only_allowed_properties() {
        let html = r#"<span style="color: teal; position: fixed; padding: 4px">x</span>"#;
        let clean = sanitize_html(html);
        assert!(clean.contains("color: teal"));
        assert!(clean.contains("padding: 4px"));
        assert!(!clean.contains("position"));
    }

    #[test]
    fn style_attribute_removed_when_nothing_survives() {
        let html = r#"<span style="position: fixed">x</span>"#;
        let clean = sanitize_html(html);
        assert!(!clean.contains("style"));
    }

    #[test]
    fn reading_time_has_floor_of_one_minute() {
        assert_eq!(reading_time("<p>short</p>"), 1);
    }

    #[test]
    fn reading_time_scales_with_word_count() {
        let words = vec!["word"; 450].join(" ");
        let html = format!("<p>{}</p>", words);
        assert_eq!(reading_time(&html), 3);
    }

    #[test]
    fn blank_detection_matches_empty_editor_document() {
        assert!(is_blank_html(""));
        assert!(is_blank_html("   "));
        assert!(is_blank_html("<p></p>"));
        assert!(!is_blank_html("<p>hi</p>"));
        assert!(!is_blank_html(r#"<img src="/uploads/a.png">"#));
    }
}
