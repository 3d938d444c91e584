use scraper::Html;

const HIDDEN: &[&str] = &["script", "style", "noscript", "template"];

/// Visible text of an HTML document, whitespace-normalized.
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut words: Vec<&str> = Vec::new();

    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|parent| {
            parent
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN.contains(&el.name()))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_scripts_and_collapses_whitespace() {
        let html = r#"<html><head><style>p { color: red }</style>
            <script>var tracking = 1;</script></head>
            <body><h1>Roteador</h1>
            <p>Wi-Fi   6
               dual band</p><noscript>enable js</noscript></body></html>"#;

        assert_eq!(html_to_text(html), "Roteador Wi-Fi 6 dual band");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(html_to_text(""), "");
    }
}
