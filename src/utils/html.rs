use ammonia;

/// Clean authored markup using the ammonia library.
///
/// Question and option texts are rendered verbatim in student browsers, so
/// anything a teacher types flows into other people's DOM. Whitelist-based
/// sanitization keeps harmless tags and strips scripts and event handlers.
/// `$...$` LaTeX spans pass through untouched: ammonia only rewrites markup.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_tags() {
        let cleaned = clean_html("solve <script>alert(1)</script> for $x$");
        assert!(!cleaned.contains("script"));
        assert!(cleaned.contains("$x$"));
    }

    #[test]
    fn keeps_latex_spans() {
        assert_eq!(clean_html("$\\frac{a}{b}$"), "$\\frac{a}{b}$");
    }
}
