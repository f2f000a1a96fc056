//! Stack-trace sanitization
//!
//! Removes frame lines that reference the instrumentation's own script
//! locations before any stack text becomes observable (in event payloads,
//! or through the stealth `Error.prototype.stack` hook). Uses Aho-Corasick
//! for multi-prefix matching over frame lines.

use std::borrow::Cow;

use aho_corasick::AhoCorasick;

/// Scrubs known instrumentation locations out of stack text
pub struct StackSanitizer {
    prefixes: Vec<String>,
    matcher: AhoCorasick,
}

impl StackSanitizer {
    /// Build a sanitizer for the script locations established at
    /// injection time (URL or path prefixes).
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
        let matcher =
            AhoCorasick::new(&prefixes).expect("Failed to build Aho-Corasick automaton");
        Self { prefixes, matcher }
    }

    /// The configured location prefixes
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Whether a single frame line belongs to the instrumentation
    pub fn is_instrumentation_frame(&self, line: &str) -> bool {
        !self.prefixes.is_empty() && self.matcher.is_match(line)
    }

    /// Remove every frame line that references an instrumentation
    /// location. Remaining lines keep their order and formatting. When
    /// nothing matches, the input is returned unchanged (borrowed).
    pub fn sanitize<'a>(&self, stack: &'a str) -> Cow<'a, str> {
        if self.prefixes.is_empty() || !self.matcher.is_match(stack) {
            return Cow::Borrowed(stack);
        }
        let kept: Vec<&str> = stack
            .split('\n')
            .filter(|line| !self.is_instrumentation_frame(line))
            .collect();
        Cow::Owned(kept.join("\n"))
    }

    /// First frame line that is not instrumentation-owned: the frame the
    /// page itself was executing when the intercepted call happened.
    pub fn first_page_frame<'a>(&self, stack: &'a str) -> Option<&'a str> {
        stack
            .split('\n')
            .find(|line| !line.trim().is_empty() && !self.is_instrumentation_frame(line))
    }

    /// The `url:line:col` portion of a frame line. Understands both the
    /// Firefox form (`name@url:line:col`) and the V8 form
    /// (`    at name (url:line:col)` / `    at url:line:col`).
    pub fn frame_location(line: &str) -> Option<&str> {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("at ") {
            if let Some(open) = rest.rfind('(') {
                let inner = &rest[open + 1..];
                return Some(inner.strip_suffix(')').unwrap_or(inner));
            }
            return Some(rest);
        }
        line.rfind('@').map(|at| &line[at + 1..])
    }

    /// The script URL of a frame line, with the trailing `:line:col`
    /// positions stripped.
    pub fn script_url(line: &str) -> Option<String> {
        let location = Self::frame_location(line)?;
        let mut url = location;
        for _ in 0..2 {
            match url.rfind(':') {
                Some(idx)
                    if idx + 1 < url.len()
                        && url[idx + 1..].chars().all(|c| c.is_ascii_digit()) =>
                {
                    url = &url[..idx];
                }
                _ => break,
            }
        }
        if url.is_empty() {
            None
        } else {
            Some(url.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENSION_URL: &str = "moz-extension://3f1e/content.js";

    fn sanitizer() -> StackSanitizer {
        StackSanitizer::new([EXTENSION_URL])
    }

    #[test]
    fn test_removes_exactly_instrumentation_lines() {
        let stack = format!(
            "getImageData@{ext}:1:1\n\
             render@https://site.example/app.js:40:13\n\
             get stack@{ext}:1:1\n\
             main@https://site.example/app.js:88:1",
            ext = EXTENSION_URL
        );
        let clean = sanitizer().sanitize(&stack);
        assert_eq!(
            clean,
            "render@https://site.example/app.js:40:13\n\
             main@https://site.example/app.js:88:1"
        );
    }

    #[test]
    fn test_clean_stack_is_borrowed_no_op() {
        let stack = "a@https://x.example/a.js:1:2\nb@https://x.example/b.js:3:4";
        let out = sanitizer().sanitize(stack);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, stack);
    }

    #[test]
    fn test_preserves_page_line_order_and_count() {
        let page_lines = ["one@https://p.example/1.js:1:1", "two@https://p.example/2.js:2:2"];
        let stack = format!(
            "{}\nwrap@{}:1:1\n{}",
            page_lines[0], EXTENSION_URL, page_lines[1]
        );
        let clean = sanitizer().sanitize(&stack);
        let lines: Vec<&str> = clean.split('\n').collect();
        assert_eq!(lines, page_lines);
    }

    #[test]
    fn test_first_page_frame_skips_instrumentation() {
        let stack = format!(
            "wrap@{}:1:1\ncaller@https://p.example/app.js:9:9",
            EXTENSION_URL
        );
        assert_eq!(
            sanitizer().first_page_frame(&stack),
            Some("caller@https://p.example/app.js:9:9")
        );
    }

    #[test]
    fn test_frame_location_firefox_and_v8() {
        assert_eq!(
            StackSanitizer::frame_location("fn@https://a.example/x.js:1:2"),
            Some("https://a.example/x.js:1:2")
        );
        assert_eq!(
            StackSanitizer::frame_location("    at fn (https://a.example/x.js:1:2)"),
            Some("https://a.example/x.js:1:2")
        );
        assert_eq!(
            StackSanitizer::frame_location("    at https://a.example/x.js:1:2"),
            Some("https://a.example/x.js:1:2")
        );
    }

    #[test]
    fn test_script_url_strips_positions() {
        assert_eq!(
            StackSanitizer::script_url("fn@https://a.example/x.js:10:4").as_deref(),
            Some("https://a.example/x.js")
        );
    }

    #[test]
    fn test_empty_prefix_list_never_matches() {
        let s = StackSanitizer::new(Vec::<String>::new());
        let stack = "fn@moz-extension://anything/content.js:1:1";
        assert_eq!(s.sanitize(stack), stack);
        assert!(!s.is_instrumentation_frame(stack));
    }
}
