//! Signature DB — curated regex families for SQL injection, XSS, and path
//! traversal (§2 "Signature DB", §4.4 step 2). Compiled once at process
//! start and reused for every request.
//!
//! Every pattern in `aegis_toolkit/waf_rules.py`'s `SQLI_PATTERNS`,
//! `XSS_PATTERNS`, and `INJECTION_PATTERNS` has a corresponding entry
//! here, plus a handful of additional signatures (stacked queries,
//! sleep/benchmark timing attacks, SVG/iframe vectors) the source
//! doesn't carry.

use once_cell::sync::Lazy;
use regex::Regex;

/// One named, pre-compiled signature. Matching is always case-insensitive.
pub struct Signature {
    pub name: &'static str,
    pub family: &'static str,
    regex: Regex,
}

impl Signature {
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

fn compile(family: &'static str, name: &'static str, pattern: &str) -> Signature {
    Signature {
        name,
        family,
        regex: Regex::new(&format!("(?i){}", pattern))
            .unwrap_or_else(|e| panic!("invalid builtin signature {}: {}", name, e)),
    }
}

static SQLI: Lazy<Vec<Signature>> = Lazy::new(|| {
    vec![
        compile("sqli", "or-true", r#"(\bor\b|\band\b)\s+['"]?\d+['"]?\s*=\s*['"]?\d+"#),
        compile("sqli", "or-numeric-equality", r"\s*or\s*\d+=\d+"),
        compile("sqli", "union-select", r"\bunion\b(\s+all)?\s+\bselect\b"),
        compile("sqli", "comment-terminator", r"(--|#|/\*)\s*$|;\s*--"),
        compile("sqli", "trailing-semicolon-or-hash", r"(--|#|;)\s*$"),
        compile("sqli", "stacked-query", r";\s*(drop|delete|insert|update)\b"),
        compile("sqli", "and-select-update-delete", r"and\s*(select|update|delete)"),
        compile("sqli", "sleep-benchmark", r"\b(sleep|benchmark|pg_sleep|waitfor\s+delay)\s*\("),
        compile("sqli", "always-true-or", r"'\s*or\s*'1'\s*=\s*'1"),
        compile("sqli", "information-schema", r"information_schema"),
    ]
});

static XSS: Lazy<Vec<Signature>> = Lazy::new(|| {
    vec![
        compile("xss", "script-tag-open", r"<script[^>]*>"),
        compile("xss", "script-tag-close", r"</script.*?>"),
        compile(
            "xss",
            "img-javascript-uri",
            r#"(<|%3C)img\s+src\s*=\s*['"]?\s*j\s*a\s*v\s*a\s*s\s*c\s*r\s*i\s*p\s*t\s*:"#,
        ),
        compile("xss", "event-handler", r#"on(error|load|click|mouseover|focus|submit)\s*="#),
        compile("xss", "alert-call", r"alert\s*\("),
        compile("xss", "javascript-uri", r"javascript\s*:"),
        compile("xss", "svg-onload", r"<svg[^>]*onload"),
        compile("xss", "iframe-tag", r"<iframe[^>]*>"),
    ]
});

static TRAVERSAL: Lazy<Vec<Signature>> = Lazy::new(|| {
    vec![
        compile("traversal", "dot-dot-slash", r"\.\./"),
        compile("traversal", "dot-dot-backslash", r"\.\.\\"),
        compile("traversal", "etc-passwd", r"/etc/passwd"),
        compile("traversal", "etc-passwd-relative", r"etc/passwd"),
        compile("traversal", "windows-system32", r"system32"),
        compile("traversal", "null-byte", r"%00"),
        compile("traversal", "cmd-exe", r"cmd\.exe"),
        compile("traversal", "bin-sh", r"/bin/sh"),
    ]
});

/// Every signature in the curated database, grouped by family.
pub fn all() -> impl Iterator<Item = &'static Signature> {
    SQLI.iter().chain(XSS.iter()).chain(TRAVERSAL.iter())
}

/// Scan `text`, returning the first matching signature, if any.
pub fn scan(text: &str) -> Option<&'static Signature> {
    all().find(|sig| sig.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_classic_sqli() {
        assert!(scan("' OR 1=1 --").is_some());
        assert!(scan("admin' OR '1'='1").is_some());
        assert!(scan("1; DROP TABLE users").is_some());
    }

    #[test]
    fn detects_xss() {
        assert!(scan("<script>alert(1)</script>").is_some());
        assert!(scan("<img src=x onerror=alert(1)>").is_some());
    }

    #[test]
    fn detects_traversal() {
        assert!(scan("../../etc/passwd").is_some());
        assert!(scan("../../../etc/passwd").is_some());
    }

    #[test]
    fn detects_patterns_ported_from_the_source_waf_rules() {
        assert!(scan("1 AND (SELECT 1 FROM information_schema.tables)").is_some());
        assert!(scan("onsubmit=alert(1)").is_some());
        assert!(scan("</script foo>").is_some());
        assert!(scan("& cmd.exe /c whoami").is_some());
        assert!(scan("; /bin/sh -c id").is_some());
    }

    #[test]
    fn benign_text_does_not_match() {
        assert!(scan("hello world, this is a normal search query").is_none());
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(scan("' UNION SELECT password FROM users --").is_some());
        assert!(scan("' union select password from users --").is_some());
    }
}
