//! Small stateless helpers shared across inspectors.

/// Simple glob matching: `*` matches any sequence, `?` matches one char.
/// Used for `path_pattern` fields throughout the policy model (access
/// rules, inspection rules, the cartographer never uses this — it matches
/// `"METHOD path"` pairs exactly).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "/*" {
        return true;
    }

    let mut p_chars = pattern.chars().peekable();
    let mut t_chars = text.chars().peekable();
    let mut p_stack: Vec<(
        std::iter::Peekable<std::str::Chars>,
        std::iter::Peekable<std::str::Chars>,
    )> = Vec::new();

    loop {
        match (p_chars.peek(), t_chars.peek()) {
            (Some('*'), _) => {
                p_chars.next();
                p_stack.push((p_chars.clone(), t_chars.clone()));
            }
            (Some('?'), Some(_)) => {
                p_chars.next();
                t_chars.next();
            }
            (Some(pc), Some(tc)) if *pc == *tc => {
                p_chars.next();
                t_chars.next();
            }
            (None, None) => return true,
            _ => {
                if let Some((saved_p, mut saved_t)) = p_stack.pop() {
                    if saved_t.peek().is_none() {
                        return false;
                    }
                    saved_t.next();
                    p_chars = saved_p;
                    t_chars = saved_t;
                    p_stack.push((p_chars.clone(), t_chars.clone()));
                } else {
                    return false;
                }
            }
        }
    }
}

/// Shannon entropy of a sequence of string tokens, grouped by identity.
/// `H = -Σ p·log2(p)` over the frequency distribution of distinct tokens.
pub fn shannon_entropy<'a, I: IntoIterator<Item = &'a String>>(tokens: I) -> f64 {
    use std::collections::HashMap;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut total = 0usize;
    for t in tokens {
        *counts.entry(t.as_str()).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Best-effort `scheme://host[:port]` extraction from a (possibly
/// templated) backend URL, for the `/health` reachability probe. Stops
/// at the first `{` so a `{scope.key}` placeholder in the path never
/// corrupts the origin.
pub fn origin_of(url: &str) -> Option<String> {
    let url = url.split('{').next().unwrap_or(url);
    let scheme_end = url.find("://")? + 3;
    let rest = &url[scheme_end..];
    let host_end = rest.find('/').unwrap_or(rest.len());
    Some(format!("{}{}", &url[..scheme_end], &rest[..host_end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_of_strips_path_and_template() {
        assert_eq!(
            origin_of("http://profile-svc:8080/users/{jwt.user_id}"),
            Some("http://profile-svc:8080".to_string())
        );
        assert_eq!(origin_of("not a url"), None);
    }

    #[test]
    fn glob_exact() {
        assert!(glob_match("/users/42", "/users/42"));
        assert!(!glob_match("/users/42", "/users/43"));
    }

    #[test]
    fn glob_wildcard() {
        assert!(glob_match("/users/*/profile", "/users/42/profile"));
        assert!(glob_match("/api/*", "/api/v1/anything"));
        assert!(!glob_match("/api/*", "/other"));
        assert!(glob_match("*", "/anything/at/all"));
    }

    #[test]
    fn entropy_uniform_is_higher_than_constant() {
        let constant = vec!["a".to_string(); 20];
        let uniform: Vec<String> = (0..20).map(|i| format!("seg{}", i)).collect();
        assert_eq!(shannon_entropy(&constant), 0.0);
        assert!(shannon_entropy(&uniform) > shannon_entropy(&constant));
    }

    #[test]
    fn entropy_matches_known_value() {
        // 4 distinct tokens, each appearing once → H = log2(4) = 2.0
        let tokens = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        let h = shannon_entropy(&tokens);
        assert!((h - 2.0).abs() < 1e-9);
    }
}
