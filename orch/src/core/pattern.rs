//! Glob-style path matching for policy rules.
//!
//! Patterns use the common subset: `*` (within one path segment), `?` (one
//! character), `**` (across segments). A pattern without a `/` is matched
//! against the basename of the path, so `*.pem` catches `deploy/keys/ca.pem`
//! at any depth.

use regex::Regex;

/// True if `path` matches the glob `pattern`.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    let candidate = if pattern.contains('/') {
        path
    } else {
        basename(path)
    };
    match Regex::new(&glob_to_regex(pattern)) {
        Ok(re) => re.is_match(candidate),
        Err(_) => false,
    }
}

/// True if `path` matches any of `patterns`.
pub fn matches_any(patterns: &[String], path: &str) -> bool {
    patterns.iter().any(|p| glob_match(p, path))
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    // `**/` may also match zero segments, so `**/secrets/**`
                    // catches a top-level `secrets/` directory too.
                    if chars.get(i + 2) == Some(&'/') {
                        out.push_str("(?:.*/)?");
                        i += 3;
                    } else {
                        out.push_str(".*");
                        i += 2;
                    }
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                if "\\.+()[]{}^$|".contains(c) {
                    out.push('\\');
                }
                out.push(c);
                i += 1;
            }
        }
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_filename_matches_at_any_depth() {
        assert!(glob_match(".env", ".env"));
        assert!(glob_match(".env", "apps/web/.env"));
        assert!(glob_match("*.pem", "deploy/keys/ca.pem"));
        assert!(!glob_match("*.pem", "src/pem_parser.rs"));
    }

    #[test]
    fn star_does_not_cross_segments() {
        assert!(glob_match("src/*.rs", "src/main.rs"));
        assert!(!glob_match("src/*.rs", "src/io/store.rs"));
    }

    #[test]
    fn double_star_crosses_segments() {
        assert!(glob_match("**/secrets/**", "config/secrets/prod.yaml"));
        assert!(glob_match("**/secrets/**", "secrets/prod.yaml"));
        assert!(!glob_match("**/secrets/**", "src/secrets.rs"));
        assert!(glob_match(".ssh/**", ".ssh/id_rsa"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(glob_match("file.?", "file.c"));
        assert!(!glob_match("file.?", "file.rs"));
    }

    #[test]
    fn dotted_prefix_patterns() {
        assert!(glob_match(".env.*", ".env.local"));
        assert!(glob_match(".env.*", "apps/api/.env.production"));
        assert!(!glob_match(".env.*", "environment.rs"));
    }

    #[test]
    fn literal_regex_metachars_are_escaped() {
        assert!(glob_match("a+b.txt", "a+b.txt"));
        assert!(!glob_match("a+b.txt", "aab.txt"));
    }
}
