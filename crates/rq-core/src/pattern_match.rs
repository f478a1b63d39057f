//! `like`/`ilike` pattern matching, shared by the subset deduper's boolean
//! algebra and the IR's comparison operators (spec §4.9).
//!
//! `%` matches zero or more characters, `_` matches exactly one.

pub fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    like_recursive(&v, &p, 0, 0)
}

pub fn ilike(value: &str, pattern: &str) -> bool {
    like(&value.to_lowercase(), &pattern.to_lowercase())
}

fn like_recursive(v: &[char], p: &[char], vi: usize, pi: usize) -> bool {
    if pi == p.len() {
        return vi == v.len();
    }
    match p[pi] {
        '%' => (vi..=v.len()).any(|skip| like_recursive(v, p, skip, pi + 1)),
        '_' => vi < v.len() && like_recursive(v, p, vi + 1, pi + 1),
        ch => vi < v.len() && v[vi] == ch && like_recursive(v, p, vi + 1, pi + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_and_underscore_wildcards() {
        assert!(like("hello", "h%o"));
        assert!(like("hello", "_ello"));
        assert!(!like("hello", "world"));
        assert!(!like("hello", "______"));
    }

    #[test]
    fn ilike_is_case_insensitive() {
        assert!(ilike("HELLO", "h%o"));
        assert!(!like("HELLO", "h%o"));
    }
}
