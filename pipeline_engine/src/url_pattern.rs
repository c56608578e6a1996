// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # URL Pattern Expansion
//!
//! Expands `{start..end}` numeric ranges and `{a,b,c}` lists in a URL
//! template into the concrete URLs, used by `fetch` and `scrape` before
//! concurrency fan-out.

use once_cell::sync::Lazy;
use regex::Regex;

static RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\d+)\.\.(\d+)\}").unwrap());
static LIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^}]+)\}").unwrap());

pub fn expand(pattern: &str) -> Vec<String> {
    if let Some(caps) = RANGE_RE.captures(pattern) {
        let whole = caps.get(0).unwrap();
        let start: i64 = caps[1].parse().unwrap_or(0);
        let end: i64 = caps[2].parse().unwrap_or(0);
        let prefix = &pattern[..whole.start()];
        let suffix = &pattern[whole.end()..];
        return (start..=end).map(|i| format!("{prefix}{i}{suffix}")).collect();
    }

    if let Some(caps) = LIST_RE.captures(pattern) {
        let whole = caps.get(0).unwrap();
        let body = &caps[1];
        if body.contains(',') {
            let prefix = &pattern[..whole.start()];
            let suffix = &pattern[whole.end()..];
            return body
                .split(',')
                .map(|item| format!("{prefix}{}{suffix}", item.trim()))
                .collect();
        }
    }

    vec![pattern.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_numeric_range() {
        let urls = expand("https://api.example.com/page/{1..3}");
        assert_eq!(
            urls,
            vec![
                "https://api.example.com/page/1",
                "https://api.example.com/page/2",
                "https://api.example.com/page/3",
            ]
        );
    }

    #[test]
    fn expands_list() {
        let urls = expand("https://api.example.com/{a,b}/data");
        assert_eq!(urls, vec!["https://api.example.com/a/data", "https://api.example.com/b/data"]);
    }

    #[test]
    fn leaves_plain_url_unchanged() {
        assert_eq!(expand("https://api.example.com/static"), vec!["https://api.example.com/static"]);
    }
}
