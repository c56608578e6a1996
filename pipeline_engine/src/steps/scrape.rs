// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `scrape` Step
//!
//! HTTP GET + CSS-selector extraction (`sel::text`, `sel::attr(name)`), one
//! row per match of the first selector.

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};
use scraper::{Html, Selector};
use tokio::sync::Semaphore;

use super::support::{get_row_map, get_usize_or};

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Async,
        strategy_escalations: Vec::new(),
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::None,
        fusable: false,
        is_source: true,
        description: "HTML scraping with CSS selectors",
        config_docs: vec![
            ("url", "string — URL to scrape"),
            ("urls", "list — multiple URLs"),
            ("select", "map — field_name: css_selector, e.g. \"h1::text\" or \"a::attr(href)\""),
            ("parallel", "int — concurrent requests (default 5)"),
            ("timeout", "int — per-request timeout in seconds (default 30)"),
        ],
        required_config: vec!["url", "urls"],
    }
}

pub struct ScrapeStep;

enum ExtractKind {
    Text,
    Attr(String),
}

fn parse_selector(spec: &str) -> (&str, ExtractKind) {
    if let Some(css) = spec.strip_suffix("::text") {
        return (css, ExtractKind::Text);
    }
    if let Some(idx) = spec.find("::attr(") {
        let css = &spec[..idx];
        let attr = spec[idx + "::attr(".len()..].trim_end_matches(')');
        return (css, ExtractKind::Attr(attr.to_string()));
    }
    (spec, ExtractKind::Text)
}

fn extract_rows(html: &str, selectors: &IndexMap<String, Value>, url: &str) -> Vec<Row> {
    let document = Html::parse_document(html);
    if selectors.is_empty() {
        return vec![Row::new().with("_url", Value::String(url.to_string()))];
    }

    let parsed: Vec<(String, &str, ExtractKind)> = selectors
        .iter()
        .map(|(field, spec)| {
            let spec_str = spec.as_str().unwrap_or("");
            let (css, kind) = parse_selector(spec_str);
            (field.clone(), css, kind)
        })
        .collect();

    let (_, first_css, _) = &parsed[0];
    let first_count = Selector::parse(first_css)
        .map(|sel| document.select(&sel).count())
        .unwrap_or(0);

    let mut rows = Vec::with_capacity(first_count.max(1));
    for i in 0..first_count.max(1) {
        let mut row = Row::new().with("_url", Value::String(url.to_string()));
        for (field, css, kind) in &parsed {
            let value = Selector::parse(css)
                .ok()
                .and_then(|sel| document.select(&sel).nth(i))
                .map(|el| match kind {
                    ExtractKind::Text => Value::String(el.text().collect::<String>().trim().to_string()),
                    ExtractKind::Attr(name) => Value::String(el.value().attr(name).unwrap_or("").to_string()),
                })
                .unwrap_or(Value::Null);
            row.set(field.clone(), value);
        }
        rows.push(row);
    }
    rows
}

async fn scrape_one(client: &reqwest::Client, url: String, selectors: IndexMap<String, Value>, semaphore: std::sync::Arc<Semaphore>) -> Vec<Row> {
    let _permit = semaphore.acquire().await;
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => match resp.text().await {
            Ok(html) => extract_rows(&html, &selectors, &url),
            Err(_) => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[async_trait]
impl Step for ScrapeStep {
    async fn execute(&self, config: &IndexMap<String, Value>, _ctx: &mut Context) -> Result<Dataset, PipelineError> {
        let urls = match config.get("urls") {
            Some(Value::List(items)) => items.iter().filter_map(Value::as_str).flat_map(crate::url_pattern::expand).collect(),
            _ => config.get("url").and_then(Value::as_str).map(crate::url_pattern::expand).unwrap_or_default(),
        };
        let parallel = get_usize_or(config, "parallel", 5);
        let timeout = get_usize_or(config, "timeout", 30) as u64;
        let selectors = get_row_map(config, "select");

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout))
            .build()
            .unwrap_or_default();
        let semaphore = std::sync::Arc::new(Semaphore::new(parallel.max(1)));

        let futures = urls.into_iter().map(|url: String| {
            let client = client.clone();
            let selectors = selectors.clone();
            let semaphore = semaphore.clone();
            async move { scrape_one(&client, url, selectors, semaphore).await }
        });

        let results: Vec<Vec<Row>> = join_all(futures).await;
        Ok(Dataset::from_rows(results.into_iter().flatten().collect()))
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_selector() {
        let (css, kind) = parse_selector("h1::text");
        assert_eq!(css, "h1");
        assert!(matches!(kind, ExtractKind::Text));
    }

    #[test]
    fn parses_attr_selector() {
        let (css, kind) = parse_selector("a.link::attr(href)");
        assert_eq!(css, "a.link");
        match kind {
            ExtractKind::Attr(name) => assert_eq!(name, "href"),
            _ => panic!("expected attr kind"),
        }
    }

    #[test]
    fn extracts_rows_from_html() {
        let html = "<html><body><h1>One</h1><h1>Two</h1></body></html>";
        let selectors: IndexMap<String, Value> = vec![("title".to_string(), Value::String("h1::text".to_string()))].into_iter().collect();
        let rows = extract_rows(html, &selectors, "https://x.test");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("title"), Value::String("One".to_string()));
        assert_eq!(rows[1].get("title"), Value::String("Two".to_string()));
    }
}
