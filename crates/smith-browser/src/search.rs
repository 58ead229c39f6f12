//! Web search over a lite HTML endpoint with deterministic ranking.
//!
//! The pipeline: detect the query intent, refine the query, fetch the lite
//! results page, extract candidates with regex, score each candidate,
//! dedupe by host, and rank. Scoring is a pure function so the ranking is
//! reproducible in tests without any network.

use std::collections::HashSet;

use chrono::Datelike;
use regex::Regex;
use serde::Serialize;
use smith_types::SmithError;

/// Result cap regardless of what the caller asks for.
pub const MAX_RESULTS: usize = 20;

/// Default number of results returned.
pub const DEFAULT_RESULTS: usize = 5;

/// The lite search endpoint queried with a plain GET.
const SEARCH_ENDPOINT: &str = "https://lite.duckduckgo.com/lite/";

/// Query intent, detected by ordered rule families (first match wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchIntent {
    News,
    Official,
    Documentation,
    Price,
    Academic,
    HowTo,
    General,
}

impl SearchIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchIntent::News => "news",
            SearchIntent::Official => "official",
            SearchIntent::Documentation => "documentation",
            SearchIntent::Price => "price",
            SearchIntent::Academic => "academic",
            SearchIntent::HowTo => "how-to",
            SearchIntent::General => "general",
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub score: f64,
}

/// Trusted domain families with their base scores, fixed at build.
/// The first matching family wins.
const TRUSTED_DOMAINS: &[(&str, f64)] = &[
    ("wikipedia.org", 8.0),
    ("developer.mozilla.org", 7.0),
    ("github.com", 7.0),
    ("stackoverflow.com", 7.0),
    ("docs.rs", 6.0),
    ("arxiv.org", 6.0),
    ("scholar.google.com", 6.0),
    ("reuters.com", 6.0),
    ("apnews.com", 6.0),
    ("bbc.com", 6.0),
    ("bbc.co.uk", 6.0),
    ("nytimes.com", 5.0),
    ("theguardian.com", 5.0),
    ("stackexchange.com", 5.0),
    ("reddit.com", 4.0),
    ("medium.com", 3.0),
];

/// Hosts counted as news outlets for the news-intent bonus.
const NEWS_HOSTS: &[&str] = &[
    "reuters.com",
    "apnews.com",
    "bbc.com",
    "bbc.co.uk",
    "nytimes.com",
    "theguardian.com",
    "cnn.com",
];

/// URL or snippet markers that penalize a result.
const PENALIZED_MARKERS: &[&str] = &[
    "login",
    "signin",
    "subscribe",
    "paywall",
    "buy",
    "cart",
    "pinterest",
    "facebook",
    "instagram",
];

// ---------------------------------------------------------------------------
// Intent detection and query refinement
// ---------------------------------------------------------------------------

/// Detect intent from the lowercased query. Rule families are checked in
/// a fixed order; the first family with a hit decides.
pub fn detect_intent(query: &str) -> SearchIntent {
    let q = query.to_lowercase();
    let hit = |words: &[&str]| words.iter().any(|w| q.contains(w));

    if hit(&["news", "latest", "breaking", "headline", "today"]) {
        SearchIntent::News
    } else if hit(&["official", "government", " gov ", "ministry", "embassy"]) {
        SearchIntent::Official
    } else if hit(&["docs", "documentation", "api reference", "reference manual", "sdk"]) {
        SearchIntent::Documentation
    } else if hit(&["price", "cost", "how much", "preço", "quanto custa", "comprar"]) {
        SearchIntent::Price
    } else if hit(&["paper", "research", "study", "arxiv", "scholar", "journal"]) {
        SearchIntent::Academic
    } else if hit(&["how to", "tutorial", "guide", "setup", "install"]) {
        SearchIntent::HowTo
    } else {
        SearchIntent::General
    }
}

/// Refine the raw query for the detected intent.
///
/// `year` is injected so refinement stays deterministic in tests.
pub fn refine_query(query: &str, intent: SearchIntent, year: i32) -> String {
    let q = query.to_lowercase();
    match intent {
        SearchIntent::News => format!("{query} {year}"),
        SearchIntent::Price => {
            let mut refined = format!("{query} {year}");
            // Locale hint: Portuguese price queries skew Brazilian.
            if q.contains("preço") || q.contains("quanto custa") || q.contains("comprar") {
                refined.push_str(" Brasil");
            }
            refined
        }
        SearchIntent::Academic => format!(
            "{query} site:scholar.google.com OR site:arxiv.org OR site:researchgate.net"
        ),
        SearchIntent::Documentation => {
            if q.contains("documentation") {
                query.to_string()
            } else {
                format!("{query} documentation")
            }
        }
        _ => query.to_string(),
    }
}

/// The current year, for callers outside tests.
pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Host portion of a URL, lowercased, `www.` stripped.
pub fn host_of(url: &str) -> String {
    let stripped = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = stripped.split(['/', '?', '#']).next().unwrap_or("");
    host.trim_start_matches("www.").to_lowercase()
}

/// Score one candidate. Pure and deterministic; higher is better.
pub fn score_result(
    title: &str,
    url: &str,
    snippet: &str,
    query: &str,
    intent: SearchIntent,
    year: i32,
) -> f64 {
    let mut score = 0.0;
    let url_lower = url.to_lowercase();
    let title_lower = title.to_lowercase();
    let snippet_lower = snippet.to_lowercase();
    let host = host_of(url);

    // Trusted domain family: first match wins.
    if let Some((_, base)) = TRUSTED_DOMAINS
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{domain}")))
    {
        score += base;
    }

    // Intent bonus.
    match intent {
        SearchIntent::Documentation => {
            if url_lower.contains("github") || url_lower.contains("docs") {
                score += 4.0;
            }
        }
        SearchIntent::News => {
            if NEWS_HOSTS
                .iter()
                .any(|h| host == *h || host.ends_with(&format!(".{h}")))
            {
                score += 4.0;
            }
            if snippet.contains(&year.to_string()) {
                score += 2.0;
            }
        }
        SearchIntent::Official => {
            if host.contains(".gov") || host.starts_with("gov.") {
                score += 5.0;
            }
        }
        SearchIntent::Academic => {
            if url_lower.contains("arxiv")
                || url_lower.contains("scholar")
                || url_lower.contains("research")
            {
                score += 5.0;
            }
        }
        SearchIntent::HowTo => {
            if title_lower.contains("tutorial")
                || title_lower.contains("guide")
                || title_lower.contains("how")
            {
                score += 3.0;
            }
        }
        SearchIntent::Price | SearchIntent::General => {}
    }

    // Query-word overlap with the title: +1.5 per word >2 chars, capped.
    let mut overlap: f64 = 0.0;
    for word in query.to_lowercase().split_whitespace() {
        if word.len() > 2 && title_lower.contains(word) {
            overlap += 1.5;
        }
    }
    score += overlap.min(5.0);

    // Substantial snippets read better.
    if snippet.len() >= 100 {
        score += 1.0;
        if snippet.len() >= 200 {
            score += 1.0;
        }
    }

    // Penalized URL/snippet patterns.
    if PENALIZED_MARKERS
        .iter()
        .any(|m| url_lower.contains(m) || snippet_lower.contains(m))
    {
        score -= 4.0;
    }

    score.max(0.0)
}

/// Rank candidates: score, dedupe by host (best kept), sort descending,
/// trim to `num_results`.
pub fn rank_results(
    candidates: Vec<(String, String, String)>,
    query: &str,
    intent: SearchIntent,
    year: i32,
    num_results: usize,
) -> Vec<SearchResult> {
    let mut scored: Vec<SearchResult> = candidates
        .into_iter()
        .map(|(title, url, snippet)| {
            let score = score_result(&title, &url, &snippet, query, intent, year);
            SearchResult {
                title,
                url,
                snippet,
                score,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen_hosts = HashSet::new();
    let mut deduped: Vec<SearchResult> = Vec::new();
    for result in scored {
        if seen_hosts.insert(host_of(&result.url)) {
            deduped.push(result);
        }
    }

    deduped.truncate(num_results.min(MAX_RESULTS));
    deduped
}

/// Confidence band for a ranked result set.
pub fn confidence(results: &[SearchResult]) -> &'static str {
    if results.is_empty() {
        return "low";
    }
    let avg = results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64;
    if avg >= 6.0 {
        "high"
    } else if avg >= 3.0 {
        "medium"
    } else {
        "low"
    }
}

// ---------------------------------------------------------------------------
// Fetching and parsing
// ---------------------------------------------------------------------------

/// Run the full search pipeline against the lite endpoint.
pub async fn search(query: &str, num_results: usize) -> Result<serde_json::Value, SmithError> {
    let intent = detect_intent(query);
    let year = current_year();
    let refined = refine_query(query, intent, year);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("Mozilla/5.0 (compatible; smith-agent)")
        .build()
        .map_err(|e| SmithError::Internal(format!("http client build failed: {e}")))?;

    let response = client
        .get(SEARCH_ENDPOINT)
        .query(&[("q", refined.as_str())])
        .send()
        .await
        .map_err(|e| SmithError::ToolFailure(format!("search request failed: {e}")))?;
    let html = response
        .text()
        .await
        .map_err(|e| SmithError::ToolFailure(format!("cannot read search response: {e}")))?;

    let candidates = parse_results(&html);
    let results = rank_results(candidates, query, intent, year, num_results);
    let confidence = confidence(&results);

    Ok(serde_json::json!({
        "query": query,
        "refined_query": refined,
        "intent": intent.as_str(),
        "results": results,
        "confidence": confidence,
    }))
}

/// Extract `(title, url, snippet)` candidates from the lite results HTML.
pub fn parse_results(html: &str) -> Vec<(String, String, String)> {
    // The lite page lists each hit as an anchor with rel="nofollow",
    // followed by a result-snippet cell.
    let link_re = Regex::new(r#"<a[^>]+rel="nofollow"[^>]+href="(?P<url>[^"]+)"[^>]*>(?P<title>.*?)</a>"#)
        .expect("static regex");
    let snippet_re =
        Regex::new(r#"(?s)<td[^>]*class=['"]result-snippet['"][^>]*>(?P<snippet>.*?)</td>"#)
            .expect("static regex");

    let links: Vec<(String, String)> = link_re
        .captures_iter(html)
        .map(|cap| (strip_tags(&cap["title"]), cap["url"].to_string()))
        .filter(|(_, url)| url.starts_with("http"))
        .collect();
    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|cap| strip_tags(&cap["snippet"]))
        .collect();

    links
        .into_iter()
        .enumerate()
        .map(|(i, (title, url))| {
            let snippet = snippets.get(i).cloned().unwrap_or_default();
            (title, url, snippet)
        })
        .collect()
}

/// Drop HTML tags and decode the entities the lite page emits.
fn strip_tags(html: &str) -> String {
    let tag_re = Regex::new(r"<[^>]+>").expect("static regex");
    let text = tag_re.replace_all(html, "");
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: i32 = 2026;

    #[test]
    fn intent_rule_families_are_ordered() {
        assert_eq!(detect_intent("latest rust news"), SearchIntent::News);
        assert_eq!(detect_intent("official passport renewal"), SearchIntent::Official);
        assert_eq!(detect_intent("tokio documentation"), SearchIntent::Documentation);
        assert_eq!(detect_intent("laptop price comparison"), SearchIntent::Price);
        assert_eq!(detect_intent("transformer research paper"), SearchIntent::Academic);
        assert_eq!(detect_intent("how to bake bread"), SearchIntent::HowTo);
        assert_eq!(detect_intent("weather in lisbon"), SearchIntent::General);

        // "news" beats "how to" because news is checked first.
        assert_eq!(detect_intent("how to read the news"), SearchIntent::News);
    }

    #[test]
    fn refinement_appends_by_intent() {
        assert_eq!(
            refine_query("rust releases news", SearchIntent::News, YEAR),
            "rust releases news 2026"
        );
        assert_eq!(
            refine_query("notebook preço", SearchIntent::Price, YEAR),
            "notebook preço 2026 Brasil"
        );
        assert_eq!(
            refine_query("laptop price", SearchIntent::Price, YEAR),
            "laptop price 2026"
        );
        assert_eq!(
            refine_query("bert embeddings paper", SearchIntent::Academic, YEAR),
            "bert embeddings paper site:scholar.google.com OR site:arxiv.org OR site:researchgate.net"
        );
        assert_eq!(
            refine_query("tokio docs", SearchIntent::Documentation, YEAR),
            "tokio docs documentation"
        );
        assert_eq!(
            refine_query("tokio documentation", SearchIntent::Documentation, YEAR),
            "tokio documentation"
        );
        assert_eq!(
            refine_query("plain query", SearchIntent::General, YEAR),
            "plain query"
        );
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://www.github.com/a/b"), "github.com");
        assert_eq!(host_of("http://docs.rs/tokio?x=1"), "docs.rs");
        assert_eq!(host_of("https://en.wikipedia.org/wiki/Rust"), "en.wikipedia.org");
    }

    #[test]
    fn trusted_domains_score_by_family() {
        let score = score_result(
            "Rust",
            "https://en.wikipedia.org/wiki/Rust",
            "",
            "zzz",
            SearchIntent::General,
            YEAR,
        );
        assert_eq!(score, 8.0);

        let score = score_result(
            "repo",
            "https://github.com/tokio-rs/tokio",
            "",
            "zzz",
            SearchIntent::General,
            YEAR,
        );
        assert_eq!(score, 7.0);
    }

    #[test]
    fn documentation_bonus_on_docs_domains() {
        let with_bonus = score_result(
            "tokio",
            "https://docs.rs/tokio",
            "",
            "zzz",
            SearchIntent::Documentation,
            YEAR,
        );
        // 6.0 family + 4.0 intent bonus (url contains "docs").
        assert_eq!(with_bonus, 10.0);
    }

    #[test]
    fn news_bonus_includes_year_in_snippet() {
        let score = score_result(
            "markets",
            "https://www.reuters.com/markets/",
            "Markets rallied in 2026 as yields fell.",
            "zzz",
            SearchIntent::News,
            YEAR,
        );
        // 6.0 family + 4.0 news host + 2.0 year in snippet.
        assert_eq!(score, 12.0);
    }

    #[test]
    fn official_academic_and_howto_bonuses() {
        let gov = score_result("Passports", "https://travel.state.gov/passports", "", "zzz", SearchIntent::Official, YEAR);
        assert_eq!(gov, 5.0);

        let arxiv = score_result("Attention", "https://arxiv.org/abs/1706.03762", "", "zzz", SearchIntent::Academic, YEAR);
        // 6.0 family + 5.0 academic bonus.
        assert_eq!(arxiv, 11.0);

        let howto = score_result(
            "A complete guide to sourdough",
            "https://example.com/sourdough",
            "",
            "zzz",
            SearchIntent::HowTo,
            YEAR,
        );
        assert_eq!(howto, 3.0);
    }

    #[test]
    fn title_overlap_capped_at_five() {
        let score = score_result(
            "alpha beta gamma delta epsilon",
            "https://example.com/",
            "",
            "alpha beta gamma delta epsilon",
            SearchIntent::General,
            YEAR,
        );
        // 5 words x 1.5 = 7.5, capped at 5.0.
        assert_eq!(score, 5.0);

        // Words of length <= 2 never count.
        let score = score_result("go to it", "https://example.com/", "", "go to it", SearchIntent::General, YEAR);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn snippet_length_bonuses() {
        let short = "x".repeat(99);
        let medium = "x".repeat(100);
        let long = "x".repeat(200);
        let base = |snippet: &str| {
            score_result("t", "https://example.com/", snippet, "zzz", SearchIntent::General, YEAR)
        };
        assert_eq!(base(&short), 0.0);
        assert_eq!(base(&medium), 1.0);
        assert_eq!(base(&long), 2.0);
    }

    #[test]
    fn penalized_patterns_subtract_and_floor_at_zero() {
        let penalized = score_result(
            "Sign in",
            "https://example.com/login",
            "",
            "zzz",
            SearchIntent::General,
            YEAR,
        );
        assert_eq!(penalized, 0.0, "floor applies");

        let net = score_result(
            "Rust",
            "https://en.wikipedia.org/wiki/Rust?from=facebook",
            "",
            "zzz",
            SearchIntent::General,
            YEAR,
        );
        assert_eq!(net, 4.0, "8.0 family - 4.0 penalty");
    }

    #[test]
    fn ranking_dedupes_by_host_and_sorts_descending() {
        let candidates = vec![
            ("Rust - Wikipedia".to_string(), "https://en.wikipedia.org/wiki/Rust".to_string(), String::new()),
            ("Rust lang".to_string(), "https://en.wikipedia.org/wiki/Rust_(programming_language)".to_string(), String::new()),
            ("tokio".to_string(), "https://github.com/tokio-rs/tokio".to_string(), String::new()),
            ("random".to_string(), "https://example.com/".to_string(), String::new()),
        ];
        let results = rank_results(candidates, "rust", SearchIntent::General, YEAR, 10);

        // Both wikipedia urls share a host: one survives.
        let hosts: Vec<String> = results.iter().map(|r| host_of(&r.url)).collect();
        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts.iter().filter(|h| h.contains("wikipedia")).count(), 1);

        // Descending by score.
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn ranking_trims_to_cap() {
        let candidates: Vec<(String, String, String)> = (0..40)
            .map(|i| {
                (
                    format!("result {i}"),
                    format!("https://host{i}.example.com/"),
                    String::new(),
                )
            })
            .collect();
        let results = rank_results(candidates, "q", SearchIntent::General, YEAR, 99);
        assert_eq!(results.len(), MAX_RESULTS);
    }

    #[test]
    fn confidence_bands() {
        let mk = |score: f64| SearchResult {
            title: String::new(),
            url: "https://example.com".into(),
            snippet: String::new(),
            score,
        };
        assert_eq!(confidence(&[]), "low");
        assert_eq!(confidence(&[mk(7.0), mk(6.0)]), "high");
        assert_eq!(confidence(&[mk(4.0), mk(3.0)]), "medium");
        assert_eq!(confidence(&[mk(1.0)]), "low");
    }

    #[test]
    fn parses_lite_results_page() {
        let html = r#"
            <table>
              <tr><td><a rel="nofollow" href="https://docs.rs/tokio" class='result-link'>Tokio <b>docs</b></a></td></tr>
              <tr><td class='result-snippet'>Build reliable network applications without compromising speed.</td></tr>
              <tr><td><a rel="nofollow" href="https://github.com/tokio-rs/tokio">tokio-rs/tokio</a></td></tr>
              <tr><td class='result-snippet'>A runtime for writing &amp; running async applications.</td></tr>
            </table>
        "#;
        let results = parse_results(html);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "Tokio docs");
        assert_eq!(results[0].1, "https://docs.rs/tokio");
        assert!(results[0].2.starts_with("Build reliable"));
        assert_eq!(results[1].2, "A runtime for writing & running async applications.");
    }

    #[test]
    fn parse_ignores_non_http_links() {
        let html = r#"<a rel="nofollow" href="javascript:void(0)">x</a>"#;
        assert!(parse_results(html).is_empty());
    }
}
