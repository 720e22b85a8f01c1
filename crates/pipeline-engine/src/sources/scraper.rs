//! Web scraper adapter: declarative per-domain site configs read with
//! CSS selectors. Grounded on the original prototype's
//! `fitness_scraper_service.py` (`SITES` registry, per-domain
//! last-request-time throttling, `_parse_date` format ladder).

use std::collections::HashMap;
use std::time::Duration;

use scraper::{Html, Selector};

use super::{CandidatePaper, LookbackWindow};
use crate::config::CircuitBreakerSettings;
use crate::error::{RetryableError, SourceError};
use crate::resilience::{retry_guarded, AdaptiveRateLimiter, CircuitBreaker, ResilienceHandles};
use crate::types::SourceType;
use crate::util::date::parse_feed_date;

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
    pub article_selector: String,
    pub title_selector: String,
    pub link_selector: String,
    pub description_selector: Option<String>,
    pub date_selector: Option<String>,
}

/// A representative cross-section of the original registry's
/// fitness/exercise-science blogs; operators extend via `ScraperSource::new`.
pub fn default_sites() -> Vec<SiteConfig> {
    vec![SiteConfig {
        name: "Stronger by Science".into(),
        url: "https://www.strongerbyscience.com/articles/".into(),
        article_selector: "article".into(),
        title_selector: "h2".into(),
        link_selector: "a".into(),
        description_selector: Some("p".into()),
        date_selector: Some("time".into()),
    }]
}

/// Per-domain token bucket, keyed by host, so one slow site doesn't
/// throttle requests to every other configured site.
pub struct ScraperSource {
    client: reqwest::Client,
    sites: Vec<SiteConfig>,
    limiters: HashMap<String, AdaptiveRateLimiter>,
    breaker: CircuitBreaker,
    resilience: ResilienceHandles,
}

impl ScraperSource {
    pub fn new(
        sites: Vec<SiteConfig>,
        rate_limit: f64,
        circuit_breaker: CircuitBreakerSettings,
        resilience: ResilienceHandles,
    ) -> Self {
        let limiters = sites
            .iter()
            .map(|s| (host_of(&s.url), AdaptiveRateLimiter::from_base_rate(rate_limit)))
            .collect();
        Self {
            client: reqwest::Client::new(),
            sites,
            limiters,
            breaker: CircuitBreaker::new(circuit_breaker.failure_threshold, circuit_breaker.reset_timeout),
            resilience,
        }
    }

    pub async fn fetch(&self, window: &LookbackWindow) -> Result<Vec<CandidatePaper>, SourceError> {
        let mut papers = Vec::new();
        for site in &self.sites {
            match self.fetch_one(site, window).await {
                Ok(mut items) => papers.append(&mut items),
                Err(e) => tracing::warn!(site = %site.name, error = %e, "scrape failed"),
            }
        }
        Ok(papers)
    }

    async fn fetch_one(&self, site: &SiteConfig, window: &LookbackWindow) -> Result<Vec<CandidatePaper>, SourceError> {
        let host = host_of(&site.url);
        let url = site.url.clone();
        let result = retry_guarded(
            &self.resilience,
            &format!("scraper:{host}"),
            SourceError::is_retryable,
            || SourceError::Transport("retry budget exhausted".into()),
            || SourceError::Cancelled,
            || async {
                if let Some(limiter) = self.limiters.get(&host) {
                    limiter.acquire().await;
                }
                let result = self
                    .breaker
                    .call(|| async {
                        let response = self
                            .client
                            .get(&url)
                            .timeout(Duration::from_secs(30))
                            .send()
                            .await
                            .map_err(|e| SourceError::Transport(e.to_string()))?;
                        if !response.status().is_success() {
                            return Err(SourceError::Status(response.status().as_u16()));
                        }
                        let body = response.text().await.map_err(|e| SourceError::Parse(e.to_string()))?;
                        Ok(parse_site_html(&body, site))
                    })
                    .await;

                match result {
                    Ok(v) => Ok(v),
                    Err(crate::resilience::circuit_breaker::CallError::Open(_)) => {
                        Err(SourceError::Transport("circuit breaker open".into()))
                    }
                    Err(crate::resilience::circuit_breaker::CallError::Inner(e)) => Err(e),
                }
            },
        )
        .await;

        match &result {
            Ok(_) => {
                if let Some(limiter) = self.limiters.get(&host) {
                    limiter.on_success();
                }
            }
            Err(SourceError::Status(429)) => {
                if let Some(limiter) = self.limiters.get(&host) {
                    limiter.on_rate_limited();
                }
            }
            Err(_) => {}
        }
        let items = result?;

        Ok(items
            .into_iter()
            .filter(|p| p.publication_date.map(|d| (chrono::Utc::now() - d).num_days() <= window.days).unwrap_or(true))
            .take(window.max_results)
            .collect())
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default()
}

/// Selects each `article_selector` match and pulls title/link/description/
/// date from the configured child selectors, skipping articles missing a
/// title rather than aborting the page.
fn parse_site_html(body: &str, site: &SiteConfig) -> Vec<CandidatePaper> {
    let document = Html::parse_document(body);
    let Ok(article_sel) = Selector::parse(&site.article_selector) else { return Vec::new() };
    let Ok(title_sel) = Selector::parse(&site.title_selector) else { return Vec::new() };
    let Ok(link_sel) = Selector::parse(&site.link_selector) else { return Vec::new() };

    let mut papers = Vec::new();
    for article in document.select(&article_sel) {
        let title = article.select(&title_sel).next().map(|e| e.text().collect::<String>().trim().to_string());
        let Some(title) = title.filter(|t| !t.is_empty()) else { continue };

        let link = article
            .select(&link_sel)
            .next()
            .and_then(|e| e.value().attr("href"))
            .map(str::to_string);

        let description = site
            .description_selector
            .as_ref()
            .and_then(|sel| Selector::parse(sel).ok())
            .and_then(|sel| article.select(&sel).next())
            .map(|e| clean_text(&e.text().collect::<String>()));

        let date_raw = site
            .date_selector
            .as_ref()
            .and_then(|sel| Selector::parse(sel).ok())
            .and_then(|sel| article.select(&sel).next())
            .map(|e| e.value().attr("datetime").map(str::to_string).unwrap_or_else(|| e.text().collect::<String>()));

        papers.push(CandidatePaper {
            title,
            authors: Vec::new(),
            abstract_text: description,
            doi: None,
            url: link,
            publication_date: date_raw.and_then(|d| parse_feed_date(&d)),
            journal: Some(site.name.clone()),
            study_design_hint: None,
            source_type: SourceType::WebScrape,
            raw_data: serde_json::json!({ "site": site.name }),
        });
    }
    papers
}

fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_site() -> SiteConfig {
        SiteConfig {
            name: "Test Blog".into(),
            url: "https://example.com/articles/".into(),
            article_selector: "article".into(),
            title_selector: "h2".into(),
            link_selector: "a".into(),
            description_selector: Some("p".into()),
            date_selector: Some("time".into()),
        }
    }

    #[test]
    fn parses_article_with_all_fields() {
        let html = r#"<html><body>
            <article>
                <h2>Volume and hypertrophy revisited</h2>
                <a href="https://example.com/volume-hypertrophy">read more</a>
                <p>A short summary of the article.</p>
                <time datetime="2024-02-12T00:00:00Z">Feb 12</time>
            </article>
        </body></html>"#;
        let papers = parse_site_html(html, &sample_site());
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].title, "Volume and hypertrophy revisited");
        assert_eq!(papers[0].url.as_deref(), Some("https://example.com/volume-hypertrophy"));
        assert!(papers[0].publication_date.is_some());
    }

    #[test]
    fn skips_article_without_title() {
        let html = r#"<html><body><article><p>no title here</p></article></body></html>"#;
        assert!(parse_site_html(html, &sample_site()).is_empty());
    }

    #[test]
    fn host_of_extracts_domain() {
        assert_eq!(host_of("https://example.com/articles/"), "example.com");
    }
}
