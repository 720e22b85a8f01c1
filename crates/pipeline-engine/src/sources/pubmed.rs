//! Biomedical index adapter: NCBI E-utilities (`esearch` + `efetch`)
//! against PubMed, XML responses. Grounded on the original prototype's
//! `services/pubmed_service.py`: a two-step search (`esearch` for
//! PMIDs, `efetch` for the article XML) and a `PublicationType` →
//! [`StudyDesign`] mapping table.

use chrono::{Duration as ChronoDuration, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::time::Duration;

use super::{CandidatePaper, LookbackWindow};
use crate::config::CircuitBreakerSettings;
use crate::error::{RetryableError, SourceError};
use crate::resilience::{retry_guarded, AdaptiveRateLimiter, CircuitBreaker, ResilienceHandles};
use crate::types::{SourceType, StudyDesign};

const BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

const DEFAULT_SEARCH_TERMS: &[&str] = &[
    "resistance training",
    "muscle hypertrophy",
    "protein synthesis",
    "muscle recovery",
    "periodization",
    "training volume",
];

pub struct PubmedSource {
    client: reqwest::Client,
    api_key: Option<String>,
    limiter: AdaptiveRateLimiter,
    breaker: CircuitBreaker,
    resilience: ResilienceHandles,
}

impl PubmedSource {
    pub fn new(
        api_key: Option<String>,
        rate_limit: f64,
        circuit_breaker: CircuitBreakerSettings,
        resilience: ResilienceHandles,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            limiter: AdaptiveRateLimiter::from_base_rate(rate_limit),
            breaker: CircuitBreaker::new(circuit_breaker.failure_threshold, circuit_breaker.reset_timeout),
            resilience,
        }
    }

    async fn esearch(&self, query: &str, window: &LookbackWindow) -> Result<Vec<String>, SourceError> {
        let from = (Utc::now() - ChronoDuration::days(window.days)).format("%Y/%m/%d").to_string();
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", format!("({query}) AND {from}:3000/12/31[pdat]")),
            ("retmax", window.max_results.to_string()),
            ("retmode", "json".to_string()),
            ("sort", "date".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }

        let result = retry_guarded(
            &self.resilience,
            "pubmed:esearch",
            SourceError::is_retryable,
            || SourceError::Transport("retry budget exhausted".into()),
            || SourceError::Cancelled,
            || async {
                self.limiter.acquire().await;
                let result = self
                    .breaker
                    .call(|| async {
                        let response = self
                            .client
                            .get(format!("{BASE_URL}/esearch.fcgi"))
                            .query(&params)
                            .timeout(Duration::from_secs(30))
                            .send()
                            .await
                            .map_err(|e| SourceError::Transport(e.to_string()))?;
                        if !response.status().is_success() {
                            return Err(SourceError::Status(response.status().as_u16()));
                        }
                        let body: serde_json::Value =
                            response.json().await.map_err(|e| SourceError::Parse(e.to_string()))?;
                        let ids = body["esearchresult"]["idlist"]
                            .as_array()
                            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                            .unwrap_or_default();
                        Ok(ids)
                    })
                    .await;
                unwrap_breaker(result)
            },
        )
        .await;
        self.record_rate_feedback(&result);
        result
    }

    async fn efetch(&self, pmids: &[String]) -> Result<Vec<CandidatePaper>, SourceError> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("retmode", "xml".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }

        let result = retry_guarded(
            &self.resilience,
            "pubmed:efetch",
            SourceError::is_retryable,
            || SourceError::Transport("retry budget exhausted".into()),
            || SourceError::Cancelled,
            || async {
                self.limiter.acquire().await;
                let result = self
                    .breaker
                    .call(|| async {
                        let response = self
                            .client
                            .get(format!("{BASE_URL}/efetch.fcgi"))
                            .query(&params)
                            .timeout(Duration::from_secs(30))
                            .send()
                            .await
                            .map_err(|e| SourceError::Transport(e.to_string()))?;
                        if !response.status().is_success() {
                            return Err(SourceError::Status(response.status().as_u16()));
                        }
                        let xml = response.text().await.map_err(|e| SourceError::Parse(e.to_string()))?;
                        Ok(parse_pubmed_xml(&xml))
                    })
                    .await;
                unwrap_breaker(result)
            },
        )
        .await;
        self.record_rate_feedback(&result);
        result
    }

    /// Feeds the HTTP outcome back into the adaptive limiter: a 429 halves
    /// the rate, anything else succeeding grows it back per §5.
    fn record_rate_feedback<T>(&self, result: &Result<T, SourceError>) {
        match result {
            Ok(_) => self.limiter.on_success(),
            Err(SourceError::Status(429)) => self.limiter.on_rate_limited(),
            Err(_) => {}
        }
    }

    pub async fn fetch(&self, window: &LookbackWindow) -> Result<Vec<CandidatePaper>, SourceError> {
        self.search_query(&DEFAULT_SEARCH_TERMS.join(" OR "), window).await
    }

    /// Used for the default topical sweep; trusted-journal/trusted-author
    /// targeted queries go through [`Self::search_trusted_journals`] /
    /// [`Self::search_trusted_authors`] instead, which add the PubMed
    /// field-tag syntax this generic entry point doesn't (spec §4.2).
    pub async fn search_query(&self, query: &str, window: &LookbackWindow) -> Result<Vec<CandidatePaper>, SourceError> {
        let pmids = self.esearch(query, window).await?;
        self.efetch(&pmids).await
    }

    /// OR-combines every registry journal name into one `[journal]`-tagged
    /// query, capped at 10 names to keep the query under PubMed's length
    /// limit, mirroring `_search_trusted_journals` in the original
    /// prototype rather than only searching the single highest-boost name.
    pub async fn search_trusted_journals(&self, journals: &[String], window: &LookbackWindow) -> Result<Vec<CandidatePaper>, SourceError> {
        if journals.is_empty() {
            return Ok(Vec::new());
        }
        let filter = journals.iter().take(10).map(|j| format!("\"{j}\"[journal]")).collect::<Vec<_>>().join(" OR ");
        let query = format!("({filter}) AND (resistance training OR hypertrophy OR strength training OR protein synthesis)");
        self.search_query(&query, window).await
    }

    /// OR-combines every registry author name into one `[author]`-tagged
    /// query, capped at 10 names, mirroring `_search_by_trusted_authors`.
    pub async fn search_trusted_authors(&self, authors: &[String], window: &LookbackWindow) -> Result<Vec<CandidatePaper>, SourceError> {
        if authors.is_empty() {
            return Ok(Vec::new());
        }
        let filter = authors.iter().take(10).map(|a| format!("\"{a}\"[author]")).collect::<Vec<_>>().join(" OR ");
        let query = format!("({filter})");
        self.search_query(&query, window).await
    }
}

fn unwrap_breaker<T>(result: Result<T, crate::resilience::circuit_breaker::CallError<SourceError>>) -> Result<T, SourceError> {
    match result {
        Ok(v) => Ok(v),
        Err(crate::resilience::circuit_breaker::CallError::Open(_)) => {
            Err(SourceError::Transport("circuit breaker open".into()))
        }
        Err(crate::resilience::circuit_breaker::CallError::Inner(e)) => Err(e),
    }
}

fn study_design_from_publication_types(types: &[String]) -> Option<StudyDesign> {
    let lowered: Vec<String> = types.iter().map(|t| t.to_lowercase()).collect();
    if lowered.iter().any(|t| t.contains("meta-analysis")) {
        Some(StudyDesign::MetaAnalysis)
    } else if lowered.iter().any(|t| t.contains("systematic review")) {
        Some(StudyDesign::SystematicReview)
    } else if lowered.iter().any(|t| t.contains("randomized controlled trial")) {
        Some(StudyDesign::Rct)
    } else if lowered.is_empty() {
        None
    } else {
        Some(StudyDesign::Other)
    }
}

fn month_number(raw: &str) -> u32 {
    match raw {
        "Jan" | "January" => 1,
        "Feb" | "February" => 2,
        "Mar" | "March" => 3,
        "Apr" | "April" => 4,
        "May" => 5,
        "Jun" | "June" => 6,
        "Jul" | "July" => 7,
        "Aug" | "August" => 8,
        "Sep" | "September" => 9,
        "Oct" | "October" => 10,
        "Nov" | "November" => 11,
        "Dec" | "December" => 12,
        other => other.parse().unwrap_or(1),
    }
}

/// Parses a PubMed `efetch` XML document into candidate papers,
/// skipping individual `PubmedArticle` elements that fail to parse
/// rather than aborting the whole batch (§7(c) per-item parsing
/// failures).
fn parse_pubmed_xml(xml: &str) -> Vec<CandidatePaper> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut buf = Vec::new();

    let mut in_article = false;
    let mut pmid = String::new();
    let mut title = String::new();
    let mut abstract_text = String::new();
    let mut journal = String::new();
    let mut doi: Option<String> = None;
    let mut year: Option<i32> = None;
    let mut month: u32 = 1;
    let mut day: u32 = 1;
    let mut authors: Vec<String> = Vec::new();
    let mut last_name = String::new();
    let mut fore_name = String::new();
    let mut in_author = false;
    let mut pub_types: Vec<String> = Vec::new();
    let mut current_tag = String::new();
    let mut current_id_type: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "PubmedArticle" => {
                        in_article = true;
                        pmid.clear();
                        title.clear();
                        abstract_text.clear();
                        journal.clear();
                        doi = None;
                        year = None;
                        month = 1;
                        day = 1;
                        authors.clear();
                        pub_types.clear();
                    }
                    "Author" => in_author = true,
                    "ArticleId" => {
                        current_id_type = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref() == b"IdType")
                            .map(|a| String::from_utf8_lossy(&a.value).to_string());
                    }
                    _ => {}
                }
                current_tag = name;
            }
            Ok(Event::Text(t)) if in_article => {
                let text = t.unescape().unwrap_or_default().to_string();
                match current_tag.as_str() {
                    "PMID" if pmid.is_empty() => pmid = text,
                    "ArticleTitle" => title.push_str(&text),
                    "AbstractText" => {
                        if !abstract_text.is_empty() {
                            abstract_text.push(' ');
                        }
                        abstract_text.push_str(&text);
                    }
                    "Title" if journal.is_empty() => journal = text,
                    "LastName" if in_author => last_name = text,
                    "ForeName" if in_author => fore_name = text,
                    "Year" => year = text.parse().ok(),
                    "Month" => month = month_number(&text),
                    "Day" => day = text.parse().ok().unwrap_or(1),
                    "PublicationType" => pub_types.push(text),
                    "ArticleId" if current_id_type.as_deref() == Some("doi") => doi = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "Author" {
                    if !last_name.is_empty() {
                        let full = if fore_name.is_empty() { last_name.clone() } else { format!("{fore_name} {last_name}") };
                        authors.push(full);
                    }
                    last_name.clear();
                    fore_name.clear();
                    in_author = false;
                }
                if name == "PubmedArticle" {
                    in_article = false;
                    if !pmid.is_empty() && !title.is_empty() {
                        let publication_date = year.and_then(|y| {
                            chrono::NaiveDate::from_ymd_opt(y, month, day)
                                .and_then(|d| d.and_hms_opt(0, 0, 0))
                                .map(|dt| chrono::Utc.from_utc_datetime(&dt))
                        });
                        papers.push(CandidatePaper {
                            title: title.clone(),
                            authors: authors.clone(),
                            abstract_text: if abstract_text.is_empty() { None } else { Some(abstract_text.clone()) },
                            doi: doi.clone(),
                            url: Some(format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/")),
                            publication_date,
                            journal: if journal.is_empty() { None } else { Some(journal.clone()) },
                            study_design_hint: study_design_from_publication_types(&pub_types),
                            source_type: SourceType::Pubmed,
                            raw_data: serde_json::json!({ "pmid": pmid }),
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    papers
}

use chrono::TimeZone;
