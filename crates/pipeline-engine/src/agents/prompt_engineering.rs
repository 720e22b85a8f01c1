//! Synthesizes per-category system prompts for the coaching assistant
//! from the current knowledge base, versions them, and activates the
//! newest version when appropriate. Grounded on
//! `prompt_engineering_agent.py`'s template table, regeneration
//! thresholds, and activation rule.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::{Agent, AgentRunReport};
use crate::config::AgentSchedule;
use crate::error::PipelineError;
use crate::store::Store;
use crate::types::{validate_prompt_text, Category, PromptVersion, PromptVersionId, ScientificClaim};

const MIN_EVIDENCE_LEVEL: u8 = 2;
const MIN_CONFIDENCE: f64 = 0.7;
const ANALYSIS_LIMIT: usize = 50;
const GROWTH_RATIO: f64 = 1.2;
const EVIDENCE_SHIFT_THRESHOLD: f64 = 0.5;
const MAX_PROMPT_AGE_DAYS: i64 = 7;

static PROMPT_TEMPLATES: Lazy<HashMap<Category, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            Category::Strength,
            "You are an expert strength training coach with deep knowledge of exercise science.\n\n\
Your responses must be based on the following scientific evidence:\n\n{evidence_section}\n\n\
Guidelines:\n\
1. Always cite the evidence level (1-5) for each claim\n\
2. Distinguish between established facts and emerging research\n\
3. Acknowledge when evidence is conflicting or limited\n\
4. Provide practical, actionable advice\n\
5. Consider individual differences (training age, genetics, injury history)\n\n\
When evidence is insufficient, say so clearly and explain why.\n",
        ),
        (
            Category::Hypertrophy,
            "You are an expert in muscle hypertrophy and body composition.\n\n\
Scientific foundation:\n{evidence_section}\n\n\
Response guidelines:\n\
1. Reference specific studies when making claims\n\
2. Explain mechanisms (mTOR, muscle protein synthesis, etc.)\n\
3. Distinguish between trained and untrained individuals\n\
4. Address common myths with evidence\n\
5. Provide periodization recommendations\n",
        ),
        (
            Category::Nutrition,
            "You are a sports nutrition specialist.\n\n\
Evidence base:\n{evidence_section}\n\n\
Key principles:\n\
1. Base recommendations on peer-reviewed, scientific research\n\
2. Consider total caloric context\n\
3. Address nutrient timing when relevant\n\
4. Distinguish between optimal and adequate intake\n\
5. Note individual variability in response\n",
        ),
        (
            Category::Recovery,
            "You are a recovery and regeneration specialist.\n\n\
Scientific basis:\n{evidence_section}\n\n\
Approach:\n\
1. Emphasize evidence-based recovery modalities\n\
2. Distinguish between active and passive recovery\n\
3. Address sleep, stress, and lifestyle factors\n\
4. Consider training load context\n\
5. Acknowledge limitations in recovery research\n",
        ),
        (
            Category::Endurance,
            "You are a cardiovascular training specialist.\n\n\
Evidence base:\n{evidence_section}\n\n\
Guidelines:\n\
1. Reference heart rate zones and training intensities, backed by scientific evidence\n\
2. Distinguish between aerobic and anaerobic training\n\
3. Consider individual fitness levels\n\
4. Address VO2max and endurance adaptations\n\
5. Provide progressive overload recommendations\n",
        ),
        (
            Category::General,
            "You are an AI fitness coach powered by scientific research.\n\n\
Current knowledge base:\n{evidence_section}\n\n\
Core principles:\n\
1. Prioritize safety and long-term health\n\
2. Base recommendations on scientific consensus and evidence\n\
3. Acknowledge uncertainty when appropriate\n\
4. Encourage progressive overload\n\
5. Emphasize consistency over perfection\n",
        ),
    ])
});

fn template_for(category: Category) -> &'static str {
    PROMPT_TEMPLATES.get(&category).copied().unwrap_or_else(|| PROMPT_TEMPLATES[&Category::General])
}

#[derive(Debug, Clone)]
struct KnowledgeSummary {
    total_claims: usize,
    avg_evidence_level: f64,
    avg_confidence: f64,
    top_claims: Vec<ScientificClaim>,
    conflicting_areas: Vec<String>,
    knowledge_gaps: Vec<String>,
}

pub struct PromptEngineeringAgent {
    schedule: AgentSchedule,
    store: Arc<dyn Store>,
    categories: Vec<Category>,
}

impl PromptEngineeringAgent {
    pub fn new(schedule: AgentSchedule, store: Arc<dyn Store>) -> Self {
        Self { schedule, store, categories: Category::ALL.to_vec() }
    }

    async fn analyze_knowledge(&self, category: Category) -> Result<KnowledgeSummary, PipelineError> {
        let claims = self
            .store
            .list_by_category_filtered(category, MIN_EVIDENCE_LEVEL, MIN_CONFIDENCE, ANALYSIS_LIMIT)
            .await?;

        if claims.is_empty() {
            return Ok(KnowledgeSummary {
                total_claims: 0,
                avg_evidence_level: 0.0,
                avg_confidence: 0.0,
                top_claims: Vec::new(),
                conflicting_areas: Vec::new(),
                knowledge_gaps: Vec::new(),
            });
        }

        let avg_evidence_level = claims.iter().map(|c| c.evidence_level as f64).sum::<f64>() / claims.len() as f64;
        let avg_confidence = claims.iter().map(|c| c.confidence_score).sum::<f64>() / claims.len() as f64;

        let mut sorted = claims.clone();
        sorted.sort_by(|a, b| {
            (b.evidence_level, b.confidence_score)
                .partial_cmp(&(a.evidence_level, a.confidence_score))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted.truncate(10);

        let conflicting_areas: Vec<String> =
            claims.iter().filter(|c| c.conflicting_evidence).map(|c| c.claim_text.clone()).collect();

        let mut knowledge_gaps = Vec::new();
        if claims.len() < 10 {
            knowledge_gaps.push(format!("Limited research available ({} claims)", claims.len()));
        }
        if avg_evidence_level < 3.0 {
            knowledge_gaps.push("Most evidence is from lower-quality studies".to_string());
        }

        Ok(KnowledgeSummary {
            total_claims: claims.len(),
            avg_evidence_level,
            avg_confidence,
            top_claims: sorted,
            conflicting_areas,
            knowledge_gaps,
        })
    }

    fn should_update(&self, current: Option<&PromptVersion>, summary: &KnowledgeSummary) -> bool {
        let Some(current) = current else { return true };
        let snapshot = &current.knowledge_snapshot;

        let snapshot_total = snapshot.get("total_claims").and_then(|v| v.as_f64()).unwrap_or(0.0);
        if summary.total_claims as f64 > snapshot_total * GROWTH_RATIO {
            return true;
        }

        let snapshot_evidence = snapshot.get("avg_evidence_level").and_then(|v| v.as_f64()).unwrap_or(0.0);
        if (summary.avg_evidence_level - snapshot_evidence).abs() > EVIDENCE_SHIFT_THRESHOLD {
            return true;
        }

        let snapshot_conflicts =
            snapshot.get("conflicting_areas").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0);
        if summary.conflicting_areas.len() > snapshot_conflicts {
            return true;
        }

        (chrono::Utc::now() - current.created_at).num_days() > MAX_PROMPT_AGE_DAYS
    }

    fn generate_prompt(&self, category: Category, summary: &KnowledgeSummary) -> String {
        let evidence_section = self.format_evidence_section(summary);
        let mut prompt = template_for(category).replace("{evidence_section}", &evidence_section);

        if !summary.conflicting_areas.is_empty() {
            let section: String = summary.conflicting_areas.iter().map(|c| format!("- {c}")).collect::<Vec<_>>().join("\n");
            prompt.push_str(&format!("\n\nAreas of Active Research/Debate:\n{section}"));
        }
        if !summary.knowledge_gaps.is_empty() {
            let section: String = summary.knowledge_gaps.iter().map(|g| format!("- {g}")).collect::<Vec<_>>().join("\n");
            prompt.push_str(&format!("\n\nCurrent Knowledge Limitations:\n{section}"));
        }
        prompt
    }

    fn format_evidence_section(&self, summary: &KnowledgeSummary) -> String {
        let mut lines = vec![
            format!("Total scientific claims: {}", summary.total_claims),
            format!("Average evidence level: {:.1}/5", summary.avg_evidence_level),
            format!("Average confidence: {:.0}%", summary.avg_confidence * 100.0),
            String::new(),
            "Key findings (highest evidence):".to_string(),
        ];
        for (i, claim) in summary.top_claims.iter().take(5).enumerate() {
            lines.push(format!(
                "{}. [{}/5] {} (confidence: {:.0}%)",
                i + 1,
                claim.evidence_level,
                claim.claim_text,
                claim.confidence_score * 100.0
            ));
        }
        lines.join("\n")
    }

    fn snapshot(summary: &KnowledgeSummary) -> serde_json::Value {
        serde_json::json!({
            "total_claims": summary.total_claims,
            "avg_evidence_level": summary.avg_evidence_level,
            "avg_confidence": summary.avg_confidence,
            "conflicting_areas": summary.conflicting_areas,
        })
    }

    /// First version for a category, or no currently active version, or
    /// a strictly newer version than whatever is active now.
    fn should_activate(version: &PromptVersion, current: Option<&PromptVersion>) -> bool {
        if version.version == 1 {
            return true;
        }
        match current {
            None => true,
            Some(current) => version.version > current.version,
        }
    }

    async fn process_category(&self, category: Category) -> Result<(bool, bool), PipelineError> {
        let summary = self.analyze_knowledge(category).await?;
        let current = self.store.active_prompt(category).await?;

        if !self.should_update(current.as_ref(), &summary) {
            return Ok((false, false));
        }

        let prompt_text = self.generate_prompt(category, &summary);
        if validate_prompt_text(&prompt_text).is_err() {
            tracing::warn!(?category, "generated prompt failed validation, skipping");
            return Ok((false, false));
        }

        let latest = self.store.latest_prompt_version(category).await?;
        let version_num = latest.map(|v| v.version + 1).unwrap_or(1);

        let saved = self
            .store
            .save_prompt_version(PromptVersion {
                id: PromptVersionId::new(),
                category,
                text: prompt_text,
                version: version_num,
                knowledge_snapshot: Self::snapshot(&summary),
                is_active: false,
                created_at: chrono::Utc::now(),
            })
            .await?;

        let activated = if Self::should_activate(&saved, current.as_ref()) {
            self.store.activate_prompt_version(saved.id).await?;
            true
        } else {
            false
        };

        Ok((true, activated))
    }
}

#[async_trait]
impl Agent for PromptEngineeringAgent {
    fn name(&self) -> &'static str {
        "prompt_engineering"
    }

    async fn process(&self) -> Result<AgentRunReport, PipelineError> {
        let mut processed = 0u64;
        let mut errors = 0u64;
        let mut generated = 0u64;
        let mut activated = 0u64;

        for &category in &self.categories {
            processed += 1;
            match self.process_category(category).await {
                Ok((did_generate, did_activate)) => {
                    if did_generate {
                        generated += 1;
                    }
                    if did_activate {
                        activated += 1;
                    }
                }
                Err(e) => {
                    errors += 1;
                    tracing::error!(?category, error = %e, "prompt engineering failed");
                }
            }
        }

        let _ = self.schedule.batch_size;
        Ok(AgentRunReport::new(processed, errors)
            .with_details(serde_json::json!({ "prompts_generated": generated, "prompts_activated": activated })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::InMemoryStore;
    use crate::types::{ClaimId, ClaimStatus, EmbeddingStatus, Provenance, StudyMetadata};
    use std::time::Duration;

    fn schedule() -> AgentSchedule {
        AgentSchedule { interval: Duration::from_secs(60), batch_size: 50, enabled: true }
    }

    fn claim(category: Category, evidence_level: u8, confidence: f64) -> ScientificClaim {
        ScientificClaim {
            id: ClaimId::new(),
            claim_text: "Progressive overload increases strength over time".into(),
            summary: "summary".into(),
            category,
            evidence_level,
            confidence_score: confidence,
            status: ClaimStatus::Active,
            provenance: Provenance::default(),
            study: StudyMetadata::default(),
            key_findings: vec![],
            limitations: None,
            conflicting_evidence: false,
            embedding_status: EmbeddingStatus::Completed,
            embedding: None,
            embedding_error: None,
            auto_validated: false,
            duplicate_of: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn first_run_generates_and_activates_every_category() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_draft(claim(Category::Strength, 4, 0.85)).await.unwrap();
        let agent = PromptEngineeringAgent::new(schedule(), store.clone());

        let report = agent.process().await.unwrap();
        assert_eq!(report.errors, 0);
        assert!(report.details["prompts_generated"].as_u64().unwrap() >= 1);

        let active = store.active_prompt(Category::Strength).await.unwrap();
        assert!(active.is_some());
        assert!(active.unwrap().text.contains("evidence"));
    }

    #[tokio::test]
    async fn unchanged_knowledge_does_not_regenerate() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_draft(claim(Category::Nutrition, 4, 0.85)).await.unwrap();
        let agent = PromptEngineeringAgent::new(schedule(), store.clone());

        agent.process().await.unwrap();
        let first_version = store.active_prompt(Category::Nutrition).await.unwrap().unwrap().version;

        let report = agent.process().await.unwrap();
        let second_version = store.active_prompt(Category::Nutrition).await.unwrap().unwrap().version;
        assert_eq!(first_version, second_version);
        assert_eq!(report.details["prompts_generated"].as_u64().unwrap(), 0);
    }

    #[test]
    fn template_lookup_falls_back_to_general() {
        let t = template_for(Category::Technique);
        assert!(t.contains("evidence"));
    }
}
