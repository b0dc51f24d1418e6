//! # resmatch-engine
//!
//! Default [`MatchingEngine`] for resmatch: skill-keyword overlap combined
//! with TF-IDF and character-shingle text similarity.
//!
//! ```text
//! overall = 0.6 * skill_match + 0.2 * text_similarity + 0.2 * semantic_similarity
//! ```

pub mod similarity;
pub mod skills;

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info};

use resmatch_core::defaults;
use resmatch_core::{Error, JobProfile, MatchResult, MatchingEngine, Result, ResumeDocument};

pub use skills::SkillsDatabase;

/// Environment variable naming a JSON skills database.
pub const ENV_SKILLS_DB_PATH: &str = "SKILLS_DB_PATH";

/// Configuration for [`KeywordMatchingEngine`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// JSON file of `{category: [skill, ...]}`. The built-in list is used when unset.
    pub skills_db_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let skills_db_path = std::env::var(ENV_SKILLS_DB_PATH)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        Self { skills_db_path }
    }

    pub fn with_skills_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.skills_db_path = Some(path.into());
        self
    }
}

/// Skill-keyword and text-similarity matching engine.
#[derive(Debug, Clone, Default)]
pub struct KeywordMatchingEngine {
    skills: SkillsDatabase,
}

impl KeywordMatchingEngine {
    pub fn new(skills: SkillsDatabase) -> Self {
        Self { skills }
    }

    /// Build from config, loading the skills database file if one is named.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let skills = match &config.skills_db_path {
            Some(path) => SkillsDatabase::from_json_file(path)?,
            None => SkillsDatabase::builtin(),
        };
        info!(skill_count = skills.len(), "Matching engine ready");
        Ok(Self::new(skills))
    }

    pub fn skills(&self) -> &SkillsDatabase {
        &self.skills
    }
}

impl MatchingEngine for KeywordMatchingEngine {
    fn analyze(&self, job_description: &str) -> Result<JobProfile> {
        let text = similarity::normalize(job_description);
        if text.is_empty() {
            return Err(Error::InvalidInput(
                "Job description is empty".to_string(),
            ));
        }
        let skills = self.skills.extract(&text);
        debug!(jd_skills = skills.len(), "Analyzed job description");
        Ok(JobProfile { text, skills })
    }

    fn score(&self, resume: &ResumeDocument, profile: &JobProfile) -> Result<MatchResult> {
        let start = Instant::now();
        let text = similarity::normalize(&resume.text);
        if text.is_empty() {
            return Err(Error::Matching(format!(
                "No text could be extracted from '{}'",
                resume.name
            )));
        }
        let resume_skills = self.skills.extract(&text);

        let have: HashSet<String> = resume_skills.iter().map(|s| s.to_lowercase()).collect();
        let (matching_skills, missing_skills): (Vec<String>, Vec<String>) = profile
            .skills
            .iter()
            .cloned()
            .partition(|s| have.contains(&s.to_lowercase()));

        let skill_match = if profile.skills.is_empty() {
            0.0
        } else {
            matching_skills.len() as f64 / profile.skills.len() as f64 * 100.0
        };

        let text_similarity = similarity::tfidf_similarity(
            similarity::truncate_chars(&text, defaults::TEXT_SIMILARITY_MAX_CHARS),
            similarity::truncate_chars(&profile.text, defaults::TEXT_SIMILARITY_MAX_CHARS),
        );
        let semantic_similarity = similarity::semantic_similarity(
            similarity::truncate_chars(&text, defaults::SEMANTIC_SIMILARITY_MAX_CHARS),
            similarity::truncate_chars(&profile.text, defaults::SEMANTIC_SIMILARITY_MAX_CHARS),
        );

        let overall = defaults::SKILL_MATCH_WEIGHT * skill_match
            + defaults::TEXT_SIMILARITY_WEIGHT * text_similarity
            + defaults::SEMANTIC_SIMILARITY_WEIGHT * semantic_similarity;

        debug!(
            resume = %resume.name,
            overall_score = overall,
            duration_ms = start.elapsed().as_millis() as u64,
            "Scored resume"
        );

        Ok(MatchResult {
            resume_name: resume.name.clone(),
            overall_score: similarity::round2(overall),
            skill_match: similarity::round2(skill_match),
            text_similarity: similarity::round2(text_similarity),
            semantic_similarity: similarity::round2(semantic_similarity),
            matching_skills,
            missing_skills,
            resume_skills,
            jd_skills: profile.skills.clone(),
            rank: None,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, text: &str) -> ResumeDocument {
        ResumeDocument {
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_analyze_rejects_blank_description() {
        let engine = KeywordMatchingEngine::default();
        let err = engine.analyze("   \n\t").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_analyze_extracts_skills() {
        let engine = KeywordMatchingEngine::default();
        let profile = engine
            .analyze("We need a Rust engineer with Docker and PostgreSQL.")
            .unwrap();
        assert!(profile.skills.contains(&"Rust".to_string()));
        assert!(profile.skills.contains(&"Docker".to_string()));
        assert!(profile.skills.contains(&"PostgreSQL".to_string()));
        assert_eq!(profile.text, profile.text.to_lowercase());
    }

    #[test]
    fn test_score_splits_matching_and_missing() {
        let engine = KeywordMatchingEngine::default();
        let profile = engine.analyze("Rust, Docker, Kubernetes").unwrap();
        let result = engine
            .score(&doc("cv.txt", "Built services in Rust and shipped with Docker."), &profile)
            .unwrap();

        assert_eq!(result.matching_skills, vec!["Rust", "Docker"]);
        assert_eq!(result.missing_skills, vec!["Kubernetes"]);
        assert_eq!(result.skill_match, 66.67);
        assert_eq!(result.jd_skills, profile.skills);
        assert!(result.error.is_none());
        assert!(result.rank.is_none());
    }

    #[test]
    fn test_score_overall_is_weighted_sum() {
        let engine = KeywordMatchingEngine::default();
        let profile = engine.analyze("Python and SQL developer").unwrap();
        let r = engine
            .score(&doc("cv.md", "Senior Python developer, strong SQL."), &profile)
            .unwrap();
        let expected = 0.6 * r.skill_match + 0.2 * r.text_similarity + 0.2 * r.semantic_similarity;
        assert!((r.overall_score - expected).abs() < 0.02);
        assert!(r.overall_score > 0.0 && r.overall_score <= 100.0);
    }

    #[test]
    fn test_score_without_jd_skills_has_zero_skill_match() {
        let engine = KeywordMatchingEngine::default();
        let profile = engine.analyze("Friendly team player").unwrap();
        let r = engine.score(&doc("cv.txt", "Friendly person"), &profile).unwrap();
        assert_eq!(r.skill_match, 0.0);
        assert!(r.missing_skills.is_empty());
    }

    #[test]
    fn test_score_rejects_empty_resume() {
        let engine = KeywordMatchingEngine::default();
        let profile = engine.analyze("Rust").unwrap();
        let err = engine.score(&doc("blank.txt", "  "), &profile).unwrap_err();
        assert!(matches!(err, Error::Matching(_)));
    }

    #[test]
    fn test_better_resume_scores_higher() {
        let engine = KeywordMatchingEngine::default();
        let profile = engine
            .analyze("Backend engineer: Rust, PostgreSQL, Redis, Docker, Kubernetes")
            .unwrap();
        let strong = engine
            .score(
                &doc("a", "Backend engineer using Rust, PostgreSQL, Redis, Docker, Kubernetes"),
                &profile,
            )
            .unwrap();
        let weak = engine
            .score(&doc("b", "Graphic designer with Photoshop experience"), &profile)
            .unwrap();
        assert!(strong.overall_score > weak.overall_score);
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::default().with_skills_db_path("/tmp/skills.json");
        assert_eq!(
            config.skills_db_path,
            Some(PathBuf::from("/tmp/skills.json"))
        );
    }
}
