//! End-to-end scoring with a custom skills database file.

use resmatch_core::{Error, MatchingEngine, ResumeDocument};
use resmatch_engine::{EngineConfig, KeywordMatchingEngine};

fn write_skills(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("technical_skills.json");
    std::fs::write(
        &path,
        r#"{
            "languages": ["Elixir", "Erlang", "Rust"],
            "infra": ["Nomad", "Consul", "rust"]
        }"#,
    )
    .unwrap();
    path
}

#[test]
fn test_engine_uses_configured_skills_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::default().with_skills_db_path(write_skills(&dir));
    let engine = KeywordMatchingEngine::from_config(&config).unwrap();

    // "Rust" repeats "rust" case-insensitively.
    assert_eq!(engine.skills().len(), 5);

    let profile = engine
        .analyze("Platform team hiring: Elixir, Nomad and Consul. Python welcome.")
        .unwrap();
    assert_eq!(profile.skills, vec!["Nomad", "Consul", "Elixir"]);

    let resume = ResumeDocument {
        name: "jane.md".to_string(),
        text: "Jane: five years of Elixir on Nomad clusters.".to_string(),
    };
    let result = engine.score(&resume, &profile).unwrap();
    assert_eq!(result.resume_name, "jane.md");
    assert_eq!(result.matching_skills, vec!["Nomad", "Elixir"]);
    assert_eq!(result.missing_skills, vec!["Consul"]);
    assert_eq!(result.skill_match, 66.67);
}

#[test]
fn test_engine_reports_missing_database_as_config_error() {
    let config = EngineConfig::default().with_skills_db_path("/nonexistent/skills.json");
    let err = KeywordMatchingEngine::from_config(&config).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_scores_are_rounded_to_two_decimals() {
    let engine = KeywordMatchingEngine::default();
    let profile = engine.analyze("Java Spring Kafka microservices").unwrap();
    let resume = ResumeDocument {
        name: "cv.txt".to_string(),
        text: "Java developer who built Kafka pipelines".to_string(),
    };
    let r = engine.score(&resume, &profile).unwrap();
    for score in [r.overall_score, r.skill_match, r.text_similarity, r.semantic_similarity] {
        assert!((score * 100.0 - (score * 100.0).round()).abs() < 1e-6);
    }
}
