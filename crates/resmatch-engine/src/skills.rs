//! Skills database and keyword-based skill extraction.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use resmatch_core::{Error, Result};

/// Built-in technical skills, grouped by category.
const BUILTIN_SKILLS: &[(&str, &[&str])] = &[
    (
        "programming_languages",
        &[
            "Python", "Java", "JavaScript", "TypeScript", "C", "C++", "C#", "Go", "Rust", "Ruby",
            "PHP", "Swift", "Kotlin", "Scala", "R", "SQL", "Bash",
        ],
    ),
    (
        "web",
        &[
            "HTML", "CSS", "React", "Angular", "Vue", "Next.js", "Node.js", "Django", "Flask",
            "FastAPI", "Spring", "Express", "GraphQL", "REST",
        ],
    ),
    (
        "data",
        &[
            "PostgreSQL", "MySQL", "MongoDB", "Redis", "Elasticsearch", "Kafka", "Spark",
            "Hadoop", "Pandas", "NumPy", "Tableau",
        ],
    ),
    (
        "machine_learning",
        &[
            "Machine Learning", "Deep Learning", "NLP", "TensorFlow", "PyTorch",
            "scikit-learn", "Computer Vision",
        ],
    ),
    (
        "devops",
        &[
            "Docker", "Kubernetes", "AWS", "Azure", "GCP", "Terraform", "Ansible", "Jenkins",
            "CI/CD", "Linux", "Git",
        ],
    ),
    (
        "practices",
        &["Agile", "Scrum", "Microservices", "TDD", "System Design"],
    ),
];

/// A known skill and its compiled matcher.
#[derive(Debug, Clone)]
struct SkillPattern {
    name: String,
    pattern: Regex,
}

/// Deduplicated list of known skills with precompiled word-boundary matchers.
#[derive(Debug, Clone)]
pub struct SkillsDatabase {
    skills: Vec<SkillPattern>,
}

impl SkillsDatabase {
    /// Database built from the compiled-in skill list.
    pub fn builtin() -> Self {
        let names = BUILTIN_SKILLS
            .iter()
            .flat_map(|(_, skills)| skills.iter().map(|s| s.to_string()));
        // Built-in names are escaped literals, so compilation cannot fail.
        Self::from_names(names).unwrap_or(Self { skills: Vec::new() })
    }

    /// Load a JSON object mapping category names to lists of skills.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read skills database {}: {}",
                path.display(),
                e
            ))
        })?;
        let db = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            skill_count = db.len(),
            "Loaded skills database"
        );
        Ok(db)
    }

    /// Parse the category → skills JSON layout. Categories are read in name order.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let categories: BTreeMap<String, Vec<String>> = serde_json::from_str(raw)
            .map_err(|e| Error::Config(format!("Invalid skills database: {}", e)))?;
        Self::from_names(categories.into_values().flatten())
    }

    /// Build from skill names; later case-insensitive duplicates are dropped.
    pub fn from_names(names: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut skills = Vec::new();
        for name in names {
            let trimmed = name.trim();
            if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
                continue;
            }
            // Non-word neighbours instead of \b so names ending in symbols (C++, C#) match.
            let pattern = Regex::new(&format!(
                r"(?i)(?:^|[^\w]){}(?:[^\w]|$)",
                regex::escape(trimmed)
            ))
            .map_err(|e| Error::Config(format!("Bad skill pattern '{}': {}", trimmed, e)))?;
            skills.push(SkillPattern {
                name: trimmed.to_string(),
                pattern,
            });
        }
        Ok(Self { skills })
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Skills mentioned in `text`, in database order, using canonical casing.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let found: Vec<String> = self
            .skills
            .iter()
            .filter(|s| s.pattern.is_match(text))
            .map(|s| s.name.clone())
            .collect();
        debug!(skill_count = found.len(), "Extracted skills");
        found
    }
}

impl Default for SkillsDatabase {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_populated_and_deduplicated() {
        let db = SkillsDatabase::builtin();
        assert!(db.len() > 50);
        let names: HashSet<String> = db.skills.iter().map(|s| s.name.to_lowercase()).collect();
        assert_eq!(names.len(), db.len());
    }

    #[test]
    fn test_extract_is_case_insensitive_with_canonical_names() {
        let db = SkillsDatabase::builtin();
        let skills = db.extract("Worked with python, DOCKER and kubernetes daily.");
        assert!(skills.contains(&"Python".to_string()));
        assert!(skills.contains(&"Docker".to_string()));
        assert!(skills.contains(&"Kubernetes".to_string()));
    }

    #[test]
    fn test_extract_respects_word_boundaries() {
        let db = SkillsDatabase::from_names(vec!["Go".to_string(), "Java".to_string()]).unwrap();
        assert!(db.extract("Good at gossip; JavaScript fan").is_empty());
        assert_eq!(db.extract("Go and Java"), vec!["Go", "Java"]);
    }

    #[test]
    fn test_extract_symbol_suffixed_skills() {
        let db = SkillsDatabase::from_names(vec!["C++".to_string(), "C#".to_string()]).unwrap();
        assert_eq!(db.extract("Expert in C++ and C#."), vec!["C++", "C#"]);
    }

    #[test]
    fn test_from_json_deduplicates_across_categories() {
        let raw = r#"{"a": ["Rust", "SQL"], "b": ["rust", "Docker", " "]}"#;
        let db = SkillsDatabase::from_json_str(raw).unwrap();
        assert_eq!(db.len(), 3);
    }

    #[test]
    fn test_from_json_rejects_bad_layout() {
        let err = SkillsDatabase::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skills.json");
        std::fs::write(&path, r#"{"langs": ["Haskell", "OCaml"]}"#).unwrap();
        let db = SkillsDatabase::from_json_file(&path).unwrap();
        assert_eq!(db.extract("I write haskell"), vec!["Haskell"]);

        let missing = SkillsDatabase::from_json_file(&dir.path().join("nope.json"));
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
