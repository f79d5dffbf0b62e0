//! Concept extraction collaborator.
//!
//! The engine does not extract concepts itself. A [`ConceptExtractor`]
//! (usually backed by a generative model) turns spark text into a short list
//! of concept names, and the graph consumes that list.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::GraphError;

/// Pluggable text-to-concepts service.
#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    /// Return 0-5 short concept names found in `text`.
    async fn extract_concepts(&self, text: &str) -> Result<Vec<String>, GraphError>;
}

/// Extractor that returns a fixed list regardless of input.
///
/// Useful for testing without calling a model.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    concepts: Vec<String>,
}

impl StaticExtractor {
    pub fn new<I, S>(concepts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            concepts: concepts.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ConceptExtractor for StaticExtractor {
    async fn extract_concepts(&self, _text: &str) -> Result<Vec<String>, GraphError> {
        Ok(self.concepts.clone())
    }
}

/// Trim names, drop blanks and collapse case-insensitive duplicates.
///
/// The first spelling of a duplicated name wins and input order is kept.
pub fn normalize_concepts<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| name.as_ref().trim())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_concepts() {
        let names = vec!["  Karbon ", "", "karbon", "Oksigen", "   "];
        assert_eq!(normalize_concepts(&names), vec!["Karbon", "Oksigen"]);
    }

    #[test]
    fn test_normalize_empty() {
        let names: Vec<String> = Vec::new();
        assert!(normalize_concepts(&names).is_empty());
    }

    #[tokio::test]
    async fn test_static_extractor() {
        let extractor = StaticExtractor::new(["Sel", "Membran"]);
        let concepts = extractor.extract_concepts("anything").await.unwrap();
        assert_eq!(concepts, vec!["Sel".to_string(), "Membran".to_string()]);
    }
}
