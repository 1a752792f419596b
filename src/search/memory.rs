use std::collections::HashSet;

use async_trait::async_trait;

use super::{PolicySearch, SearchError, SearchHit, SearchQuery};

/// In-memory policy index for testing, ranked by query term overlap.
pub struct InMemoryPolicyIndex {
    entries: Vec<SearchHit>,
}

impl InMemoryPolicyIndex {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, id: &str, source_path: &str, content: &str, caption: Option<&str>) {
        self.entries.push(SearchHit {
            id: id.to_string(),
            source_path: source_path.to_string(),
            content: content.to_string(),
            caption: caption.map(|s| s.to_string()),
            score: None,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryPolicyIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl PolicySearch for InMemoryPolicyIndex {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SearchError> {
        let query_terms = terms(&query.text);

        let mut scored: Vec<(usize, &SearchHit)> = self
            .entries
            .iter()
            .map(|entry| {
                let entry_terms = terms(&format!("{} {}", entry.content, entry.source_path));
                (query_terms.intersection(&entry_terms).count(), entry)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        // Stable: ties keep insertion order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(query.top)
            .map(|(score, entry)| SearchHit {
                score: Some(score as f64),
                ..entry.clone()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchMode;
    use crate::settings::RetrievalSettings;

    fn index() -> InMemoryPolicyIndex {
        let mut index = InMemoryPolicyIndex::new();
        index.add(
            "humira-1",
            "policies/humira_crohns.pdf",
            "Adalimumab (Humira) is covered for moderate to severe Crohn's disease after failure of conventional therapy.",
            Some("Humira for Crohn's disease"),
        );
        index.add(
            "epidiolex-1",
            "policies/epidiolex.pdf",
            "Cannabidiol (Epidiolex) for Lennox-Gastaut syndrome seizures.",
            None,
        );
        index
    }

    fn query(text: &str) -> SearchQuery {
        SearchQuery::from_settings(text, SearchMode::Hybrid, &RetrievalSettings::default())
    }

    #[tokio::test]
    async fn ranks_matching_policy_first() {
        let hits = index()
            .search(&query("Crohn disease adalimumab prior authorization"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "humira-1");
        assert!(hits[0].score.unwrap() >= 2.0);
    }

    #[tokio::test]
    async fn unrelated_query_returns_nothing() {
        let hits = index()
            .search(&query("common cold rhinovirus antibiotic"))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn respects_top() {
        let mut index = index();
        for i in 0..10 {
            index.add(&format!("dup-{i}"), "policies/dup.pdf", "seizures policy", None);
        }
        let mut q = query("seizures");
        q.top = 3;
        assert_eq!(index.search(&q).await.unwrap().len(), 3);
    }
}
