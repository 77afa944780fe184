use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use anyhow::Result;

use crate::api::LegalAiClient;

const BUNDLED_CATEGORIES: &str = include_str!("../assets/categories.json");
pub const SERVICES_FILE: &str = "navigation_data.json";

/// A starter question shown on the welcome view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suggestion {
    pub title: &'static str,
    pub text: &'static str,
    pub query: &'static str,
}

pub const SUGGESTIONS: [Suggestion; 4] = [
    Suggestion {
        title: "Fundamental Rights",
        text: "What are the fundamental rights in Nepal's constitution?",
        query: "What are the fundamental rights guaranteed by the Constitution of Nepal?",
    },
    Suggestion {
        title: "Citizenship Laws",
        text: "How is citizenship acquired in Nepal?",
        query: "How can someone acquire Nepali citizenship?",
    },
    Suggestion {
        title: "Civil Service",
        text: "What are employee rights in civil service?",
        query: "What are the rights and benefits of civil service employees in Nepal?",
    },
    Suggestion {
        title: "Privacy Laws",
        text: "What are privacy laws in Nepal?",
        query: "What does Nepal's Individual Privacy Act protect?",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subcategory {
    pub title: String,
    pub localized_text: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    pub localized_title: String,
    pub subcategories: Vec<Subcategory>,
}

#[derive(Deserialize)]
struct CategoryFile {
    categories: Vec<Category>,
}

/// The topic taxonomy compiled into the binary.
pub fn bundled_categories() -> Result<Vec<Category>> {
    let file: CategoryFile = serde_json::from_str(BUNDLED_CATEGORIES)?;
    Ok(file.categories)
}

/// One entry of the service directory document.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub category: String,
    pub service_name: String,
    pub details: Map<String, Value>,
}

impl Service {
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };

        let category = take_non_empty(&mut fields, "category")?;
        let service_name = take_non_empty(&mut fields, "service_name")?;

        Some(Self {
            category,
            service_name,
            details: fields,
        })
    }
}

fn take_non_empty(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// Services grouped by category, categories in name order.
#[derive(Debug, Clone, Default)]
pub struct ServiceDirectory {
    groups: BTreeMap<String, Vec<Service>>,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `{ "services": [...] }`. Entries without a category or a
    /// service name are dropped.
    pub fn from_json(content: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(content)?;

        let entries = match document.get("services") {
            Some(Value::Array(entries)) => entries.clone(),
            _ => Vec::new(),
        };

        let mut directory = Self::new();
        let mut skipped = 0usize;

        for entry in entries {
            match Service::from_value(entry) {
                Some(service) => directory
                    .groups
                    .entry(service.category.clone())
                    .or_default()
                    .push(service),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::debug!(skipped, "ignored incomplete service entries");
        }

        Ok(directory)
    }

    /// Read the directory from a file path or an http(s) URL.
    pub async fn load(source: &str, client: &LegalAiClient) -> Result<Self> {
        let content = if source.starts_with("http://") || source.starts_with("https://") {
            client.fetch_document(source).await?
        } else {
            tokio::fs::read_to_string(source).await?
        };

        let directory = Self::from_json(&content)?;
        tracing::info!(
            "loaded {} services in {} categories from {}",
            directory.total(),
            directory.groups.len(),
            source
        );
        Ok(directory)
    }

    /// Where to look for the directory: explicit setting, then the working
    /// directory, then the config directory.
    pub fn locate(configured: Option<&str>) -> Option<String> {
        if let Some(source) = configured {
            return Some(source.to_string());
        }

        let local = Path::new(SERVICES_FILE);
        if local.exists() {
            return Some(SERVICES_FILE.to_string());
        }

        let config_path: Option<PathBuf> =
            dirs::config_dir().map(|p| p.join("nyaya").join(SERVICES_FILE));
        config_path
            .filter(|p| p.exists())
            .map(|p| p.to_string_lossy().into_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[Service])> {
        self.groups
            .iter()
            .map(|(name, services)| (name.as_str(), services.as_slice()))
    }

    pub fn services_in(&self, category: &str) -> &[Service] {
        self.groups
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bundled_taxonomy_parses() {
        let categories = bundled_categories().unwrap();

        assert!(!categories.is_empty());
        assert_eq!(categories[0].id, "consumer-grievances");
        assert!(categories
            .iter()
            .all(|c| !c.subcategories.is_empty() && !c.localized_title.is_empty()));
        assert!(categories
            .iter()
            .flat_map(|c| &c.subcategories)
            .all(|s| !s.query.is_empty()));
    }

    #[test]
    fn groups_services_by_category() {
        let directory = ServiceDirectory::from_json(
            r#"{"services": [
                {"category": "Transport", "service_name": "Driving License", "office": "DoTM"},
                {"category": "Identity", "service_name": "Passport"},
                {"category": "Transport", "service_name": "Bluebook Renewal"}
            ]}"#,
        )
        .unwrap();

        let names: Vec<&str> = directory.categories().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Identity", "Transport"]);

        let transport: Vec<&str> = directory
            .services_in("Transport")
            .iter()
            .map(|s| s.service_name.as_str())
            .collect();
        assert_eq!(transport, vec!["Driving License", "Bluebook Renewal"]);
        assert_eq!(
            directory.services_in("Transport")[0].details.get("office"),
            Some(&Value::String("DoTM".into()))
        );
        assert_eq!(directory.total(), 3);
    }

    #[test]
    fn malformed_entries_are_excluded() {
        let directory = ServiceDirectory::from_json(
            r#"{"services": [
                {"category": "Identity"},
                {"service_name": "Orphan"},
                {"category": "Identity", "service_name": ""},
                {"category": 7, "service_name": "Numeric"},
                "not an object",
                {"category": "Identity", "service_name": "National ID"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(directory.total(), 1);
        assert_eq!(directory.services_in("Identity")[0].service_name, "National ID");
        assert!(directory.services_in("Orphan").is_empty());
    }

    #[test]
    fn missing_services_key_is_empty() {
        let directory = ServiceDirectory::from_json(r#"{"other": []}"#).unwrap();
        assert!(directory.is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(ServiceDirectory::from_json("{ nope").is_err());
    }

    #[tokio::test]
    async fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SERVICES_FILE);
        std::fs::write(
            &path,
            r#"{"services": [{"category": "Land", "service_name": "Land Transfer"}]}"#,
        )
        .unwrap();

        let client = LegalAiClient::new("http://localhost:8000");
        let directory = ServiceDirectory::load(path.to_str().unwrap(), &client)
            .await
            .unwrap();

        assert_eq!(directory.services_in("Land").len(), 1);
    }

    #[test]
    fn explicit_source_wins() {
        assert_eq!(
            ServiceDirectory::locate(Some("https://example.org/navigation_data.json")),
            Some("https://example.org/navigation_data.json".to_string())
        );
    }
}
