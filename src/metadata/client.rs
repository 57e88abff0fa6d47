use crate::core::MetadataConfig;
use crate::metadata::corpus::{Enzyme, ReferenceCorpus, ReferenceProtein};
use crate::PlasticomeError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Anything that can hand a stage the current reference corpus
#[async_trait]
pub trait CorpusSource: Send + Sync {
    async fn fetch(&self) -> Result<ReferenceCorpus, PlasticomeError>;

    fn name(&self) -> &str;
}

/// Fetch the corpus, falling back to the empty (permissive) corpus when the
/// metadata source is unavailable.
pub async fn fetch_or_permissive(source: &dyn CorpusSource) -> ReferenceCorpus {
    match source.fetch().await {
        Ok(corpus) => {
            if corpus.is_empty() {
                warn!(source = source.name(), "Reference corpus is empty; filtering is permissive");
            }
            corpus
        }
        Err(e) => {
            warn!(
                source = source.name(),
                error = %e,
                "Reference data unavailable; continuing with permissive filtering"
            );
            ReferenceCorpus::empty()
        }
    }
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: Option<String>,
}

/// Enzyme record as served by `enzyme_find`
#[derive(Debug, Clone, Deserialize)]
pub struct EnzymeRecord {
    pub id: i64,
    #[serde(default)]
    pub ec_number: Option<String>,
    #[serde(default)]
    pub cazy_family: Option<String>,
    #[serde(default)]
    pub protein_sequence: Option<String>,
}

/// Plastic/enzyme relation as served by `plastic_enzyme_find`
#[derive(Debug, Clone, Deserialize)]
pub struct PlasticRelation {
    #[serde(default)]
    pub plastic_acronym: Option<String>,
    #[serde(default)]
    pub plastic: Option<String>,
}

impl PlasticRelation {
    fn category(&self) -> Option<&str> {
        self.plastic_acronym
            .as_deref()
            .or(self.plastic.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Client for the reference metadata REST service
pub struct MetadataClient {
    client: Client,
    config: MetadataConfig,
}

impl MetadataClient {
    pub fn new(config: MetadataConfig) -> Result<Self, PlasticomeError> {
        let client = Client::builder()
            .user_agent(concat!("Plasticome/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PlasticomeError::Metadata(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Exchange credentials for a bearer token
    pub async fn authenticate(&self) -> Result<String, PlasticomeError> {
        let response = self
            .client
            .post(self.url("auth"))
            .json(&AuthRequest {
                username: &self.config.username,
                secret: &self.config.secret,
            })
            .send()
            .await
            .map_err(|e| PlasticomeError::Metadata(format!("auth request failed: {}", e)))?;

        if response.status() != StatusCode::OK {
            return Err(PlasticomeError::Metadata(format!(
                "authentication rejected with status {}",
                response.status()
            )));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| PlasticomeError::Metadata(format!("invalid auth response: {}", e)))?;
        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PlasticomeError::Metadata("auth response has no access_token".to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, token: &str, path: &str) -> Result<T, PlasticomeError> {
        debug!(path, "GET metadata");
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PlasticomeError::Metadata(format!("GET {} failed: {}", path, e)))?;

        if response.status() != StatusCode::OK {
            return Err(PlasticomeError::Metadata(format!(
                "GET {} returned status {}",
                path,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PlasticomeError::Metadata(format!("GET {} returned invalid JSON: {}", path, e)))
    }

    pub async fn all_enzymes(&self, token: &str) -> Result<Vec<EnzymeRecord>, PlasticomeError> {
        self.get(token, "enzyme_find").await
    }

    pub async fn enzymes_by_ec(&self, token: &str, ec: &str) -> Result<Vec<EnzymeRecord>, PlasticomeError> {
        self.get(token, &format!("enzyme_find/ec/{}", ec)).await
    }

    pub async fn all_plastic_relations(&self, token: &str) -> Result<Vec<PlasticRelation>, PlasticomeError> {
        self.get(token, "plastic_enzyme_find").await
    }

    pub async fn plastics_for_enzyme(&self, token: &str, enzyme_id: i64) -> Result<Vec<String>, PlasticomeError> {
        let relations: Vec<PlasticRelation> = self
            .get(token, &format!("plastic_enzyme_find/{}", enzyme_id))
            .await?;
        Ok(relations
            .iter()
            .filter_map(|r| r.category().map(str::to_string))
            .collect())
    }

    /// Assemble the full reference corpus
    pub async fn fetch_corpus(&self) -> Result<ReferenceCorpus, PlasticomeError> {
        let token = self.authenticate().await?;
        let records = self.all_enzymes(&token).await?;
        let relations = self.all_plastic_relations(&token).await?;
        let categories: Vec<String> = relations
            .iter()
            .filter_map(|r| r.category().map(str::to_string))
            .collect();

        let mut enzymes = Vec::with_capacity(records.len());
        for record in records {
            let plastics = self.plastics_for_enzyme(&token, record.id).await?;
            let reference = record
                .protein_sequence
                .as_deref()
                .and_then(ReferenceProtein::parse);
            if reference.is_none() {
                debug!(enzyme = record.id, "Enzyme has no usable reference sequence");
            }
            enzymes.push(Enzyme {
                id: record.id,
                ec_number: record.ec_number.filter(|s| !s.is_empty()),
                cazy_family: record.cazy_family.filter(|s| !s.is_empty()),
                plastics,
                reference,
            });
        }

        debug!(enzymes = enzymes.len(), categories = categories.len(), "Fetched reference corpus");
        Ok(ReferenceCorpus::new(enzymes, categories))
    }
}

#[async_trait]
impl CorpusSource for MetadataClient {
    async fn fetch(&self) -> Result<ReferenceCorpus, PlasticomeError> {
        self.fetch_corpus().await
    }

    fn name(&self) -> &str {
        &self.config.base_url
    }
}

/// Fixed in-memory corpus, used offline and in tests
#[derive(Debug, Clone, Default)]
pub struct StaticCorpus {
    corpus: Option<ReferenceCorpus>,
}

impl StaticCorpus {
    pub fn new(corpus: ReferenceCorpus) -> Self {
        Self { corpus: Some(corpus) }
    }

    /// A source whose every fetch fails
    pub fn unavailable() -> Self {
        Self { corpus: None }
    }
}

#[async_trait]
impl CorpusSource for StaticCorpus {
    async fn fetch(&self) -> Result<ReferenceCorpus, PlasticomeError> {
        self.corpus
            .clone()
            .ok_or_else(|| PlasticomeError::Metadata("reference data unavailable".to_string()))
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_source_is_permissive() {
        let corpus = fetch_or_permissive(&StaticCorpus::unavailable()).await;
        assert!(corpus.is_empty());
    }

    #[tokio::test]
    async fn test_static_source_returns_corpus() {
        let enzyme = Enzyme {
            id: 7,
            ec_number: Some("3.1.1.74".to_string()),
            cazy_family: None,
            plastics: vec!["PET".to_string()],
            reference: None,
        };
        let source = StaticCorpus::new(ReferenceCorpus::new(vec![enzyme], Vec::new()));
        let corpus = fetch_or_permissive(&source).await;
        assert_eq!(corpus.len(), 1);
        assert!(corpus.match_ec("3.1.1.74"));
    }

    #[test]
    fn test_relation_category_prefers_acronym() {
        let relation: PlasticRelation =
            serde_json::from_str(r#"{"plastic_acronym": "PET", "plastic": "polyethylene terephthalate"}"#).unwrap();
        assert_eq!(relation.category(), Some("PET"));
        let relation: PlasticRelation = serde_json::from_str(r#"{"plastic": "PLA"}"#).unwrap();
        assert_eq!(relation.category(), Some("PLA"));
    }
}
