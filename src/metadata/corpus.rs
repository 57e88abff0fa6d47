use crate::bio::Sequence;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

/// Reference protein attached to a curated enzyme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceProtein {
    pub id: String,
    pub description: Option<String>,
    pub sequence: String,
}

impl ReferenceProtein {
    /// Parse a metadata `protein_sequence` value (`>header RESIDUES`).
    /// Values without at least ten trailing uppercase residues are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| Regex::new(r"^(>.*?)([A-Z ]{10,})$").ok())
            .as_ref()?;

        let caps = pattern.captures(raw.trim())?;
        let header = caps.get(1)?.as_str().trim_start_matches('>').trim();
        let residues: String = caps
            .get(2)?
            .as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().filter(|s| !s.is_empty())?.to_string();
        let description = parts
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Some(Self {
            id,
            description,
            sequence: residues,
        })
    }

    pub fn to_sequence(&self) -> Sequence {
        let seq = Sequence::new(self.id.clone(), self.sequence.as_bytes().to_vec());
        match &self.description {
            Some(desc) => seq.with_description(desc.clone()),
            None => seq,
        }
    }

    /// Human-readable name: the description when present, the id otherwise
    pub fn display_name(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enzyme {
    pub id: i64,
    pub ec_number: Option<String>,
    pub cazy_family: Option<String>,
    /// Plastic categories this enzyme is reported to degrade
    #[serde(default)]
    pub plastics: Vec<String>,
    pub reference: Option<ReferenceProtein>,
}

impl Enzyme {
    pub fn matches(&self, label: &str) -> bool {
        self.ec_number.as_deref() == Some(label) || self.cazy_family.as_deref() == Some(label)
    }
}

/// Curated enzyme/plastic corpus. An empty corpus means "no filtering constraint".
#[derive(Debug, Clone, Default)]
pub struct ReferenceCorpus {
    enzymes: Vec<Enzyme>,
    by_label: HashMap<String, Vec<usize>>,
    by_reference: HashMap<String, usize>,
    categories: BTreeSet<String>,
}

impl ReferenceCorpus {
    pub fn new(enzymes: Vec<Enzyme>, categories: impl IntoIterator<Item = String>) -> Self {
        let mut by_label: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_reference = HashMap::new();
        let mut all_categories: BTreeSet<String> = categories.into_iter().collect();

        for (idx, enzyme) in enzymes.iter().enumerate() {
            for label in [&enzyme.ec_number, &enzyme.cazy_family].into_iter().flatten() {
                let entry = by_label.entry(label.clone()).or_default();
                if !entry.contains(&idx) {
                    entry.push(idx);
                }
            }
            if let Some(reference) = &enzyme.reference {
                by_reference.entry(reference.id.clone()).or_insert(idx);
            }
            all_categories.extend(enzyme.plastics.iter().cloned());
        }

        Self {
            enzymes,
            by_label,
            by_reference,
            categories: all_categories,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Permissive mode: nothing to filter against
    pub fn is_empty(&self) -> bool {
        self.enzymes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.enzymes.len()
    }

    pub fn enzymes(&self) -> &[Enzyme] {
        &self.enzymes
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.by_label.contains_key(label)
    }

    pub fn match_ec(&self, ec: &str) -> bool {
        self.enzymes.iter().any(|e| e.ec_number.as_deref() == Some(ec))
    }

    pub fn match_family(&self, family: &str) -> bool {
        self.enzymes.iter().any(|e| e.cazy_family.as_deref() == Some(family))
    }

    /// Enzymes sharing a label (EC number or family code)
    pub fn subset_for_label(&self, label: &str) -> Vec<&Enzyme> {
        self.by_label
            .get(label)
            .map(|idxs| idxs.iter().map(|&i| &self.enzymes[i]).collect())
            .unwrap_or_default()
    }

    /// Plastic categories associated with a label, sorted and deduplicated
    pub fn plastics_for_label(&self, label: &str) -> Vec<String> {
        let set: BTreeSet<String> = self
            .subset_for_label(label)
            .into_iter()
            .flat_map(|e| e.plastics.iter().cloned())
            .collect();
        set.into_iter().collect()
    }

    pub fn reference_name(&self, reference_id: &str) -> Option<&str> {
        self.by_reference
            .get(reference_id)
            .and_then(|&i| self.enzymes[i].reference.as_ref())
            .map(|r| r.display_name())
    }

    /// Reference proteins, one per distinct sequence id
    pub fn reference_sequences(&self) -> Vec<Sequence> {
        let mut seen = std::collections::HashSet::new();
        self.enzymes
            .iter()
            .filter_map(|e| e.reference.as_ref())
            .filter(|r| seen.insert(r.id.clone()))
            .map(|r| r.to_sequence())
            .collect()
    }

    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn enzyme(id: i64, ec: &str, family: &str, plastics: &[&str], seq: &str) -> Enzyme {
        Enzyme {
            id,
            ec_number: Some(ec.to_string()).filter(|s| !s.is_empty()),
            cazy_family: Some(family.to_string()).filter(|s| !s.is_empty()),
            plastics: plastics.iter().map(|s| s.to_string()).collect(),
            reference: ReferenceProtein::parse(seq),
        }
    }

    #[test]
    fn test_parse_reference_protein() {
        let protein = ReferenceProtein::parse(">sp|P11373|CUTI1 Cutinase 1 MKFFALTTLLAATASALPTSNPAQE").unwrap();
        assert_eq!(protein.id, "sp|P11373|CUTI1");
        assert_eq!(protein.description.as_deref(), Some("Cutinase 1"));
        assert_eq!(protein.sequence, "MKFFALTTLLAATASALPTSNPAQE");

        assert!(ReferenceProtein::parse(">short MKV").is_none());
        assert!(ReferenceProtein::parse("MKFFALTTLLAATASALP").is_none());
    }

    #[test]
    fn test_label_lookup() {
        let corpus = ReferenceCorpus::new(
            vec![
                enzyme(1, "3.1.1.74", "CE5", &["PET", "PCL"], ">ref1 Cutinase MKFFALTTLLAATAS"),
                enzyme(2, "3.1.1.74", "", &["PBAT"], ">ref2 Lipase MSSLLKKAAAGGVVL"),
                enzyme(3, "1.11.1.14", "AA2", &["PE"], ""),
            ],
            vec!["PS".to_string()],
        );

        assert!(corpus.match_ec("3.1.1.74"));
        assert!(corpus.match_family("AA2"));
        assert!(!corpus.match_family("3.1.1.74"));
        assert_eq!(corpus.subset_for_label("3.1.1.74").len(), 2);
        assert_eq!(corpus.plastics_for_label("3.1.1.74"), vec!["PBAT", "PCL", "PET"]);
        assert!(corpus.subset_for_label("9.9.9.9").is_empty());
        assert_eq!(corpus.reference_name("ref2"), Some("Lipase"));
        assert_eq!(corpus.reference_sequences().len(), 2);
        assert_eq!(
            corpus.categories().iter().cloned().collect::<Vec<_>>(),
            vec!["PBAT", "PCL", "PE", "PET", "PS"]
        );
    }

    #[test]
    fn test_empty_corpus_is_permissive() {
        let corpus = ReferenceCorpus::empty();
        assert!(corpus.is_empty());
        assert!(!corpus.contains_label("1.1.1.1"));
    }
}
