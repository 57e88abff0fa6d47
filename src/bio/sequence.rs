use serde::{Deserialize, Serialize};

/// A protein sequence record as read from (or written to) FASTA
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub description: Option<String>,
    pub sequence: Vec<u8>,
}

impl Sequence {
    pub fn new(id: String, sequence: Vec<u8>) -> Self {
        Self {
            id,
            description: None,
            sequence,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn residues(&self) -> String {
        String::from_utf8_lossy(&self.sequence).to_string()
    }

    pub fn header(&self) -> String {
        match &self.description {
            Some(desc) if !desc.is_empty() => format!(">{} {}", self.id, desc),
            _ => format!(">{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_with_and_without_description() {
        let seq = Sequence::new("XP_001".to_string(), b"MKTAYIAK".to_vec());
        assert_eq!(seq.header(), ">XP_001");

        let seq = seq.with_description("cutinase [Fusarium solani]".to_string());
        assert_eq!(seq.header(), ">XP_001 cutinase [Fusarium solani]");
        assert_eq!(seq.len(), 8);
        assert_eq!(seq.residues(), "MKTAYIAK");
    }
}
