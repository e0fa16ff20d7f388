// ==============================================================================
// federation.rs - Patient Matching Contract
// ==============================================================================
// Description: Patient identifiers and match results exchanged with a
//              federated patient-matching network
// Author: Matt Barham
// Created: 2025-11-20
// Modified: 2025-11-22
// Version: 1.1.0
// ==============================================================================
// Patient id: "{owner}.{individual_id}", e.g. "cust000.ADM1059A2"
// Scoring and transport live on the other side of this boundary.
// ==============================================================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Case, Individual};

const SEPARATOR: char = '.';

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("Score {score} of candidate {patient_id} is outside [0, 1]")]
    ScoreOutOfRange { patient_id: String, score: f64 },

    #[error("Invalid patient id: {0}")]
    InvalidPatientId(String),
}

/// Network-visible id of a case individual
pub fn patient_id(case: &Case, individual: &Individual) -> String {
    format!("{}{}{}", case.owner, SEPARATOR, individual.individual_id)
}

/// Split a patient id into (owner, individual_id)
///
/// Owners never contain '.', individual ids may.
pub fn split_patient_id(patient_id: &str) -> Result<(&str, &str), MatchError> {
    match patient_id.split_once(SEPARATOR) {
        Some((owner, individual)) if !owner.is_empty() && !individual.is_empty() => {
            Ok((owner, individual))
        }
        _ => Err(MatchError::InvalidPatientId(patient_id.to_string())),
    }
}

/// Resolve a patient id back to an individual of `case`
pub fn find_individual<'c>(case: &'c Case, patient_id: &str) -> Option<&'c Individual> {
    let (owner, individual_id) = split_patient_id(patient_id).ok()?;
    if owner != case.owner {
        return None;
    }
    case.individual(individual_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CandidateFields")]
pub struct MatchCandidate {
    pub patient_id: String,
    /// In [0, 1]
    pub score: f64,
    pub contact: Option<String>,
}

impl MatchCandidate {
    pub fn new(
        patient_id: impl Into<String>,
        score: f64,
        contact: Option<String>,
    ) -> Result<Self, MatchError> {
        let patient_id = patient_id.into();
        if !(0.0..=1.0).contains(&score) {
            return Err(MatchError::ScoreOutOfRange { patient_id, score });
        }
        Ok(Self {
            patient_id,
            score,
            contact,
        })
    }
}

#[derive(Deserialize)]
struct CandidateFields {
    patient_id: String,
    score: f64,
    contact: Option<String>,
}

impl TryFrom<CandidateFields> for MatchCandidate {
    type Error = MatchError;

    fn try_from(fields: CandidateFields) -> Result<Self, Self::Error> {
        Self::new(fields.patient_id, fields.score, fields.contact)
    }
}

/// Answer of one network node to a match query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResultFields")]
pub struct MatchResult {
    pub query_patient_id: String,
    pub node_id: String,
    /// Highest score first
    candidates: Vec<MatchCandidate>,
}

impl MatchResult {
    pub fn new(
        query_patient_id: impl Into<String>,
        node_id: impl Into<String>,
        mut candidates: Vec<MatchCandidate>,
    ) -> Result<Self, MatchError> {
        if let Some(bad) = candidates.iter().find(|c| !(0.0..=1.0).contains(&c.score)) {
            return Err(MatchError::ScoreOutOfRange {
                patient_id: bad.patient_id.clone(),
                score: bad.score,
            });
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(Self {
            query_patient_id: query_patient_id.into(),
            node_id: node_id.into(),
            candidates,
        })
    }

    pub fn candidates(&self) -> &[MatchCandidate] {
        &self.candidates
    }

    pub fn best(&self) -> Option<&MatchCandidate> {
        self.candidates.first()
    }
}

#[derive(Deserialize)]
struct ResultFields {
    query_patient_id: String,
    node_id: String,
    candidates: Vec<MatchCandidate>,
}

impl TryFrom<ResultFields> for MatchResult {
    type Error = MatchError;

    fn try_from(fields: ResultFields) -> Result<Self, Self::Error> {
        Self::new(fields.query_patient_id, fields.node_id, fields.candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Build, Phenotype, Sex, VcfFiles};
    use chrono::Utc;

    fn test_case() -> Case {
        Case {
            case_id: "cust000-643594".to_string(),
            display_name: "643594".to_string(),
            owner: "cust000".to_string(),
            collaborators: vec!["cust000".to_string()],
            individuals: vec![Individual {
                individual_id: "ADM1059A2".to_string(),
                display_name: "NA12882".to_string(),
                sex: Sex::Male,
                phenotype: Phenotype::Affected,
                paternal_id: "0".to_string(),
                maternal_id: "0".to_string(),
                capture_kits: Vec::new(),
            }],
            analysis_date: Utc::now(),
            gene_panels: Vec::new(),
            is_research: false,
            genome_build: Build::Grch37,
            rank_score_threshold: 0.0,
            rank_model_version: None,
            vcf_files: VcfFiles::default(),
            track: "rare".to_string(),
        }
    }

    #[test]
    fn test_patient_id_round_trip() {
        let case = test_case();
        let id = patient_id(&case, &case.individuals[0]);
        assert_eq!(id, "cust000.ADM1059A2");

        assert_eq!(split_patient_id(&id).unwrap(), ("cust000", "ADM1059A2"));
        assert_eq!(find_individual(&case, &id).unwrap().display_name, "NA12882");
        assert!(find_individual(&case, "cust001.ADM1059A2").is_none());
        assert!(split_patient_id("ADM1059A2").is_err());
    }

    #[test]
    fn test_candidates_ranked_by_score() {
        let result = MatchResult::new(
            "cust000.ADM1059A2",
            "node-b",
            vec![
                MatchCandidate::new("p1", 0.2, None).unwrap(),
                MatchCandidate::new("p2", 0.9, Some("clinic@example.org".to_string())).unwrap(),
                MatchCandidate::new("p3", 0.5, None).unwrap(),
            ],
        )
        .unwrap();

        let ids: Vec<&str> = result.candidates().iter().map(|c| c.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p3", "p1"]);
        assert_eq!(result.best().unwrap().score, 0.9);
    }

    #[test]
    fn test_score_out_of_range() {
        assert!(MatchCandidate::new("p1", 1.5, None).is_err());
        assert!(MatchCandidate::new("p1", f64::NAN, None).is_err());

        let forged = MatchCandidate {
            patient_id: "p1".to_string(),
            score: -0.1,
            contact: None,
        };
        assert!(matches!(
            MatchResult::new("q", "node", vec![forged]),
            Err(MatchError::ScoreOutOfRange { .. })
        ));
    }

    #[test]
    fn test_deserialized_results_are_validated_and_ranked() {
        let json = r#"{
            "query_patient_id": "cust000.ADM1059A2",
            "node_id": "node-b",
            "candidates": [
                {"patient_id": "p1", "score": 0.3, "contact": null},
                {"patient_id": "p2", "score": 0.8, "contact": "clinic@example.org"}
            ]
        }"#;
        let result: MatchResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.best().unwrap().patient_id, "p2");
        assert_eq!(result.candidates()[1].patient_id, "p1");

        let out_of_range = r#"{"patient_id": "p1", "score": 1.5, "contact": null}"#;
        assert!(serde_json::from_str::<MatchCandidate>(out_of_range).is_err());

        let nested = json.replace("0.8", "-0.2");
        assert!(serde_json::from_str::<MatchResult>(&nested).is_err());
    }
}
