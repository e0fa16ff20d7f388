// ==============================================================================
// builder.rs - Canonical Entity Builders
// ==============================================================================
// Description: Deterministic identifiers and storage form of loaded entities
// Author: Matt Barham
// Created: 2025-11-17
// Modified: 2025-11-21
// Version: 1.1.0
// ==============================================================================
// Identifiers (SHA-256, lowercase hex, NUL after each component):
//   variant_id   = H(simple_id, case_id, variant_type, category)
//   document_id  = H(variant_id, institute)
//   gene         = "hgnc:{hgnc_id}:{build}"
//   transcript   = "{ensembl_transcript_id}:{build}"
// The same input always yields the same ids, so reloads upsert in place.
// ==============================================================================

use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

use crate::link::{GeneIndex, LinkedGenes};
use crate::models::{
    Case, Category, DiseaseTermRecord, GeneRecord, HpoTermRecord, TranscriptRecord, Variant,
    VariantType,
};
use crate::parsers::hpo::{HpoDisease, HpoTerm};
use crate::parsers::tabular::SourceTable;
use crate::parsers::variant::ParsedVariant;

pub const GENE_COLLECTION: &str = "hgnc_gene";
pub const TRANSCRIPT_COLLECTION: &str = "transcript";
pub const CASE_COLLECTION: &str = "case";
pub const VARIANT_COLLECTION: &str = "variant";
pub const HPO_TERM_COLLECTION: &str = "hpo_term";
pub const DISEASE_TERM_COLLECTION: &str = "disease_term";

/// An entity in its stored form
pub trait Document: serde::Serialize {
    /// Collection the entity lives in
    fn collection() -> &'static str;

    /// Deterministic upsert key
    fn document_id(&self) -> String;
}

fn hash_components(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for component in components {
        hasher.update(component.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Reload key of a variant within its case and load track
pub fn variant_id(
    simple_id: &str,
    case_id: &str,
    variant_type: VariantType,
    category: Category,
) -> String {
    hash_components(&[simple_id, case_id, variant_type.as_str(), category.as_str()])
}

/// Store key of a variant, scoped to the owning institute
pub fn document_id(variant_id: &str, institute: &str) -> String {
    hash_components(&[variant_id, institute])
}

/// Assembles canonical variants for one case
pub struct VariantBuilder<'a> {
    case: &'a Case,
    genes: &'a GeneIndex,
}

impl<'a> VariantBuilder<'a> {
    /// `genes` must be indexed from the case's genome build
    pub fn new(case: &'a Case, genes: &'a GeneIndex) -> Self {
        Self { case, genes }
    }

    pub fn build(&self, parsed: ParsedVariant) -> Variant {
        let variant_id = variant_id(
            &parsed.simple_id,
            &self.case.case_id,
            parsed.variant_type,
            parsed.category,
        );
        let document_id = document_id(&variant_id, &self.case.owner);
        let hgnc_ids = self
            .genes
            .overlapping(&parsed.chromosome, parsed.position, parsed.end);

        Variant {
            document_id,
            variant_id,
            display_name: format!("{}_{}", parsed.simple_id, parsed.variant_type.as_str()),
            simple_id: parsed.simple_id,
            case_id: self.case.case_id.clone(),
            institute: self.case.owner.clone(),
            category: parsed.category,
            sub_category: parsed.sub_category,
            variant_type: parsed.variant_type,
            chromosome: parsed.chromosome,
            position: parsed.position,
            end: parsed.end,
            length: parsed.length,
            reference: parsed.reference,
            alternate: parsed.alternate,
            dbsnp_id: parsed.dbsnp_id,
            quality: parsed.quality,
            filters: parsed.filters,
            rank_score: parsed.rank_score,
            genetic_models: parsed.genetic_models,
            compounds: parsed.compounds,
            frequencies: parsed.frequencies,
            clnsig: parsed.clnsig,
            conservation: parsed.conservation,
            samples: parsed.samples,
            hgnc_ids,
        }
    }
}

impl Document for Variant {
    fn collection() -> &'static str {
        VARIANT_COLLECTION
    }

    fn document_id(&self) -> String {
        self.document_id.clone()
    }
}

impl Document for GeneRecord {
    fn collection() -> &'static str {
        GENE_COLLECTION
    }

    fn document_id(&self) -> String {
        format!("hgnc:{}:{}", self.hgnc_id, self.build)
    }
}

impl Document for TranscriptRecord {
    fn collection() -> &'static str {
        TRANSCRIPT_COLLECTION
    }

    fn document_id(&self) -> String {
        format!("{}:{}", self.ensembl_transcript_id, self.build)
    }
}

impl Document for Case {
    fn collection() -> &'static str {
        CASE_COLLECTION
    }

    fn document_id(&self) -> String {
        self.case_id.clone()
    }
}

impl Document for HpoTermRecord {
    fn collection() -> &'static str {
        HPO_TERM_COLLECTION
    }

    fn document_id(&self) -> String {
        self.hpo_id.clone()
    }
}

impl Document for DiseaseTermRecord {
    fn collection() -> &'static str {
        DISEASE_TERM_COLLECTION
    }

    fn document_id(&self) -> String {
        self.disease_id.clone()
    }
}

/// Resolve HPO term gene symbols to hgnc_ids; unknown symbols are dropped
pub fn build_hpo_terms(terms: SourceTable<String, HpoTerm>, genes: &LinkedGenes) -> Vec<HpoTermRecord> {
    terms
        .into_values()
        .map(|term| HpoTermRecord {
            hgnc_ids: term
                .genes
                .iter()
                .filter_map(|symbol| genes.hgnc_id_for_symbol(symbol))
                .collect(),
            hpo_id: term.hpo_id,
            description: term.description,
        })
        .collect()
}

/// Attach genes to diseases through the OMIM phenotypes of linked genes
pub fn build_disease_terms(
    diseases: SourceTable<String, HpoDisease>,
    genes: &LinkedGenes,
) -> Vec<DiseaseTermRecord> {
    let mut by_mim: HashMap<u32, BTreeSet<u32>> = HashMap::new();
    for gene in genes.iter() {
        for mim_number in gene.phenotypes.iter().filter_map(|p| p.mim_number) {
            by_mim.entry(mim_number).or_default().insert(gene.hgnc_id);
        }
    }

    diseases
        .into_values()
        .map(|disease| {
            let hgnc_ids = match disease.source.as_str() {
                "OMIM" => by_mim.get(&disease.disease_nr).cloned().unwrap_or_default(),
                _ => BTreeSet::new(),
            };
            DiseaseTermRecord {
                disease_id: disease.disease_id,
                source: disease.source,
                disease_nr: disease.disease_nr,
                description: disease.description,
                hpo_terms: disease.hpo_terms,
                hgnc_ids,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Build, Frequencies, OmimPhenotype, VcfFiles};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn test_case() -> Case {
        Case {
            case_id: "cust000-643594".to_string(),
            display_name: "643594".to_string(),
            owner: "cust000".to_string(),
            collaborators: vec!["cust000".to_string()],
            individuals: Vec::new(),
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

    fn parsed(simple_id: &str, position: u64) -> ParsedVariant {
        ParsedVariant {
            simple_id: simple_id.to_string(),
            chromosome: "1".to_string(),
            position,
            end: position,
            length: 0,
            reference: "T".to_string(),
            alternate: "C".to_string(),
            dbsnp_id: None,
            quality: None,
            filters: BTreeSet::from(["PASS".to_string()]),
            category: Category::Snv,
            sub_category: "snv".to_string(),
            variant_type: VariantType::Clinical,
            rank_score: 0.0,
            genetic_models: BTreeSet::new(),
            compounds: Vec::new(),
            frequencies: Frequencies::from_values(BTreeMap::new()),
            clnsig: Vec::new(),
            conservation: BTreeMap::new(),
            samples: Vec::new(),
        }
    }

    fn gene_index() -> GeneIndex {
        let mut gene = GeneRecord::new(17978, "B3GALT6", Build::Grch37);
        gene.chromosome = Some("1".to_string());
        gene.start = Some(1167629);
        gene.end = Some(1170421);
        GeneIndex::new(&LinkedGenes::new(Build::Grch37, vec![gene]).unwrap())
    }

    #[test]
    fn test_variant_ids_are_deterministic() {
        let a = variant_id("1_880086_T_C", "cust000-643594", VariantType::Clinical, Category::Snv);
        let b = variant_id("1_880086_T_C", "cust000-643594", VariantType::Clinical, Category::Snv);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        assert_ne!(a, variant_id("1_880086_T_C", "cust000-643594", VariantType::Research, Category::Snv));
        assert_ne!(a, variant_id("1_880086_T_C", "cust000-643594", VariantType::Clinical, Category::Sv));
        assert_ne!(document_id(&a, "cust000"), document_id(&a, "cust001"));
    }

    #[test]
    fn test_component_boundaries_matter() {
        assert_ne!(document_id("ab", "c"), document_id("a", "bc"));
    }

    #[test]
    fn test_build_variant_annotates_genes() {
        let case = test_case();
        let index = gene_index();
        let builder = VariantBuilder::new(&case, &index);

        let inside = builder.build(parsed("1_1168000_T_C", 1168000));
        assert_eq!(inside.hgnc_ids, BTreeSet::from([17978]));
        assert_eq!(inside.display_name, "1_1168000_T_C_clinical");
        assert_eq!(inside.institute, "cust000");
        assert_eq!(inside.document_id, document_id(&inside.variant_id, "cust000"));

        let outside = builder.build(parsed("1_880086_T_C", 880086));
        assert!(outside.hgnc_ids.is_empty());

        let again = builder.build(parsed("1_880086_T_C", 880086));
        assert_eq!(outside.variant_id, again.variant_id);
        assert_eq!(outside.document_id, again.document_id);
    }

    #[test]
    fn test_document_ids() {
        let gene = GeneRecord::new(5, "A1BG", Build::Grch38);
        assert_eq!(gene.document_id(), "hgnc:5:38");
        assert_eq!(GeneRecord::collection(), GENE_COLLECTION);
        assert_eq!(test_case().document_id(), "cust000-643594");
    }

    #[test]
    fn test_build_terms() {
        let mut gene = GeneRecord::new(17978, "B3GALT6", Build::Grch37);
        gene.phenotypes.push(OmimPhenotype {
            mim_number: Some(615349),
            description: "Ehlers-Danlos syndrome".to_string(),
            inheritance_models: BTreeSet::new(),
        });
        let genes = LinkedGenes::new(Build::Grch37, vec![gene]).unwrap();

        let mut terms = SourceTable::new();
        terms.insert(
            "HP:0000001".to_string(),
            HpoTerm {
                hpo_id: "HP:0000001".to_string(),
                description: "All".to_string(),
                genes: BTreeSet::from(["B3GALT6".to_string(), "UNKNOWN".to_string()]),
            },
        );
        let terms = build_hpo_terms(terms, &genes);
        assert_eq!(terms[0].hgnc_ids, BTreeSet::from([17978]));

        let mut diseases = SourceTable::new();
        for (id, source, nr) in [("OMIM:615349", "OMIM", 615349), ("ORPHA:1", "ORPHA", 1)] {
            diseases.insert(
                id.to_string(),
                HpoDisease {
                    disease_id: id.to_string(),
                    source: source.to_string(),
                    disease_nr: nr,
                    description: None,
                    hpo_terms: BTreeSet::new(),
                },
            );
        }
        let diseases = build_disease_terms(diseases, &genes);
        assert_eq!(diseases[0].hgnc_ids, BTreeSet::from([17978]));
        assert!(diseases[1].hgnc_ids.is_empty());
    }
}
