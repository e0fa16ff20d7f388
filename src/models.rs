// ==============================================================================
// models.rs - Canonical Data Model
// ==============================================================================
// Description: Genes, transcripts, cases and variants as stored documents
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2025-11-21
// Version: 3.0.0
// ==============================================================================
// Ownership:
//   Genes/transcripts belong to the build-scoped catalog that produced them.
//   Variants refer to genes (hgnc_ids) and other variants (compounds) by id.
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::LoadError;

/// Genome assembly version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Build {
    #[serde(rename = "37")]
    Grch37,
    #[serde(rename = "38")]
    Grch38,
}

impl Build {
    pub fn as_str(&self) -> &'static str {
        match self {
            Build::Grch37 => "37",
            Build::Grch38 => "38",
        }
    }
}

impl FromStr for Build {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "37" | "grch37" | "hg19" | "b37" => Ok(Build::Grch37),
            "38" | "grch38" | "hg38" => Ok(Build::Grch38),
            _ => Err(LoadError::UnknownBuild(s.to_string())),
        }
    }
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chromosome name as stored on genes, transcripts and variants
/// ("chr1" -> "1", "chrM" / "M" -> "MT")
pub fn normalize_chromosome(chromosome: &str) -> String {
    let trimmed = chromosome
        .strip_prefix("chr")
        .or_else(|| chromosome.strip_prefix("CHR"))
        .unwrap_or(chromosome);
    match trimmed {
        "M" => "MT".to_string(),
        other => other.to_string(),
    }
}

/// Variant class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Snv,
    Sv,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Snv => "snv",
            Category::Sv => "sv",
        }
    }
}

/// Load track for the same case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantType {
    Clinical,
    Research,
}

impl VariantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantType::Clinical => "clinical",
            VariantType::Research => "research",
        }
    }
}

/// Sex as recorded in PED files (1 = male, 2 = female, other = unknown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl Sex {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "1" => Sex::Male,
            "2" => Sex::Female,
            _ => Sex::Unknown,
        }
    }

    /// Accepts PED codes as well as the words used in load configs
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "1" | "male" => Some(Sex::Male),
            "2" | "female" => Some(Sex::Female),
            "0" | "other" | "unknown" => Some(Sex::Unknown),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Sex::Male => 1,
            Sex::Female => 2,
            Sex::Unknown => 0,
        }
    }
}

/// Affection status (1 = unaffected, 2 = affected, other = unknown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phenotype {
    Unaffected,
    Affected,
    Unknown,
}

impl Phenotype {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "1" => Phenotype::Unaffected,
            "2" => Phenotype::Affected,
            _ => Phenotype::Unknown,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "1" | "unaffected" => Some(Phenotype::Unaffected),
            "2" | "affected" => Some(Phenotype::Affected),
            "0" | "-9" | "unknown" => Some(Phenotype::Unknown),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Phenotype::Unaffected => 1,
            Phenotype::Affected => 2,
            Phenotype::Unknown => 0,
        }
    }
}

/// OMIM phenotype attached to a gene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmimPhenotype {
    pub mim_number: Option<u32>,
    pub description: String,
    /// Inheritance model tags (AD, AR, XD, XR, X, Y, MT)
    pub inheritance_models: BTreeSet<String>,
}

/// One gene per distinct hgnc_id and build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneRecord {
    /// Canonical join key, unique per build
    pub hgnc_id: u32,
    pub symbol: String,
    pub ensembl_id: Option<String>,
    pub build: Build,
    /// Always contains `symbol`
    pub aliases: BTreeSet<String>,

    // Build-specific coordinates (Ensembl)
    pub chromosome: Option<String>,
    pub start: Option<u64>,
    pub end: Option<u64>,

    pub description: Option<String>,
    /// Cytoband
    pub location: Option<String>,
    pub entrez_id: Option<u32>,
    pub omim_id: Option<u32>,
    pub ucsc_id: Option<String>,
    pub vega_id: Option<String>,
    pub uniprot_ids: BTreeSet<String>,

    /// RefSeq ids of the primary transcripts (HGNC)
    pub primary_transcripts: BTreeSet<String>,

    // ExAC constraint
    pub pli_score: Option<f64>,
    pub mis_z: Option<f64>,
    pub syn_z: Option<f64>,

    // OMIM
    pub inheritance_models: BTreeSet<String>,
    pub phenotypes: Vec<OmimPhenotype>,

    // HPO
    pub hpo_terms: BTreeSet<String>,
    pub incomplete_penetrance: bool,
}

impl GeneRecord {
    /// Start a record from the identity fields only
    pub fn new(hgnc_id: u32, symbol: impl Into<String>, build: Build) -> Self {
        let symbol = symbol.into();
        let mut aliases = BTreeSet::new();
        aliases.insert(symbol.clone());

        Self {
            hgnc_id,
            symbol,
            ensembl_id: None,
            build,
            aliases,
            chromosome: None,
            start: None,
            end: None,
            description: None,
            location: None,
            entrez_id: None,
            omim_id: None,
            ucsc_id: None,
            vega_id: None,
            uniprot_ids: BTreeSet::new(),
            primary_transcripts: BTreeSet::new(),
            pli_score: None,
            mis_z: None,
            syn_z: None,
            inheritance_models: BTreeSet::new(),
            phenotypes: Vec::new(),
            hpo_terms: BTreeSet::new(),
            incomplete_penetrance: false,
        }
    }
}

/// Ensembl transcript linked to its gene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub ensembl_gene_id: String,
    pub ensembl_transcript_id: String,
    pub build: Build,
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub refseq_mrna: Option<String>,
    pub refseq_mrna_predicted: Option<String>,
    pub refseq_ncrna: Option<String>,
    /// Every RefSeq id seen for this transcript across biomart rows
    pub refseq_identifiers: BTreeSet<String>,
    /// None when the owning gene is not in the linked catalog
    pub hgnc_id: Option<u32>,
    pub is_primary: bool,
}

impl TranscriptRecord {
    /// Non-empty RefSeq ids of this transcript
    pub fn refseq_ids(&self) -> impl Iterator<Item = &str> {
        self.refseq_mrna
            .iter()
            .chain(self.refseq_mrna_predicted.iter())
            .chain(self.refseq_ncrna.iter())
            .chain(self.refseq_identifiers.iter())
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// HPO term with the genes annotated to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpoTermRecord {
    pub hpo_id: String,
    pub description: String,
    pub hgnc_ids: BTreeSet<u32>,
}

/// Disease (OMIM, ORPHA, ...) with phenotypes and associated genes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseTermRecord {
    pub disease_id: String,
    pub source: String,
    pub disease_nr: u32,
    pub description: Option<String>,
    pub hpo_terms: BTreeSet<String>,
    pub hgnc_ids: BTreeSet<u32>,
}

/// Pedigree member of a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub individual_id: String,
    pub display_name: String,
    pub sex: Sex,
    pub phenotype: Phenotype,
    /// "0" for founders
    pub paternal_id: String,
    /// "0" for founders
    pub maternal_id: String,
    pub capture_kits: Vec<String>,
}

/// Reference to a gene panel used for a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRef {
    pub panel_name: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VcfFiles {
    pub vcf_snv: Option<String>,
    pub vcf_sv: Option<String>,
    pub vcf_snv_research: Option<String>,
    pub vcf_sv_research: Option<String>,
    pub vcf_cancer: Option<String>,
}

impl VcfFiles {
    /// File configured for a load track and category
    pub fn get(&self, variant_type: VariantType, category: Category) -> Option<&str> {
        let file = match (variant_type, category) {
            (VariantType::Clinical, Category::Snv) => &self.vcf_snv,
            (VariantType::Clinical, Category::Sv) => &self.vcf_sv,
            (VariantType::Research, Category::Snv) => &self.vcf_snv_research,
            (VariantType::Research, Category::Sv) => &self.vcf_sv_research,
        };
        file.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// `{owner}-{family id}`
    pub case_id: String,
    pub display_name: String,
    /// Institute id
    pub owner: String,
    pub collaborators: Vec<String>,
    pub individuals: Vec<Individual>,
    pub analysis_date: DateTime<Utc>,
    pub gene_panels: Vec<PanelRef>,
    pub is_research: bool,
    pub genome_build: Build,
    pub rank_score_threshold: f64,
    pub rank_model_version: Option<String>,
    pub vcf_files: VcfFiles,
    pub track: String,
}

impl Case {
    pub fn family_id(&self) -> &str {
        self.case_id
            .strip_prefix(&format!("{}-", self.owner))
            .unwrap_or(&self.case_id)
    }

    pub fn individual(&self, individual_id: &str) -> Option<&Individual> {
        self.individuals
            .iter()
            .find(|ind| ind.individual_id == individual_id)
    }
}

/// Cross-reference to another variant of the same case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    pub variant_id: String,
    pub simple_id: String,
    pub combined_score: f64,
}

/// Population frequencies; each source is independently nullable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frequencies {
    pub values: BTreeMap<String, Option<f64>>,
    /// Maximum over the non-null values, None when all are null
    pub max: Option<f64>,
}

impl Frequencies {
    pub fn from_values(values: BTreeMap<String, Option<f64>>) -> Self {
        let max = values
            .values()
            .flatten()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));

        Self { values, max }
    }

    pub fn get(&self, source: &str) -> Option<f64> {
        self.values.get(source).copied().flatten()
    }
}

/// Clinical significance annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clnsig {
    pub value: String,
    pub accession: Option<String>,
    pub revstat: Option<String>,
}

/// Genotype of one case individual at a variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleGenotype {
    pub individual_id: String,
    pub display_name: String,
    pub genotype_call: Option<String>,
    pub genotype_quality: Option<u32>,
    pub ref_depth: Option<u32>,
    pub alt_depth: Option<u32>,
    pub read_depth: Option<u32>,
}

/// Canonical, immutable variant document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Hash over (variant_id, institute)
    pub document_id: String,
    /// Hash over (simple_id, case_id, variant_type, category); reload key
    pub variant_id: String,
    pub simple_id: String,
    pub display_name: String,
    pub case_id: String,
    pub institute: String,
    pub category: Category,
    pub sub_category: String,
    pub variant_type: VariantType,
    pub chromosome: String,
    pub position: u64,
    pub end: u64,
    pub length: u64,
    pub reference: String,
    pub alternate: String,
    pub dbsnp_id: Option<String>,
    pub quality: Option<f64>,
    pub filters: BTreeSet<String>,
    pub rank_score: f64,
    pub genetic_models: BTreeSet<String>,
    pub compounds: Vec<Compound>,
    pub frequencies: Frequencies,
    pub clnsig: Vec<Clnsig>,
    pub conservation: BTreeMap<String, Vec<f64>>,
    /// Aligned to `Case.individuals`
    pub samples: Vec<SampleGenotype>,
    pub hgnc_ids: BTreeSet<u32>,
}

/// Load-time variant filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantFilter {
    pub category: Category,
    /// Variants strictly below are dropped
    pub rank_threshold: f64,
}

impl VariantFilter {
    pub fn new(category: Category, rank_threshold: f64) -> Self {
        Self {
            category,
            rank_threshold,
        }
    }

    pub fn passes_category(&self, category: Category) -> bool {
        self.category == category
    }

    pub fn passes_rank(&self, rank_score: f64) -> bool {
        rank_score >= self.rank_threshold
    }
}
