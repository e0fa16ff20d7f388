// ==============================================================================
// case.rs - Case Load Config and Case Builder
// ==============================================================================
// Description: Assembles a Case from a YAML load config and optional PED file
// Author: Matt Barham
// Created: 2025-11-18
// Modified: 2025-11-21
// Version: 1.1.0
// ==============================================================================
// Config (YAML):
//   owner: cust000
//   family: '643594'
//   human_genome_build: '37'
//   samples:
//     - sample_id: ADM1059A2
//       sex: male
//       phenotype: affected
//       father: ADM1059A1
//       mother: ADM1059A3
//   vcf_snv: path/to/snv.vcf.gz
// A PED file replaces family/samples; --owner fills in a missing owner.
// ==============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

use crate::error::LoadError;
use crate::models::{Build, Case, Individual, PanelRef, Phenotype, Sex, VcfFiles};
use crate::parsers::pedigree::Pedigree;

/// Parent id of founders
pub const FOUNDER: &str = "0";

const DEFAULT_TRACK: &str = "rare";
const CANCER_TRACK: &str = "cancer";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SampleConfig {
    pub sample_id: String,
    pub sample_name: Option<String>,
    pub sex: String,
    pub phenotype: String,
    pub father: Option<String>,
    pub mother: Option<String>,
    pub capture_kit: Option<String>,
}

/// Case load config as written by the analysis pipeline
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CaseConfig {
    pub owner: Option<String>,
    pub family: Option<String>,
    pub family_name: Option<String>,
    #[serde(default)]
    pub samples: Vec<SampleConfig>,

    pub vcf_snv: Option<String>,
    pub vcf_sv: Option<String>,
    pub vcf_snv_research: Option<String>,
    pub vcf_sv_research: Option<String>,
    pub vcf_cancer: Option<String>,

    #[serde(default)]
    pub gene_panels: Vec<String>,
    #[serde(default)]
    pub default_gene_panels: Vec<String>,

    #[serde(default)]
    pub rank_score_threshold: f64,
    pub rank_model_version: Option<String>,
    pub human_genome_build: Option<String>,
    pub analysis_date: Option<String>,
    #[serde(default)]
    pub is_research: bool,
    pub track: Option<String>,
}

impl CaseConfig {
    pub fn from_reader(reader: impl Read) -> Result<Self, LoadError> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let file = File::open(path.as_ref())?;
        debug!("Reading case config {:?}", path.as_ref());
        Self::from_reader(BufReader::new(file))
    }
}

pub struct CaseBuilder;

impl CaseBuilder {
    /// Build and validate a case
    ///
    /// Every parent reference must be "0" or another individual of the case,
    /// otherwise the case is rejected with `InvalidPedigree`.
    pub fn build(
        config: CaseConfig,
        pedigree: Option<Pedigree>,
        owner: Option<&str>,
    ) -> Result<Case, LoadError> {
        let owner = config
            .owner
            .clone()
            .or_else(|| owner.map(str::to_string))
            .ok_or_else(|| LoadError::Config("case has no owner".to_string()))?;

        let (family, individuals) = match pedigree {
            Some(pedigree) => {
                let individuals = pedigree
                    .individuals
                    .into_iter()
                    .map(|ind| with_sample_config(ind, &config.samples))
                    .collect();
                (pedigree.family_id, individuals)
            }
            None => {
                let family = config
                    .family
                    .clone()
                    .ok_or_else(|| LoadError::Config("case has no 'family'".to_string()))?;
                let individuals = config
                    .samples
                    .iter()
                    .map(individual_from_config)
                    .collect::<Result<Vec<_>, _>>()?;
                (family, individuals)
            }
        };

        validate_individuals(&individuals)?;

        let build_value = config
            .human_genome_build
            .as_deref()
            .ok_or_else(|| LoadError::Config("case has no 'human_genome_build'".to_string()))?;
        let genome_build: Build = build_value.parse()?;

        let analysis_date = match config.analysis_date.as_deref() {
            Some(value) => parse_date(value)?,
            None => Utc::now(),
        };

        let vcf_files = VcfFiles {
            vcf_snv: config.vcf_snv,
            vcf_sv: config.vcf_sv,
            vcf_snv_research: config.vcf_snv_research,
            vcf_sv_research: config.vcf_sv_research,
            vcf_cancer: config.vcf_cancer,
        };

        let track = if vcf_files.vcf_cancer.is_some() {
            CANCER_TRACK.to_string()
        } else {
            config.track.unwrap_or_else(|| DEFAULT_TRACK.to_string())
        };

        let case = Case {
            case_id: format!("{}-{}", owner, family),
            display_name: config.family_name.unwrap_or_else(|| family.clone()),
            collaborators: vec![owner.clone()],
            owner,
            individuals,
            analysis_date,
            gene_panels: panel_refs(&config.gene_panels, &config.default_gene_panels),
            is_research: config.is_research,
            genome_build,
            rank_score_threshold: config.rank_score_threshold,
            rank_model_version: config.rank_model_version,
            vcf_files,
            track,
        };

        info!(
            "Built case {} ({} individuals, build {})",
            case.case_id,
            case.individuals.len(),
            case.genome_build
        );
        Ok(case)
    }
}

fn individual_from_config(sample: &SampleConfig) -> Result<Individual, LoadError> {
    let sex = Sex::from_label(&sample.sex).ok_or_else(|| {
        LoadError::InvalidPedigree(format!(
            "individual {} has unknown sex '{}'",
            sample.sample_id, sample.sex
        ))
    })?;
    let phenotype = Phenotype::from_label(&sample.phenotype).ok_or_else(|| {
        LoadError::InvalidPedigree(format!(
            "individual {} has unknown phenotype '{}'",
            sample.sample_id, sample.phenotype
        ))
    })?;

    Ok(Individual {
        individual_id: sample.sample_id.clone(),
        display_name: sample
            .sample_name
            .clone()
            .unwrap_or_else(|| sample.sample_id.clone()),
        sex,
        phenotype,
        paternal_id: parent_or_founder(sample.father.as_deref()),
        maternal_id: parent_or_founder(sample.mother.as_deref()),
        capture_kits: sample.capture_kit.iter().cloned().collect(),
    })
}

/// Config samples only add display names and capture kits to PED individuals
fn with_sample_config(mut individual: Individual, samples: &[SampleConfig]) -> Individual {
    if let Some(sample) = samples
        .iter()
        .find(|s| s.sample_id == individual.individual_id)
    {
        if let Some(name) = &sample.sample_name {
            individual.display_name = name.clone();
        }
        individual.capture_kits = sample.capture_kit.iter().cloned().collect();
    }
    individual
}

fn parent_or_founder(parent: Option<&str>) -> String {
    match parent.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => FOUNDER.to_string(),
    }
}

fn validate_individuals(individuals: &[Individual]) -> Result<(), LoadError> {
    if individuals.is_empty() {
        return Err(LoadError::InvalidPedigree("no samples could be found".to_string()));
    }

    let mut ids: HashSet<&str> = HashSet::new();
    for ind in individuals {
        if !ids.insert(&ind.individual_id) {
            return Err(LoadError::InvalidPedigree(format!(
                "individual {} listed twice",
                ind.individual_id
            )));
        }
    }

    for ind in individuals {
        for (role, parent) in [("father", &ind.paternal_id), ("mother", &ind.maternal_id)] {
            if parent != FOUNDER && !ids.contains(parent.as_str()) {
                return Err(LoadError::InvalidPedigree(format!(
                    "{} {} of {} does not exist in family",
                    role, parent, ind.individual_id
                )));
            }
        }
    }

    Ok(())
}

/// Panel names are trimmed; default panels are always part of the case
fn panel_refs(gene_panels: &[String], default_panels: &[String]) -> Vec<PanelRef> {
    let defaults: HashSet<&str> = default_panels.iter().map(|p| p.trim()).collect();
    let mut panels: Vec<PanelRef> = Vec::new();

    for name in gene_panels.iter().chain(default_panels.iter()) {
        let name = name.trim();
        if name.is_empty() || panels.iter().any(|p| p.panel_name == name) {
            continue;
        }
        panels.push(PanelRef {
            panel_name: name.to_string(),
            is_default: defaults.contains(name),
        });
    }
    panels
}

/// RFC 3339, "YYYY-MM-DD HH:MM:SS" or a bare date
fn parse_date(value: &str) -> Result<DateTime<Utc>, LoadError> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Ok(date.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(date.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| date.and_utc())
        .ok_or_else(|| LoadError::Config(format!("invalid analysis_date '{}'", value)))
}
