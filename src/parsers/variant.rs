// ==============================================================================
// parsers/variant.rs - Variant Record Decoder
// ==============================================================================
// Description: Decodes one raw VCF record into a case-aware parsed variant
// Author: Matt Barham
// Created: 2025-11-17
// Modified: 2025-11-22
// Version: 1.3.0
// ==============================================================================
// INFO fields:
//   RankScore      643594:7.5            one "key:score" per family / load track
//   GeneticModels  643594:AD|AD_dn       '|' separated inheritance tags
//   Compounds      643594:1_880086_T_C>24|1_880200_A_G>15   or   id|score|id|score
//   1000GAF, EXACAF, GNOMADAF, ...       population frequencies (nullable)
//   CLNSIG/CLNACC or CLNSIG/CLNVID/CLNREVSTAT  clinical significance
//   dbNSFP_*       conservation scores
// FORMAT fields: GT, GQ, AD, DP
// ==============================================================================

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

use crate::builder::variant_id;
use crate::error::LoadError;
use crate::models::{
    normalize_chromosome, Case, Category, Clnsig, Compound, Frequencies, SampleGenotype,
    VariantType,
};
use crate::parsers::vcf::RawRecord;

/// Population sources and the INFO keys that carry them
const FREQUENCY_FIELDS: &[(&str, &[&str])] = &[
    ("thousand_g", &["1000GAF"]),
    ("thousand_g_max", &["1000G_MAX_AF"]),
    ("exac", &["EXACAF"]),
    ("exac_max", &["ExAC_MAX_AF"]),
    ("gnomad", &["GNOMADAF", "gnomAD_AF"]),
    ("gnomad_max", &["GNOMADAF_popmax", "GNOMADAF_POPMAX"]),
    ("swegen", &["SWEGENAF"]),
];

const CONSERVATION_FIELDS: &[(&str, &str)] = &[
    ("gerp", "dbNSFP_GERP___RS"),
    ("phast", "dbNSFP_phastCons100way_vertebrate"),
    ("phylop", "dbNSFP_phyloP100way_vertebrate"),
];

/// A decoded record, before identifiers and gene annotation are attached
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVariant {
    pub simple_id: String,
    pub chromosome: String,
    pub position: u64,
    pub end: u64,
    pub length: u64,
    pub reference: String,
    pub alternate: String,
    pub dbsnp_id: Option<String>,
    pub quality: Option<f64>,
    pub filters: BTreeSet<String>,
    pub category: Category,
    pub sub_category: String,
    pub variant_type: VariantType,
    pub rank_score: f64,
    pub genetic_models: BTreeSet<String>,
    pub compounds: Vec<Compound>,
    pub frequencies: Frequencies,
    pub clnsig: Vec<Clnsig>,
    pub conservation: BTreeMap<String, Vec<f64>>,
    /// Aligned to `Case.individuals`
    pub samples: Vec<SampleGenotype>,
}

/// Decodes the records of one file for one case and load track
pub struct VariantParser<'a> {
    case: &'a Case,
    variant_type: VariantType,
    category: Category,
    /// Genotype column for each of `case.individuals`, in case order
    columns: Vec<usize>,
    /// Accepted "key:" prefixes of per-family INFO fields
    keys: [&'a str; 2],
}

impl<'a> VariantParser<'a> {
    /// Bind a case to the sample order of a file
    ///
    /// Fails with `MissingIndividual` when a case individual has no
    /// genotype column; checked once per file.
    pub fn new(
        case: &'a Case,
        individual_positions: &HashMap<String, usize>,
        variant_type: VariantType,
        category: Category,
    ) -> Result<Self, LoadError> {
        let columns = case
            .individuals
            .iter()
            .map(|ind| {
                individual_positions
                    .get(&ind.individual_id)
                    .copied()
                    .ok_or_else(|| LoadError::MissingIndividual {
                        case_id: case.case_id.clone(),
                        individual_id: ind.individual_id.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            case,
            variant_type,
            category,
            columns,
            keys: [variant_type.as_str(), case.family_id()],
        })
    }

    pub fn parse(&self, record: &RawRecord) -> ParsedVariant {
        let chromosome = normalize_chromosome(&record.chromosome);
        let simple_id = format!(
            "{}_{}_{}_{}",
            chromosome, record.position, record.reference, record.alternate
        );

        let (end, length, sub_category) = self.coordinates(record);

        let filters = match record.filter.as_deref() {
            None | Some("PASS") => BTreeSet::from(["PASS".to_string()]),
            Some(filter) => filter.split(';').map(str::to_string).collect(),
        };

        ParsedVariant {
            chromosome,
            position: record.position,
            end,
            length,
            reference: record.reference.clone(),
            alternate: record.alternate.clone(),
            dbsnp_id: record.id.clone(),
            quality: record.quality,
            filters,
            category: self.category,
            sub_category,
            variant_type: self.variant_type,
            rank_score: self.rank_score(record),
            genetic_models: self.genetic_models(record),
            compounds: self.compounds(record),
            frequencies: parse_frequencies(record),
            clnsig: parse_clnsig(record),
            conservation: parse_conservation(record),
            samples: self.samples(record),
            simple_id,
        }
    }

    /// (end, length, sub_category)
    fn coordinates(&self, record: &RawRecord) -> (u64, u64, String) {
        let ref_len = record.reference.len() as u64;
        let alt_len = record.alternate.len() as u64;
        let end = record
            .info("END")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_else(|| record.position + ref_len.saturating_sub(1));

        match self.category {
            Category::Sv => {
                let length = record
                    .info("SVLEN")
                    .and_then(|v| v.split(',').next()?.parse::<i64>().ok())
                    .map(|len| len.unsigned_abs())
                    .unwrap_or_else(|| end.saturating_sub(record.position));
                let sub_category = record
                    .info("SVTYPE")
                    .map(str::to_ascii_lowercase)
                    .unwrap_or_else(|| "sv".to_string());
                (end, length, sub_category)
            }
            Category::Snv => {
                let sub_category = if ref_len == 1 && alt_len == 1 {
                    "snv"
                } else if ref_len == alt_len {
                    "mnp"
                } else {
                    "indel"
                };
                (end, ref_len.abs_diff(alt_len), sub_category.to_string())
            }
        }
    }

    /// Bodies of "key:value" entries whose key is the family or load track
    ///
    /// Entries without a key apply to every case.
    fn matching_entries<'s, 'r: 's>(&'s self, value: &'r str) -> impl Iterator<Item = &'r str> + 's {
        value.split(',').filter_map(move |entry| match entry.split_once(':') {
            Some((key, body)) if self.keys.iter().any(|k| *k == key.trim()) => Some(body),
            Some(_) => None,
            None => Some(entry),
        })
    }

    fn rank_score(&self, record: &RawRecord) -> f64 {
        let Some(value) = record.info("RankScore") else {
            return 0.0;
        };

        match self.matching_entries(value).next() {
            Some(score) => score.trim().parse::<f64>().unwrap_or_else(|_| {
                warn!("record {}: non-numeric rank score '{}', using 0", record.line, score);
                0.0
            }),
            None => 0.0,
        }
    }

    fn genetic_models(&self, record: &RawRecord) -> BTreeSet<String> {
        record
            .info("GeneticModels")
            .map(|value| {
                self.matching_entries(value)
                    .flat_map(|body| body.split('|'))
                    .map(str::trim)
                    .filter(|model| !model.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn compounds(&self, record: &RawRecord) -> Vec<Compound> {
        let Some(value) = record.info("Compounds") else {
            return Vec::new();
        };

        let mut compounds = Vec::new();
        for body in self.matching_entries(value) {
            for (simple_id, score) in split_compound_entry(body) {
                match score.trim().parse::<f64>() {
                    Ok(combined_score) => {
                        let simple_id = normalize_simple_id(simple_id);
                        compounds.push(Compound {
                            variant_id: variant_id(
                                &simple_id,
                                &self.case.case_id,
                                self.variant_type,
                                self.category,
                            ),
                            simple_id,
                            combined_score,
                        })
                    }
                    Err(_) => warn!(
                        "record {}: compound {} has non-numeric score '{}', skipped",
                        record.line, simple_id, score
                    ),
                }
            }
        }
        compounds
    }

    fn samples(&self, record: &RawRecord) -> Vec<SampleGenotype> {
        self.case
            .individuals
            .iter()
            .zip(&self.columns)
            .map(|(ind, &col)| {
                let number = |key: &str| record.sample_field(col, key).and_then(parse_count);
                let depths: Vec<Option<u32>> = record
                    .sample_field(col, "AD")
                    .map(|ad| ad.split(',').map(parse_count).collect())
                    .unwrap_or_default();

                let ref_depth = depths.first().copied().flatten();
                let alt_depth = depths.get(1).copied().flatten();
                let read_depth = number("DP").or_else(|| match (ref_depth, alt_depth) {
                    (Some(r), Some(a)) => Some(r + a),
                    _ => None,
                });

                SampleGenotype {
                    individual_id: ind.individual_id.clone(),
                    display_name: ind.display_name.clone(),
                    genotype_call: record.sample_field(col, "GT").map(str::to_string),
                    genotype_quality: number("GQ"),
                    ref_depth,
                    alt_depth,
                    read_depth,
                }
            })
            .collect()
    }
}

/// Give a compound's simple_id the chromosome naming of variant simple_ids
/// ("chr1_200_C_T" -> "1_200_C_T")
fn normalize_simple_id(simple_id: &str) -> String {
    match simple_id.trim().split_once('_') {
        Some((chromosome, rest)) => format!("{}_{}", normalize_chromosome(chromosome), rest),
        None => simple_id.trim().to_string(),
    }
}

/// (simple_id, score) pairs of one compound entry body
///
/// Accepts "id>score|id>score" and repeated "id|score|id|score".
fn split_compound_entry(body: &str) -> Vec<(&str, &str)> {
    let parts: Vec<&str> = body.split('|').filter(|p| !p.is_empty()).collect();

    let is_score = |part: &str| !part.contains('>') && part.trim().parse::<f64>().is_ok();
    if !parts.is_empty() && parts.len() % 2 == 0 && parts.chunks(2).all(|pair| is_score(pair[1])) {
        return parts.chunks(2).map(|pair| (pair[0], pair[1])).collect();
    }

    // SV ids end in '>' ("<DEL>"), so the score follows the last one
    parts
        .iter()
        .map(|part| part.rsplit_once('>').unwrap_or((*part, "")))
        .collect()
}

fn parse_count(value: &str) -> Option<u32> {
    let value = value.trim();
    value
        .parse::<u32>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v.round() as u32))
}

fn parse_frequencies(record: &RawRecord) -> Frequencies {
    let values = FREQUENCY_FIELDS
        .iter()
        .map(|(name, keys)| {
            let value = keys
                .iter()
                .find_map(|key| record.info(key))
                .and_then(|raw| raw.split(',').find_map(|v| v.trim().parse::<f64>().ok()));
            (name.to_string(), value)
        })
        .collect();

    Frequencies::from_values(values)
}

fn parse_clnsig(record: &RawRecord) -> Vec<Clnsig> {
    let Some(significance) = record.info("CLNSIG") else {
        return Vec::new();
    };

    // Numeric format: CLNSIG=5|2 zipped with CLNACC=RCV000001|RCV000002
    if let Some(accessions) = record.info("CLNACC") {
        let accessions: Vec<&str> = accessions.split(['|', ',']).collect();
        return significance
            .split(['|', ','])
            .enumerate()
            .filter(|(_, value)| !value.is_empty())
            .map(|(idx, value)| Clnsig {
                value: value.to_string(),
                accession: accessions.get(idx).map(|acc| acc.to_string()),
                revstat: None,
            })
            .collect();
    }

    // Textual format: CLNSIG=Pathogenic/Likely_pathogenic, CLNVID, CLNREVSTAT
    let accession = record.info("CLNVID").map(str::to_string);
    let revstat = record.info("CLNREVSTAT").map(|raw| {
        raw.split(',')
            .map(|part| part.trim_start_matches('_'))
            .collect::<Vec<_>>()
            .join(",")
    });

    significance
        .split(['/', ','])
        .map(|value| value.trim_start_matches('_'))
        .filter(|value| !value.is_empty())
        .map(|value| Clnsig {
            value: value.to_string(),
            accession: accession.clone(),
            revstat: revstat.clone(),
        })
        .collect()
}

fn parse_conservation(record: &RawRecord) -> BTreeMap<String, Vec<f64>> {
    CONSERVATION_FIELDS
        .iter()
        .filter_map(|(name, key)| {
            let scores: Vec<f64> = record
                .info(key)?
                .split(',')
                .filter_map(|v| v.trim().parse().ok())
                .collect();
            (!scores.is_empty()).then(|| (name.to_string(), scores))
        })
        .collect()
}
