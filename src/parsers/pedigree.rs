// ==============================================================================
// parsers/pedigree.rs - PED File Parser
// ==============================================================================
// Description: Parser for single-family pedigree (PED) files
// Author: Matt Barham
// Created: 2025-11-16
// Modified: 2025-11-19
// Version: 1.0.0
// ==============================================================================
// Format: 6 whitespace separated columns, '#' lines are comments
//   family_id  individual_id  paternal_id  maternal_id  sex  phenotype
//   643594     ADM1059A2      ADM1059A1    ADM1059A3    1    2
// Sex: 1 = male, 2 = female, other = unknown
// Phenotype: 1 = unaffected, 2 = affected, other = unknown
// Parent ids are "0" for founders
// ==============================================================================

use std::io::BufRead;
use tracing::debug;

use crate::error::LoadError;
use crate::models::{Individual, Phenotype, Sex};

const PED_COLUMNS: usize = 6;

/// One family as read from a PED file
#[derive(Debug, Clone, PartialEq)]
pub struct Pedigree {
    pub family_id: String,
    /// In file order
    pub individuals: Vec<Individual>,
}

pub struct PedigreeParser;

impl PedigreeParser {
    /// Parse a PED file describing exactly one family
    ///
    /// Unlike catalog files a bad line is fatal: a case cannot be built from
    /// a partial pedigree.
    pub fn parse(reader: impl BufRead) -> Result<Pedigree, LoadError> {
        let mut family_id: Option<String> = None;
        let mut individuals: Vec<Individual> = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_num = idx + 1;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != PED_COLUMNS {
                return Err(LoadError::InvalidPedigree(format!(
                    "line {}: expected {} columns, found {}",
                    line_num,
                    PED_COLUMNS,
                    fields.len()
                )));
            }

            let family = family_id.get_or_insert_with(|| fields[0].to_string());
            if *family != fields[0] {
                return Err(LoadError::InvalidPedigree(format!(
                    "line {}: only one family per file is supported (found {} and {})",
                    line_num, family, fields[0]
                )));
            }

            if individuals.iter().any(|ind| ind.individual_id == fields[1]) {
                return Err(LoadError::InvalidPedigree(format!(
                    "line {}: individual {} listed twice",
                    line_num, fields[1]
                )));
            }

            individuals.push(Individual {
                individual_id: fields[1].to_string(),
                display_name: fields[1].to_string(),
                paternal_id: fields[2].to_string(),
                maternal_id: fields[3].to_string(),
                sex: Sex::from_code(fields[4]),
                phenotype: Phenotype::from_code(fields[5]),
                capture_kits: Vec::new(),
            });
        }

        let family_id = family_id
            .ok_or_else(|| LoadError::InvalidPedigree("no individuals found".to_string()))?;

        debug!("Parsed pedigree {} with {} individuals", family_id, individuals.len());

        Ok(Pedigree {
            family_id,
            individuals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIO: &str = "#family_id\tindividual_id\tpaternal_id\tmaternal_id\tsex\tphenotype\n\
                        643594\tADM1059A1\t0\t0\t1\t1\n\
                        643594\tADM1059A2\tADM1059A1\tADM1059A3\t1\t2\n\
                        643594\tADM1059A3\t0\t0\t2\t1\n";

    #[test]
    fn test_parse_trio() {
        let pedigree = PedigreeParser::parse(TRIO.as_bytes()).unwrap();
        assert_eq!(pedigree.family_id, "643594");
        assert_eq!(pedigree.individuals.len(), 3);

        let sexes: Vec<u8> = pedigree.individuals.iter().map(|ind| ind.sex.code()).collect();
        assert_eq!(sexes, vec![1, 1, 2]);

        let proband = &pedigree.individuals[1];
        assert_eq!(proband.paternal_id, "ADM1059A1");
        assert_eq!(proband.maternal_id, "ADM1059A3");
        assert_eq!(proband.phenotype, Phenotype::Affected);
    }

    #[test]
    fn test_wrong_column_count_is_fatal() {
        let data = "643594\tADM1059A1\t0\t0\t1\n";
        assert!(matches!(
            PedigreeParser::parse(data.as_bytes()),
            Err(LoadError::InvalidPedigree(_))
        ));
    }

    #[test]
    fn test_multiple_families_rejected() {
        let data = "1\tA\t0\t0\t1\t1\n2\tB\t0\t0\t2\t1\n";
        assert!(matches!(
            PedigreeParser::parse(data.as_bytes()),
            Err(LoadError::InvalidPedigree(_))
        ));
    }

    #[test]
    fn test_empty_pedigree_rejected() {
        assert!(PedigreeParser::parse("# only a comment\n".as_bytes()).is_err());
    }
}
