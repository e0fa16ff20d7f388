// ==============================================================================
// parsers/exac.rs - ExAC Gene Constraint Parser
// ==============================================================================
// Description: Parser for the ExAC per-gene constraint table (pLI, z-scores)
// Author: Matt Barham
// Created: 2025-11-15
// Modified: 2025-11-15
// Version: 1.0.0
// ==============================================================================
// Format: Tab-delimited with header
//   transcript  gene  chr  n_exons ... syn_z  mis_z  lof_z  pLI  pRec  pNull
// One row per canonical transcript; the gene symbol is the join key
// ==============================================================================

use std::io::BufRead;
use tracing::info;

use crate::error::LoadError;
use crate::parsers::tabular::{Row, SourceTable, TabularReader};

/// Constraint scores for one gene
#[derive(Debug, Clone, PartialEq)]
pub struct ExacGene {
    pub symbol: String,
    pub transcript: Option<String>,
    pub pli_score: Option<f64>,
    pub mis_z: Option<f64>,
    pub syn_z: Option<f64>,
}

pub struct ExacParser;

impl ExacParser {
    /// Parse the constraint table keyed by gene symbol
    pub fn parse(reader: impl BufRead) -> Result<SourceTable<String, ExacGene>, LoadError> {
        let mut reader = TabularReader::open(reader, "exac", &["gene", "pli"])?;

        let gene_col = reader.require(&["gene"])?;
        let pli_col = reader.require(&["pli"])?;
        let transcript_col = reader.column("transcript");
        let mis_col = reader.column("mis_z");
        let syn_col = reader.column("syn_z");

        let mut genes = SourceTable::new();

        while let Some(row) = reader.next_row()? {
            let symbol = match row.get(gene_col) {
                Some(symbol) => symbol.to_string(),
                None => {
                    reader.skip(row.line, "missing gene symbol");
                    continue;
                }
            };

            let (pli_score, mis_z, syn_z) = match Self::scores(&row, pli_col, mis_col, syn_col) {
                Ok(scores) => scores,
                Err(reason) => {
                    reader.skip(row.line, reason);
                    continue;
                }
            };

            genes.insert(
                symbol.clone(),
                ExacGene {
                    symbol,
                    transcript: transcript_col.and_then(|c| row.get(c)).map(str::to_string),
                    pli_score,
                    mis_z,
                    syn_z,
                },
            );
        }

        let skipped = reader.finish();
        info!("Parsed {} ExAC genes ({} skipped lines)", genes.len(), skipped.len());

        Ok(genes.with_skipped(skipped))
    }

    fn scores(
        row: &Row,
        pli_col: usize,
        mis_col: Option<usize>,
        syn_col: Option<usize>,
    ) -> Result<(Option<f64>, Option<f64>, Option<f64>), String> {
        let optional = |col: Option<usize>, name: &str| -> Result<Option<f64>, String> {
            Ok(col.map(|c| row.parse::<f64>(c, name)).transpose()?.flatten())
        };

        Ok((
            row.parse::<f64>(pli_col, "pLI")?,
            optional(mis_col, "mis_z")?,
            optional(syn_col, "syn_z")?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAC_HEADER: &str = "transcript\tgene\tchr\tn_exons\tsyn_z\tmis_z\tlof_z\tpLI\tpRec\tpNull\n";

    #[test]
    fn test_parse_exac() {
        let data = format!(
            "{}ENST00000379198.2\tB3GALT6\t1\t1\t-0.15\t1.26\t0.52\t0.0173\t0.6\t0.38\n\
             ENST00000600805.1\tBAD\t19\t4\tx\t1.0\t0.3\tnot_a_number\t0.1\t0.1\n\
             ENST00000262662.1\tACE\t17\t25\t0.55\t\t2.1\t1.0\t0.0\t0.0\n",
            EXAC_HEADER
        );

        let genes = ExacParser::parse(data.as_bytes()).unwrap();
        assert_eq!(genes.len(), 2);
        assert_eq!(genes.skipped().len(), 1);

        let gene = genes.get(&"B3GALT6".to_string()).unwrap();
        assert_eq!(gene.pli_score, Some(0.0173));
        assert_eq!(gene.mis_z, Some(1.26));
        assert_eq!(gene.syn_z, Some(-0.15));
        assert_eq!(gene.transcript.as_deref(), Some("ENST00000379198.2"));

        let ace = genes.get(&"ACE".to_string()).unwrap();
        assert_eq!(ace.mis_z, None);
        assert_eq!(ace.pli_score, Some(1.0));
    }
}
