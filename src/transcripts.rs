// ==============================================================================
// transcripts.rs - Transcript Linker
// ==============================================================================
// Description: Attaches Ensembl transcripts to linked genes, flags primaries
// Author: Matt Barham
// Created: 2025-11-17
// Modified: 2025-11-19
// Version: 1.0.0
// ==============================================================================
// - hgnc_id resolves through the owning Ensembl gene id (same build only)
// - Unresolved transcripts are kept with hgnc_id = None
// - A transcript is primary when one of its RefSeq ids is among the gene's
//   primary_transcripts; without RefSeq ids it is never primary
// ==============================================================================

use crate::link::LinkedGenes;
use crate::models::{normalize_chromosome, TranscriptRecord};
use crate::parsers::ensembl::EnsemblTranscript;

pub struct TranscriptLinker;

impl TranscriptLinker {
    /// Link a stream of transcripts lazily
    pub fn link<'a>(
        transcripts: impl Iterator<Item = EnsemblTranscript> + 'a,
        genes: &'a LinkedGenes,
    ) -> impl Iterator<Item = TranscriptRecord> + 'a {
        transcripts.map(move |tx| Self::link_one(tx, genes))
    }

    pub fn link_one(tx: EnsemblTranscript, genes: &LinkedGenes) -> TranscriptRecord {
        let gene = genes.by_ensembl_id(&tx.ensembl_gene_id);

        let mut record = TranscriptRecord {
            ensembl_gene_id: tx.ensembl_gene_id,
            ensembl_transcript_id: tx.ensembl_transcript_id,
            build: genes.build(),
            chromosome: normalize_chromosome(&tx.chromosome),
            start: tx.start,
            end: tx.end,
            refseq_mrna: tx.refseq_mrna,
            refseq_mrna_predicted: tx.refseq_mrna_predicted,
            refseq_ncrna: tx.refseq_ncrna,
            refseq_identifiers: tx.refseq_identifiers,
            hgnc_id: gene.map(|g| g.hgnc_id),
            is_primary: false,
        };

        if let Some(gene) = gene {
            let is_primary = record.refseq_ids().any(|id| {
                gene.primary_transcripts
                    .iter()
                    .any(|primary| strip_version(primary) == strip_version(id))
            });
            record.is_primary = is_primary;
        }

        record
    }
}

/// "NM_080605.4" -> "NM_080605"
fn strip_version(refseq_id: &str) -> &str {
    refseq_id.split('.').next().unwrap_or(refseq_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Build, GeneRecord};
    use std::collections::BTreeSet;

    fn genes() -> LinkedGenes {
        let mut gene = GeneRecord::new(17978, "B3GALT6", Build::Grch37);
        gene.ensembl_id = Some("ENSG00000176022".to_string());
        gene.primary_transcripts.insert("NM_080605.4".to_string());
        LinkedGenes::new(Build::Grch37, vec![gene]).unwrap()
    }

    fn transcript(gene_id: &str, tx_id: &str, refseq: Option<&str>) -> EnsemblTranscript {
        EnsemblTranscript {
            ensembl_gene_id: gene_id.to_string(),
            ensembl_transcript_id: tx_id.to_string(),
            chromosome: "chr1".to_string(),
            start: 1167629,
            end: 1170421,
            refseq_mrna: refseq.map(str::to_string),
            refseq_mrna_predicted: None,
            refseq_ncrna: None,
            refseq_identifiers: refseq.map(str::to_string).into_iter().collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_primary_transcript_flag() {
        let genes = genes();
        let transcripts = vec![
            transcript("ENSG00000176022", "ENST00000379198", Some("NM_080605")),
            transcript("ENSG00000176022", "ENST00000480000", Some("NM_999999")),
            transcript("ENSG00000176022", "ENST00000490000", None),
        ];
        let linked: Vec<TranscriptRecord> =
            TranscriptLinker::link(transcripts.into_iter(), &genes).collect();

        assert_eq!(linked.len(), 3);
        assert!(linked[0].is_primary);
        assert!(!linked[1].is_primary);
        assert!(!linked[2].is_primary);
        assert!(linked.iter().all(|tx| tx.hgnc_id == Some(17978)));
        assert_eq!(linked[0].chromosome, "1");
    }

    #[test]
    fn test_unresolved_transcript_kept() {
        let genes = genes();
        let tx = TranscriptLinker::link_one(
            transcript("ENSG00000000000", "ENST00000000001", Some("NM_080605")),
            &genes,
        );
        assert_eq!(tx.hgnc_id, None);
        assert!(!tx.is_primary);
        assert_eq!(tx.build, Build::Grch37);
    }
}
