// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for reference catalogs, pedigrees and variant calls
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2025-11-22
// Version: 2.1.0
// ==============================================================================

pub mod ensembl;
pub mod exac;
pub mod hgnc;
pub mod hpo;
pub mod omim;
pub mod pedigree;
pub mod tabular;
pub mod variant;
pub mod vcf;

pub use ensembl::{EnsemblGene, EnsemblParser, EnsemblTranscript};
pub use exac::{ExacGene, ExacParser};
pub use hgnc::{HgncGene, HgncParser};
pub use hpo::{HpoDisease, HpoGene, HpoParser, HpoTerm};
pub use omim::{MimGene, OmimGene, OmimParser};
pub use pedigree::{Pedigree, PedigreeParser};
pub use tabular::SourceTable;
pub use variant::{ParsedVariant, VariantParser};
pub use vcf::{RawRecord, VcfHeader, VcfReader};

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use crate::error::LoadError;

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Open a catalog or pedigree file, decompressing `.gz` transparently
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead>, LoadError> {
    let file = File::open(path)?;
    let is_gzip = has_extension(path, &["gz"]);

    debug!("Opening {:?} (gzip: {})", path, is_gzip);
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Open a variant call file; `.vcf.gz` / `.bgz` are read as BGZF
pub fn open_variant_source(path: &Path) -> Result<Box<dyn BufRead>, LoadError> {
    let file = File::open(path)?;
    let is_bgzf = has_extension(path, &["gz", "bgz"]);

    debug!("Opening variant file {:?} (bgzf: {})", path, is_bgzf);
    if is_bgzf {
        Ok(Box::new(noodles_bgzf::io::Reader::new(file)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
