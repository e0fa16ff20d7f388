// ==============================================================================
// parsers/vcf.rs - Variant Call File Reader
// ==============================================================================
// Description: Streaming VCF reader (noodles-vcf) exposing raw INFO and
//              sample fields
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2025-11-22
// Version: 2.1.0
// ==============================================================================
// References:
// - VCF 4.2 Spec: https://samtools.github.io/hts-specs/VCFv4.2.pdf
// - noodles-vcf: https://docs.rs/noodles-vcf/0.81.0/noodles_vcf/
// ==============================================================================
// Layout:
//   ##meta lines
//   #CHROM POS ID REF ALT QUAL FILTER INFO [FORMAT sample1 sample2 ...]
// The sample order of the #CHROM line is the only source of genotype column
// positions; it is never assumed to follow pedigree order.
// ==============================================================================

use noodles_vcf as vcf;
use std::collections::HashMap;
use std::io::{self, BufRead};
use tracing::{debug, warn};

use crate::error::{LoadError, SkippedLine};

const SOURCE_NAME: &str = "vcf";

/// Header of a variant call file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VcfHeader {
    /// Sample ids in genotype column order
    pub samples: Vec<String>,
    /// Contig names of the ##contig lines
    pub contigs: Vec<String>,
}

impl VcfHeader {
    fn from_noodles(header: &vcf::Header) -> Self {
        Self {
            samples: header.sample_names().iter().cloned().collect(),
            contigs: header.contigs().keys().map(|k| k.to_string()).collect(),
        }
    }

    /// Individual id -> position in the genotype block
    pub fn individual_positions(&self) -> HashMap<String, usize> {
        self.samples
            .iter()
            .enumerate()
            .map(|(idx, sample)| (sample.clone(), idx))
            .collect()
    }
}

/// One data record with INFO and sample fields left undecoded
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based record number (data lines only)
    pub line: usize,
    pub chromosome: String,
    pub position: u64,
    pub id: Option<String>,
    pub reference: String,
    pub alternate: String,
    pub quality: Option<f64>,
    pub filter: Option<String>,
    /// INFO entries in file order, flags have no value
    pub info: Vec<(String, Option<String>)>,
    pub format: Vec<String>,
    /// Genotype columns in header order, split on ':'
    pub samples: Vec<Vec<String>>,
}

impl RawRecord {
    /// Value of an INFO key, None for absent keys, flags and '.'
    pub fn info(&self, key: &str) -> Option<&str> {
        self.info
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
            .filter(|v| !v.is_empty() && *v != ".")
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.info.iter().any(|(k, _)| k == key)
    }

    /// FORMAT field of the sample at `position`
    pub fn sample_field(&self, position: usize, key: &str) -> Option<&str> {
        let idx = self.format.iter().position(|f| f == key)?;
        self.samples
            .get(position)?
            .get(idx)
            .map(String::as_str)
            .filter(|v| !v.is_empty() && *v != ".")
    }
}

/// Forward-only reader; restart by opening the source again
pub struct VcfReader<R: BufRead> {
    inner: vcf::io::Reader<R>,
    header: VcfHeader,
    record: vcf::Record,
    record_num: usize,
    skipped: Vec<SkippedLine>,
}

impl<R: BufRead> VcfReader<R> {
    /// Read the header up to and including the #CHROM line
    pub fn new(reader: R) -> Result<Self, LoadError> {
        let mut inner = vcf::io::Reader::new(reader);
        let header = inner.read_header().map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                LoadError::malformed(SOURCE_NAME, format!("invalid header: {}", e))
            }
            _ => LoadError::IoError(e),
        })?;

        let header = VcfHeader::from_noodles(&header);
        debug!(
            "VCF header read: {} samples, {} contigs",
            header.samples.len(),
            header.contigs.len()
        );

        Ok(Self {
            inner,
            header,
            record: vcf::Record::default(),
            record_num: 0,
            skipped: Vec::new(),
        })
    }

    pub fn header(&self) -> &VcfHeader {
        &self.header
    }

    pub fn skipped(&self) -> &[SkippedLine] {
        &self.skipped
    }

    fn skip(&mut self, reason: String) {
        let skipped = SkippedLine::new(self.record_num, reason);
        warn!("Skipping {} record {}", SOURCE_NAME, skipped);
        self.skipped.push(skipped);
    }
}

impl<R: BufRead> Iterator for VcfReader<R> {
    type Item = Result<RawRecord, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.read_record(&mut self.record) {
                Ok(0) => return None,
                Ok(_) => self.record_num += 1,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    self.record_num += 1;
                    self.skip(e.to_string());
                    continue;
                }
                Err(e) => return Some(Err(LoadError::IoError(e))),
            }

            match decode(&self.record, self.header.samples.len(), self.record_num) {
                Ok(record) => return Some(Ok(record)),
                Err(reason) => self.skip(reason),
            }
        }
    }
}

/// Copy the fields of a noodles record; Err(reason) for undecodable records
fn decode(record: &vcf::Record, sample_count: usize, record_num: usize) -> Result<RawRecord, String> {
    let position = match record.variant_start() {
        Some(Ok(position)) => position.get() as u64,
        Some(Err(e)) => return Err(format!("invalid position: {}", e)),
        None => return Err("missing position".to_string()),
    };

    let quality = match record.quality_score() {
        Some(Ok(score)) => Some(f64::from(score)),
        Some(Err(e)) => return Err(format!("invalid quality: {}", e)),
        None => None,
    };

    let ids = record.ids();
    let reference_bases = record.reference_bases();
    let alternate_bases = record.alternate_bases();
    let filters = record.filters();
    let info = record.info();
    let samples = record.samples();

    let info: &str = info.as_ref();
    let info = info
        .split(';')
        .filter(|entry| !entry.is_empty() && *entry != ".")
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (entry.to_string(), None),
        })
        .collect();

    let (format, samples) = if sample_count == 0 {
        (Vec::new(), Vec::new())
    } else {
        let samples: &str = samples.as_ref();
        let mut columns = samples.split('\t');
        let format = columns
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| "missing FORMAT column".to_string())?
            .split(':')
            .map(str::to_string)
            .collect();
        let samples: Vec<Vec<String>> = columns
            .map(|sample| sample.split(':').map(str::to_string).collect())
            .collect();
        if samples.len() < sample_count {
            return Err(format!(
                "expected {} sample columns, found {}",
                sample_count,
                samples.len()
            ));
        }
        (format, samples)
    };

    Ok(RawRecord {
        line: record_num,
        chromosome: record.reference_sequence_name().to_string(),
        position,
        id: present(ids.as_ref()),
        reference: AsRef::<str>::as_ref(&reference_bases).to_string(),
        alternate: AsRef::<str>::as_ref(&alternate_bases).to_string(),
        quality,
        filter: present(filters.as_ref()),
        info,
        format,
        samples,
    })
}

fn present(value: &str) -> Option<String> {
    (!value.is_empty() && value != ".").then(|| value.to_string())
}
