//! Deriving segment layouts from a plan's sources.
//!
//! Every source in a plan must cover the same row domain; a scan contributes
//! its manifest's segment boundaries, a range only its length. When a scan is
//! present its on-disk boundaries win (workers then start on block-aligned
//! rows); otherwise rows are split evenly across workers.

use quarry_codec::manifest::TableManifest;
use quarry_core::error::{Error, Result};
use quarry_operators::SegmentSpec;
use quarry_plan::{NodeRef, OperatorKind};

/// The common row domain of a plan's sources.
#[derive(Debug, Clone, Default)]
pub struct SourceDomain {
    pub num_rows: Option<u64>,
    /// Per-segment row counts from a scanned table, if any.
    pub segment_rows: Option<Vec<u64>>,
}

pub fn source_domain(plan: &NodeRef) -> Result<SourceDomain> {
    let mut domain = SourceDomain::default();
    collect(plan, &mut domain)?;
    Ok(domain)
}

fn collect(node: &NodeRef, domain: &mut SourceDomain) -> Result<()> {
    match node.kind() {
        OperatorKind::Range => {
            let rows = (node.int_param("end")? - node.int_param("start")?).max(0) as u64;
            merge_length(domain, rows)?;
        }
        OperatorKind::Scan => {
            let manifest = TableManifest::load(node.str_param("manifest")?)?;
            merge_length(domain, manifest.num_rows)?;
            match &domain.segment_rows {
                None => domain.segment_rows = Some(manifest.segment_rows.clone()),
                Some(existing) if *existing == manifest.segment_rows => {}
                Some(_) => {
                    // Two scans with different layouts; fall back to even
                    // splitting over the (already verified) common length.
                    domain.segment_rows = Some(vec![]);
                }
            }
        }
        _ => {}
    }
    for input in node.inputs() {
        collect(input, domain)?;
    }
    Ok(())
}

fn merge_length(domain: &mut SourceDomain, rows: u64) -> Result<()> {
    match domain.num_rows {
        None => {
            domain.num_rows = Some(rows);
            Ok(())
        }
        Some(existing) if existing == rows => Ok(()),
        Some(existing) => Err(Error::Shape(format!(
            "plan sources cover different row domains ({existing} vs {rows})"
        ))),
    }
}

/// Build the segment list for `domain`, targeting `workers` parallel tasks.
pub fn plan_segments(domain: &SourceDomain, workers: usize) -> Vec<SegmentSpec> {
    let num_rows = domain.num_rows.unwrap_or(0);
    if num_rows == 0 {
        return vec![SegmentSpec::whole(0)];
    }

    if let Some(rows) = &domain.segment_rows {
        if rows.len() > 1 {
            let mut specs = Vec::with_capacity(rows.len());
            let mut begin = 0u64;
            for (index, &count) in rows.iter().enumerate() {
                specs.push(SegmentSpec {
                    index,
                    num_segments: rows.len(),
                    row_begin: begin,
                    row_end: begin + count,
                });
                begin += count;
            }
            return specs;
        }
    }

    let workers = workers.max(1).min(num_rows as usize);
    let base = num_rows / workers as u64;
    let extra = num_rows % workers as u64;
    let mut specs = Vec::with_capacity(workers);
    let mut begin = 0u64;
    for index in 0..workers {
        let count = base + u64::from((index as u64) < extra);
        specs.push(SegmentSpec {
            index,
            num_segments: workers,
            row_begin: begin,
            row_end: begin + count,
        });
        begin += count;
    }
    specs
}
