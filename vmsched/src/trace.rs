/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task-description trace parsing.
//!
//! The trace is line-oriented text produced by the upstream ETL step:
//!
//! ```text
//! Job ID: 6251812952
//! 5611824441 6251812952 0 9 0.0125 0.0159 0.0003
//! 5611824441 6251812952 1 9 0.0125 0.0159 0.0003
//! Job ID: 6251974185
//! ...
//! ```
//!
//! A line starting with [`JOB_MARKER`] opens a new job block.  Every other
//! non-blank line is a whitespace-separated task record where field 1 is the
//! job id, field 2 the task index and fields 4–6 the cpu / ram / disk
//! demand.  Parsing stops once the configured task cap is reached.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::task::Demand;

/// First character of a job-header line.
pub const JOB_MARKER: char = 'J';

const FIELD_JOB_ID: usize = 1;
const FIELD_INDEX: usize = 2;
const FIELD_CPU: usize = 4;
const FIELD_RAM: usize = 5;
const FIELD_DISK: usize = 6;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure while reading a trace.  Every parse variant carries the 1-based
/// line number of the offending line.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("cannot read trace file '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while reading trace at line {line}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: missing field {field} (found {found} fields)")]
    MissingField {
        line: usize,
        field: usize,
        found: usize,
    },

    #[error("line {line}: field {field} is not a valid number: '{value}'")]
    InvalidNumber {
        line: usize,
        field: usize,
        value: String,
    },
}

// ── Records ───────────────────────────────────────────────────────────────────

/// One task line of the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub job_id: String,
    pub index: u32,
    pub demand: Demand,
}

/// One contiguous job block of the trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobRecord {
    pub records: Vec<TraceRecord>,
}

impl JobRecord {
    /// Job id shared by the records (taken from the first record).
    pub fn id(&self) -> Option<&str> {
        self.records.first().map(|r| r.job_id.as_str())
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Open `path` and parse at most `cap` task records.
pub fn load_trace(path: &Path, cap: usize) -> Result<Vec<JobRecord>, TraceError> {
    let file = File::open(path).map_err(|source| TraceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let jobs = parse_trace(BufReader::new(file), cap)?;
    info!(
        path = %path.display(),
        jobs = jobs.len(),
        tasks = jobs.iter().map(|j| j.records.len()).sum::<usize>(),
        "trace loaded"
    );
    Ok(jobs)
}

/// Parse a trace from any buffered reader, stopping after `cap` records.
///
/// Records that appear before the first job header form an implicit first
/// job.  Empty job blocks are dropped.
pub fn parse_trace<R: BufRead>(reader: R, cap: usize) -> Result<Vec<JobRecord>, TraceError> {
    let mut jobs = Vec::new();
    let mut current = JobRecord::default();
    let mut count = 0usize;

    if cap == 0 {
        return Ok(jobs);
    }

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.map_err(|source| TraceError::Read {
            line: line_no,
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with(JOB_MARKER) {
            if !current.records.is_empty() {
                jobs.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.records.push(parse_record(trimmed, line_no)?);
        count += 1;
        if count == cap {
            debug!(cap, line = line_no, "task cap reached");
            break;
        }
    }

    if !current.records.is_empty() {
        jobs.push(current);
    }
    Ok(jobs)
}

fn parse_record(line: &str, line_no: usize) -> Result<TraceRecord, TraceError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let field = |idx: usize| -> Result<&str, TraceError> {
        fields.get(idx).copied().ok_or(TraceError::MissingField {
            line: line_no,
            field: idx,
            found: fields.len(),
        })
    };
    let number = |idx: usize| -> Result<f64, TraceError> {
        let raw = field(idx)?;
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| TraceError::InvalidNumber {
                line: line_no,
                field: idx,
                value: raw.to_string(),
            })
    };

    let job_id = field(FIELD_JOB_ID)?.to_string();
    let raw_index = field(FIELD_INDEX)?;
    let index = raw_index
        .parse::<u32>()
        .map_err(|_| TraceError::InvalidNumber {
            line: line_no,
            field: FIELD_INDEX,
            value: raw_index.to_string(),
        })?;

    Ok(TraceRecord {
        job_id,
        index,
        demand: Demand::new(number(FIELD_CPU)?, number(FIELD_RAM)?, number(FIELD_DISK)?),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
