//! Deterministic, read-only record of why planning ended where it did.

use std::fmt;

///
/// PlanStage
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlanStage {
    SignatureFilter,
    Isolate,
    ExactOrReduce,
    CoverageCheck,
}

impl fmt::Display for PlanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SignatureFilter => "signature_filter",
            Self::Isolate => "isolate",
            Self::ExactOrReduce => "exact_or_reduce",
            Self::CoverageCheck => "coverage_check",
        };
        f.write_str(label)
    }
}

///
/// TraceVerdict
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraceVerdict {
    Accepted,
    Rejected,
}

///
/// TraceRecord
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceRecord {
    pub stage: PlanStage,
    pub verdict: TraceVerdict,
    /// What was judged: a slice assignment, a family key set, or the request.
    pub subject: String,
    pub note: String,
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = match self.verdict {
            TraceVerdict::Accepted => "ok",
            TraceVerdict::Rejected => "rejected",
        };
        write!(f, "{} {verdict} {}: {}", self.stage, self.subject, self.note)
    }
}

///
/// PlanTrace
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PlanTrace {
    records: Vec<TraceRecord>,
}

impl PlanTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn accept(
        &mut self,
        stage: PlanStage,
        subject: impl fmt::Display,
        note: impl Into<String>,
    ) {
        self.push(stage, TraceVerdict::Accepted, subject, note);
    }

    pub(crate) fn reject(
        &mut self,
        stage: PlanStage,
        subject: impl fmt::Display,
        note: impl Into<String>,
    ) {
        self.push(stage, TraceVerdict::Rejected, subject, note);
    }

    fn push(
        &mut self,
        stage: PlanStage,
        verdict: TraceVerdict,
        subject: impl fmt::Display,
        note: impl Into<String>,
    ) {
        self.records.push(TraceRecord {
            stage,
            verdict,
            subject: subject.to_string(),
            note: note.into(),
        });
    }

    #[must_use]
    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn rejections(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records
            .iter()
            .filter(|r| r.verdict == TraceVerdict::Rejected)
    }

    pub fn at(&self, stage: PlanStage) -> impl Iterator<Item = &TraceRecord> {
        self.records.iter().filter(move |r| r.stage == stage)
    }
}

impl fmt::Display for PlanTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            writeln!(f, "{record}")?;
        }

        Ok(())
    }
}
