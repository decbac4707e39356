use crate::{
    config::PlannerConfig,
    context::{ContextRegistry, PartitionStatus},
    coverage::{AggregateCoverage, Coverage, aggregate_coverage, coverage, intersect_coverage},
    error::InternalError,
    obs::{MetricsEvent, PlanOutcome, record},
    plan::{
        Answer, Disclosure, FetchItemId, FetchPlanItem, PlanFault, PlanRequest, PlanResult,
        PlanStage, PlanTrace,
    },
    reduce::{ReductionOutcome, assess_grid, reduce},
    signature::{IncompatibleReason, Signature, SignatureMatch, can_satisfy},
    slice::{
        AggregateWindow, DimensionAssignment, Slice, SliceData, SliceFamily, exact_matches,
        isolate, partition_families,
    },
    store::SliceStore,
    types::DateRange,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::debug;

///
/// Planner
///
/// Stateless apart from configuration and the registry handle, so one
/// planner serves any number of concurrent requests.
///

#[derive(Clone)]
pub struct Planner {
    config: PlannerConfig,
    registry: Arc<dyn ContextRegistry>,
}

impl Planner {
    #[must_use]
    pub fn new(config: PlannerConfig, registry: Arc<dyn ContextRegistry>) -> Self {
        Self { config, registry }
    }

    #[must_use]
    pub const fn config(&self) -> &PlannerConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &dyn ContextRegistry {
        self.registry.as_ref()
    }

    /// Signature for data carrying `assignment`: the core hash plus the
    /// current definition hash of every key the registry knows.
    #[must_use]
    pub fn signature_for(&self, core_hash: &str, assignment: &DimensionAssignment) -> Signature {
        let hashes: Vec<(&str, String)> = assignment
            .keys()
            .filter_map(|key| {
                self.registry
                    .get_definition(key)
                    .map(|def| (key, def.definition_hash()))
            })
            .collect();

        Signature::structured(core_hash, hashes)
    }

    /// Load the metric's slices from `store` and plan over that snapshot.
    pub fn plan(
        &self,
        store: &dyn SliceStore,
        request: &PlanRequest,
    ) -> Result<PlanResult, InternalError> {
        let slices = store.load_slices(&request.metric)?;

        Ok(self.plan_snapshot(&slices, request))
    }

    /// Plan over an explicit snapshot. Pure; never blocks.
    #[must_use]
    pub fn plan_snapshot(&self, slices: &[Slice], request: &PlanRequest) -> PlanResult {
        let result = Pass::new(self, request).run(slices);

        let (outcome, items) = match &result {
            PlanResult::Satisfied { .. } => (PlanOutcome::Satisfied, 0),
            PlanResult::NeedsFetch { items, .. } => (PlanOutcome::NeedsFetch, items.len()),
            PlanResult::Refused { .. } => (PlanOutcome::Refused, 0),
        };
        record(MetricsEvent::PlanFinish {
            metric: request.metric.as_str(),
            outcome,
            items: u64::try_from(items).unwrap_or(u64::MAX),
        });
        debug!(
            metric = %request.metric,
            assignment = %request.assignment,
            range = %request.range,
            outcome = ?outcome,
            items,
            "plan finished"
        );

        result
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

///
/// FamilyEval
///

enum FamilyEval {
    Complete {
        answer: Answer,
        prorated: Vec<Disclosure>,
    },
    Partial {
        answer: Answer,
        disclosures: Vec<Disclosure>,
    },
    Fetch(Vec<FetchPlanItem>),
    Rejected,
}

///
/// Pass
///
/// State for planning one request.
///

struct Pass<'a> {
    planner: &'a Planner,
    request: &'a PlanRequest,
    query_signature: Signature,
    trace: PlanTrace,
}

impl<'a> Pass<'a> {
    fn new(planner: &'a Planner, request: &'a PlanRequest) -> Self {
        Self {
            planner,
            request,
            query_signature: planner.signature_for(&request.core_hash, &request.assignment),
            trace: PlanTrace::new(),
        }
    }

    fn run(mut self, slices: &[Slice]) -> PlanResult {
        let compatible = self.signature_filter(slices);
        let mut fetch: Option<Vec<FetchPlanItem>> = None;

        // Exact slice first.
        match self.exact_choice(&compatible) {
            Ok(None) => {}
            Ok(Some(slice)) => match self.exact_path(slice) {
                Ok((answer, disclosures)) => return self.satisfied(answer, disclosures),
                Err(items) => fetch = Some(items),
            },
            Err(fault) => return self.refuse(fault),
        }

        // Then reducible families, in key-set order.
        let mut complete: Vec<(Vec<String>, Answer, Vec<Disclosure>)> = Vec::new();
        let mut partial: Option<(Answer, Vec<Disclosure>)> = None;

        for family in partition_families(compatible.iter().copied(), &self.request.assignment) {
            match self.family_path(&family) {
                Err(fault) => return self.refuse(fault),
                Ok(FamilyEval::Complete { answer, prorated }) => {
                    complete.push((family.unspecified, answer, prorated));
                }
                Ok(FamilyEval::Partial {
                    answer,
                    disclosures,
                }) => {
                    partial.get_or_insert((answer, disclosures));
                }
                Ok(FamilyEval::Fetch(items)) => {
                    fetch.get_or_insert(items);
                }
                Ok(FamilyEval::Rejected) => {}
            }
        }

        let mut complete = complete.into_iter();
        if let Some((dims, answer, prorated)) = complete.next() {
            let alternatives = complete.map(|(dims, _, _)| dims).collect();
            let mut disclosures = vec![Disclosure::MeceComplete { dims, alternatives }];
            disclosures.extend(prorated);

            return self.satisfied(answer, disclosures);
        }
        if let Some(items) = fetch {
            return self.needs_fetch(items);
        }
        if let Some((answer, disclosures)) = partial {
            return self.satisfied(answer, disclosures);
        }

        self.trace.reject(
            PlanStage::ExactOrReduce,
            &self.request.assignment,
            "no usable slice; fetching the full window",
        );
        let item = self.item(self.request.assignment.clone(), self.request.range);

        self.needs_fetch(vec![item])
    }

    //
    // Stages
    //

    fn signature_filter<'s>(&mut self, slices: &'s [Slice]) -> Vec<&'s Slice> {
        let mut compatible = Vec::new();

        for slice in slices {
            if !slice.assignment.satisfies(&self.request.assignment) {
                continue;
            }
            let verdict = match can_satisfy(&slice.signature, &self.query_signature) {
                SignatureMatch::Compatible => self.stale_dimension(slice),
                SignatureMatch::Incompatible(reason) => Some(reason),
            };

            if let Some(reason) = verdict {
                record(MetricsEvent::SignatureRejected {
                    metric: self.request.metric.as_str(),
                });
                self.trace
                    .reject(PlanStage::SignatureFilter, &slice.assignment, reason.to_string());
            } else {
                compatible.push(slice);
            }
        }

        debug!(
            metric = %self.request.metric,
            compatible = compatible.len(),
            "signature filter"
        );

        compatible
    }

    // Summing over a dimension is only sound when its cached meaning is the
    // current one.
    fn stale_dimension(&self, slice: &Slice) -> Option<IncompatibleReason> {
        slice
            .assignment
            .extra_keys(&self.request.assignment)
            .into_iter()
            .find(|key| {
                self.planner
                    .registry
                    .get_definition(key)
                    .is_some_and(|def| {
                        slice.signature.dimension_hash(key) != Some(def.definition_hash().as_str())
                    })
            })
            .map(IncompatibleReason::DimensionDefinitionChanged)
    }

    // Several compatible exact slices are resolved in favour of the one
    // written under the current signature; fetches always write there.
    fn exact_choice<'s>(
        &mut self,
        compatible: &[&'s Slice],
    ) -> Result<Option<&'s Slice>, PlanFault> {
        let exact = exact_matches(compatible.iter().copied(), &self.request.assignment);
        let current: Vec<&Slice> = exact
            .iter()
            .copied()
            .filter(|slice| slice.signature == self.query_signature)
            .collect();

        match (exact.as_slice(), current.as_slice()) {
            ([], _) => Ok(None),
            ([slice], _) => Ok(Some(*slice)),
            (_, [slice]) => {
                self.trace.accept(
                    PlanStage::SignatureFilter,
                    &slice.assignment,
                    format!("current signature preferred over {} older", exact.len() - 1),
                );
                Ok(Some(*slice))
            }
            _ => Err(PlanFault::AmbiguousSlice {
                cell: self.request.assignment.clone(),
            }),
        }
    }

    fn exact_path(
        &mut self,
        slice: &Slice,
    ) -> Result<(Answer, Vec<Disclosure>), Vec<FetchPlanItem>> {
        let range = self.request.range;

        match &slice.data {
            SliceData::Daily(series) => match coverage(series, &range) {
                Coverage::FullyCovered => {
                    self.trace.accept(
                        PlanStage::CoverageCheck,
                        &slice.assignment,
                        "exact slice covers window",
                    );
                    let clipped = series.clip(&range);

                    Ok((
                        Answer {
                            range,
                            total: clipped.total(),
                            daily: Some(clipped),
                        },
                        vec![Disclosure::Exact],
                    ))
                }
                Coverage::Gaps(gaps) => {
                    self.trace.reject(
                        PlanStage::CoverageCheck,
                        &slice.assignment,
                        format!(
                            "exact slice holds {} run(s), missing {} range(s)",
                            series.covered_ranges().len(),
                            gaps.len()
                        ),
                    );

                    Err(gaps
                        .into_iter()
                        .map(|gap| self.item(slice.assignment.clone(), gap))
                        .collect())
                }
            },
            SliceData::Aggregate(window) => {
                match aggregate_coverage(window, &range, self.planner.config.prorate_aggregates) {
                    AggregateCoverage::Exact(total) => {
                        self.trace.accept(
                            PlanStage::CoverageCheck,
                            &slice.assignment,
                            "exact aggregate window",
                        );

                        Ok((
                            Answer {
                                range,
                                daily: None,
                                total,
                            },
                            vec![Disclosure::Exact],
                        ))
                    }
                    AggregateCoverage::Prorated { counts, cached } => {
                        self.trace.accept(
                            PlanStage::CoverageCheck,
                            &slice.assignment,
                            format!("prorated from {cached}"),
                        );

                        Ok((
                            Answer {
                                range,
                                daily: None,
                                total: counts,
                            },
                            vec![Disclosure::Prorated {
                                cached,
                                requested: range,
                            }],
                        ))
                    }
                    AggregateCoverage::Uncovered => {
                        self.trace.reject(
                            PlanStage::CoverageCheck,
                            &slice.assignment,
                            format!("aggregate window {} cannot answer {range}", window.range),
                        );

                        Err(vec![self.item(slice.assignment.clone(), range)])
                    }
                }
            }
        }
    }

    fn family_path(&mut self, family: &SliceFamily<'_>) -> Result<FamilyEval, PlanFault> {
        let keys = family.unspecified.join(",");
        let planner = self.planner;
        let registry = planner.registry.as_ref();
        let range = self.request.range;

        let isolated = isolate(family.slices.iter().copied(), &self.request.assignment)?;
        self.trace.accept(
            PlanStage::Isolate,
            &keys,
            format!("{} slice(s)", isolated.matched.len()),
        );

        let grid = assess_grid(&isolated.matched, &isolated.unspecified, registry)?;
        if !grid.failures.is_empty() {
            for failure in &grid.failures {
                self.trace.reject(
                    PlanStage::ExactOrReduce,
                    &keys,
                    format!("{}: {}", failure.key, failure.failure),
                );
            }
            return Ok(FamilyEval::Rejected);
        }

        let mut items = Vec::new();
        if !grid.missing_cells.is_empty() && planner.config.fetch_missing_values {
            self.trace.reject(
                PlanStage::ExactOrReduce,
                &keys,
                format!("{} missing cell(s)", grid.missing_cells.len()),
            );
            for cell in &grid.missing_cells {
                items.push(self.item(self.request.assignment.merged(cell), range));
            }
        }

        // Per-slice coverage; the combined coverage is their intersection.
        let mut views: Vec<Slice> = Vec::with_capacity(isolated.matched.len());
        let mut prorated: Vec<Disclosure> = Vec::new();
        for slice in &isolated.matched {
            match &slice.data {
                SliceData::Daily(series) => match coverage(series, &range) {
                    Coverage::FullyCovered => views.push(Slice {
                        data: SliceData::Daily(series.clip(&range)),
                        ..(*slice).clone()
                    }),
                    Coverage::Gaps(gaps) => {
                        for gap in gaps {
                            items.push(self.item(slice.assignment.clone(), gap));
                        }
                    }
                },
                SliceData::Aggregate(window) => {
                    match aggregate_coverage(window, &range, planner.config.prorate_aggregates) {
                        AggregateCoverage::Exact(_) => views.push((*slice).clone()),
                        AggregateCoverage::Prorated { counts, cached } => {
                            views.push(Slice {
                                data: SliceData::Aggregate(AggregateWindow { range, counts }),
                                ..(*slice).clone()
                            });
                            let disclosure = Disclosure::Prorated {
                                cached,
                                requested: range,
                            };
                            if !prorated.contains(&disclosure) {
                                prorated.push(disclosure);
                            }
                        }
                        AggregateCoverage::Uncovered => {
                            items.push(self.item(slice.assignment.clone(), range));
                        }
                    }
                }
            }
        }

        let combined = intersect_coverage(
            isolated
                .matched
                .iter()
                .filter_map(|slice| slice.data.as_daily()),
            &range,
        );
        if !items.is_empty() {
            self.trace.reject(
                PlanStage::CoverageCheck,
                &keys,
                format!(
                    "combined coverage has {} gap(s); {} fetch item(s)",
                    combined.gaps().len(),
                    items.len()
                ),
            );
            return Ok(FamilyEval::Fetch(items));
        }
        self.trace
            .accept(PlanStage::CoverageCheck, &keys, "every member covers window");

        let view_refs: Vec<&Slice> = views.iter().collect();
        let reduction = match reduce(&view_refs, &isolated.unspecified, registry)? {
            ReductionOutcome::Reduced(reduction) => reduction,
            ReductionOutcome::NotReducible(reasons) => {
                for reason in reasons {
                    self.trace
                        .reject(PlanStage::ExactOrReduce, &keys, reason.to_string());
                }
                return Ok(FamilyEval::Rejected);
            }
        };

        let complete = reduction.is_complete();
        record(MetricsEvent::Reduction {
            metric: self.request.metric.as_str(),
            complete,
        });
        debug!(metric = %self.request.metric, dims = %keys, complete, "reduction");

        let answer = match &reduction.data {
            SliceData::Daily(series) => Answer {
                range,
                total: series.total(),
                daily: Some(series.clone()),
            },
            SliceData::Aggregate(window) => Answer {
                range,
                daily: None,
                total: window.counts,
            },
        };

        if complete {
            self.trace
                .accept(PlanStage::ExactOrReduce, &keys, "complete partition");
            return Ok(FamilyEval::Complete { answer, prorated });
        }

        let mut dims = Vec::new();
        let mut missing = BTreeMap::new();
        for dim in reduction.partial_dimensions() {
            dims.push(dim.key.clone());
            if let PartitionStatus::PartialButAggregable { missing: values } = &dim.status {
                missing.insert(dim.key.clone(), values.clone());
            }
        }
        self.trace
            .accept(PlanStage::ExactOrReduce, &keys, "partial partition, disclosed");

        let mut disclosures = vec![Disclosure::PartialAggregation { dims, missing }];
        disclosures.extend(prorated);

        Ok(FamilyEval::Partial {
            answer,
            disclosures,
        })
    }

    //
    // Terminal states
    //

    fn item(&self, assignment: DimensionAssignment, range: DateRange) -> FetchPlanItem {
        let signature = self
            .planner
            .signature_for(&self.request.core_hash, &assignment);

        FetchPlanItem::new(self.request.metric.clone(), assignment, range, signature)
    }

    fn satisfied(self, answer: Answer, disclosures: Vec<Disclosure>) -> PlanResult {
        PlanResult::Satisfied {
            answer,
            disclosures,
            trace: self.trace,
        }
    }

    fn needs_fetch(self, items: Vec<FetchPlanItem>) -> PlanResult {
        let mut seen: BTreeSet<FetchItemId> = BTreeSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.id()))
            .collect();

        PlanResult::NeedsFetch {
            items,
            trace: self.trace,
        }
    }

    fn refuse(mut self, fault: PlanFault) -> PlanResult {
        self.trace
            .reject(PlanStage::ExactOrReduce, &self.request.assignment, fault.to_string());

        PlanResult::Refused {
            fault,
            trace: self.trace,
        }
    }
}
