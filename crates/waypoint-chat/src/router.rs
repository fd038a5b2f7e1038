//! Executes tool plans against the [`ToolExecutor`].
//!
//! Steps run strictly in plan order. A step bound to an earlier step's output
//! is not issued until that output exists and its coordinates have been
//! filled in. The first failing step aborts the plan; nothing is retried
//! here. Search memory is assembled only after every step has succeeded and
//! is written through the caller's [`ContextLease`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use waypoint_core::config::RouterConfig;
use waypoint_core::types::{Coordinates, PlaceRecord, SearchType};

use crate::context::ContextLease;
use crate::error::{ToolError, TurnFailure};
use crate::planner::{LocationSource, PlaceSource, PlannedStep, ToolPlan};
use crate::tools::{
    coordinates_param, parse_result, GeocodeResult, ReverseGeocodeResult, SearchResult,
    ToolExecutor, ToolName,
};
use crate::types::SearchMemory;

/// Output of one completed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutput {
    pub index: usize,
    pub tool: ToolName,
    pub label: String,
    pub value: Value,
}

/// Everything produced by a fully successful plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub search_type: SearchType,
    pub outputs: Vec<StepOutput>,
    pub memory: SearchMemory,
}

impl ExecutionReport {
    /// Output of the last step using `tool`.
    pub fn output_of(&self, tool: ToolName) -> Option<&Value> {
        self.outputs
            .iter()
            .rev()
            .find(|o| o.tool == tool)
            .map(|o| &o.value)
    }
}

/// How a plan ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterOutcome {
    Completed(ExecutionReport),
    /// A step failed or timed out; later steps were not issued.
    Failed {
        failure: TurnFailure,
        completed: Vec<StepOutput>,
    },
    /// The turn deadline elapsed before the plan finished.
    DeadlineExceeded {
        completed: Vec<StepOutput>,
        pending: Vec<ToolName>,
    },
}

impl RouterOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RouterOutcome::Completed(_))
    }
}

/// Sequences tool calls for location intents.
pub struct OrchestrationRouter {
    tools: Arc<dyn ToolExecutor>,
    step_timeout: Duration,
    turn_deadline: Duration,
    max_results: usize,
}

impl OrchestrationRouter {
    pub fn new(
        tools: Arc<dyn ToolExecutor>,
        step_timeout: Duration,
        turn_deadline: Duration,
        max_results: usize,
    ) -> Self {
        Self {
            tools,
            step_timeout,
            turn_deadline,
            max_results: max_results.max(1),
        }
    }

    pub fn from_config(tools: Arc<dyn ToolExecutor>, config: &RouterConfig) -> Self {
        Self::new(
            tools,
            config.step_timeout(),
            config.turn_deadline(),
            config.max_results,
        )
    }

    /// Write a completed plan's search memory through `lease`.
    ///
    /// Called after the turn itself is recorded, so the new memory counts as
    /// fresh for the next turn. Only a [`ExecutionReport`] can be committed;
    /// failed and partial plans have nothing to write.
    pub fn commit(&self, lease: &mut ContextLease, report: &ExecutionReport) {
        lease.update_search_memory(report.memory.clone());
        info!(
            search_type = %report.search_type,
            results = report.memory.results.len(),
            "Search memory updated"
        );
    }

    /// Execute `plan` without touching any context.
    pub async fn execute(&self, plan: &ToolPlan) -> RouterOutcome {
        let deadline = Instant::now() + self.turn_deadline;
        let mut completed: Vec<StepOutput> = Vec::with_capacity(plan.steps.len());

        for (index, step) in plan.steps.iter().enumerate() {
            let params = match bind_params(step, &completed) {
                Ok(params) => params,
                Err(failure) => return RouterOutcome::Failed { failure, completed },
            };

            debug!(step = index, tool = %step.tool, label = %step.label, "Issuing tool call");
            let call = tokio::time::timeout(self.step_timeout, self.tools.execute(step.tool, params));
            let result = match tokio::time::timeout_at(deadline, call).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(ToolError::Timeout(self.step_timeout.as_millis() as u64)),
                Err(_) => {
                    let pending = plan.steps[index..].iter().map(|s| s.tool).collect();
                    warn!(
                        step = index,
                        tool = %step.tool,
                        deadline_ms = self.turn_deadline.as_millis() as u64,
                        "Turn deadline exceeded, aborting plan"
                    );
                    return RouterOutcome::DeadlineExceeded { completed, pending };
                }
            };

            match result {
                Ok(value) => completed.push(StepOutput {
                    index,
                    tool: step.tool,
                    label: step.label.clone(),
                    value,
                }),
                Err(err) => {
                    warn!(step = index, tool = %step.tool, error = %err, "Tool call failed, aborting plan");
                    return RouterOutcome::Failed {
                        failure: upstream(step.tool, &err),
                        completed,
                    };
                }
            }
        }

        match self.assemble_memory(plan, &completed) {
            Ok(memory) => {
                info!(
                    search_type = %plan.search_type,
                    steps = completed.len(),
                    "Tool plan completed"
                );
                RouterOutcome::Completed(ExecutionReport {
                    search_type: plan.search_type,
                    outputs: completed,
                    memory,
                })
            }
            Err(failure) => RouterOutcome::Failed { failure, completed },
        }
    }

    fn assemble_memory(
        &self,
        plan: &ToolPlan,
        outputs: &[StepOutput],
    ) -> Result<SearchMemory, TurnFailure> {
        let mut results = Vec::new();
        for source in &plan.memory_places {
            match source {
                PlaceSource::Known { place } => results.push(place.clone()),
                PlaceSource::Geocoded { step, label } => {
                    let output = output_at(outputs, *step)?;
                    let geocoded: GeocodeResult =
                        parse_result(output.tool, &output.value).map_err(|e| upstream(output.tool, &e))?;
                    results.push(PlaceRecord {
                        name: geocoded.name.clone().unwrap_or_else(|| label.clone()),
                        coordinates: valid(output.tool, geocoded.coordinates())?,
                        category: "place".to_string(),
                        source_query_id: plan.query_id,
                    });
                }
                PlaceSource::SearchResults { step, category } => {
                    let output = output_at(outputs, *step)?;
                    let found: SearchResult =
                        parse_result(output.tool, &output.value).map_err(|e| upstream(output.tool, &e))?;
                    for place in found.places.into_iter().take(self.max_results) {
                        let coordinates = Coordinates::new(place.lat, place.lon);
                        if !coordinates.is_valid() {
                            warn!(name = %place.name, "Dropping search result with invalid coordinates");
                            continue;
                        }
                        results.push(PlaceRecord {
                            name: place.name,
                            coordinates,
                            category: place.category.unwrap_or_else(|| category.clone()),
                            source_query_id: plan.query_id,
                        });
                    }
                }
                PlaceSource::ReverseGeocoded { step, at } => {
                    let output = output_at(outputs, *step)?;
                    let reversed: ReverseGeocodeResult =
                        parse_result(output.tool, &output.value).map_err(|e| upstream(output.tool, &e))?;
                    results.push(PlaceRecord {
                        name: reversed.address,
                        coordinates: *at,
                        category: "address".to_string(),
                        source_query_id: plan.query_id,
                    });
                }
            }
        }

        let location = match plan.memory_location {
            None => None,
            Some(LocationSource::Fixed { coordinates }) => Some(coordinates),
            Some(LocationSource::Geocoded { step }) => {
                Some(step_coordinates(output_at(outputs, step)?)?)
            }
        };

        Ok(SearchMemory::from_results(plan.search_type, results, location))
    }
}

fn upstream(tool: ToolName, err: &ToolError) -> TurnFailure {
    TurnFailure::UpstreamToolFailure {
        tool: tool.to_string(),
        reason: err.to_string(),
    }
}

fn valid(tool: ToolName, coordinates: Coordinates) -> Result<Coordinates, TurnFailure> {
    if coordinates.is_valid() {
        Ok(coordinates)
    } else {
        Err(upstream(
            tool,
            &ToolError::InvalidResponse(format!("coordinates out of range: {}", coordinates)),
        ))
    }
}

fn output_at(outputs: &[StepOutput], step: usize) -> Result<&StepOutput, TurnFailure> {
    outputs
        .iter()
        .find(|o| o.index == step)
        .ok_or_else(|| TurnFailure::UpstreamToolFailure {
            tool: "router".to_string(),
            reason: format!("step {} produced no output", step),
        })
}

/// Coordinates produced by a geocode (or search) step.
fn step_coordinates(output: &StepOutput) -> Result<Coordinates, TurnFailure> {
    let coordinates = match output.tool {
        ToolName::Search => {
            let found: SearchResult =
                parse_result(output.tool, &output.value).map_err(|e| upstream(output.tool, &e))?;
            let first = found.places.first().ok_or_else(|| {
                upstream(output.tool, &ToolError::InvalidResponse("no places found".to_string()))
            })?;
            Coordinates::new(first.lat, first.lon)
        }
        _ => parse_result::<GeocodeResult>(output.tool, &output.value)
            .map_err(|e| upstream(output.tool, &e))?
            .coordinates(),
    };
    valid(output.tool, coordinates)
}

/// Copy the step's params, filling each binding from completed outputs.
fn bind_params(step: &PlannedStep, completed: &[StepOutput]) -> Result<Value, TurnFailure> {
    let mut params = step.params.clone();
    for binding in &step.bindings {
        let source = output_at(completed, binding.from_step)?;
        let coordinates = step_coordinates(source)?;
        let slot = params.pointer_mut(&binding.pointer).ok_or_else(|| {
            upstream(
                step.tool,
                &ToolError::InvalidResponse(format!("no parameter at {}", binding.pointer)),
            )
        })?;
        *slot = coordinates_param(coordinates);
    }
    Ok(params)
}
