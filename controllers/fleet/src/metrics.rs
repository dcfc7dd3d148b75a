//! Prometheus counters for reconcile outcomes, child writes and admission.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::ControllerError;

pub struct Metrics {
    registry: Registry,
    pub reconcile_total: IntCounterVec,
    pub turtles_created_total: IntCounter,
    pub stage_failures_total: IntCounterVec,
    pub child_writes_total: IntCounterVec,
    pub admission_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new("fleet_reconcile_total", "Reconcile passes by controller and result"),
            &["controller", "result"],
        )?;
        let turtles_created_total = IntCounter::new(
            "fleet_turtles_created_total",
            "Turtles created by fleet scaling",
        )?;
        let stage_failures_total = IntCounterVec::new(
            Opts::new("fleet_stage_failures_total", "Composition stage failures by stage"),
            &["stage"],
        )?;
        let child_writes_total = IntCounterVec::new(
            Opts::new("fleet_child_writes_total", "Child resource upserts by outcome"),
            &["outcome"],
        )?;
        let admission_total = IntCounterVec::new(
            Opts::new("fleet_admission_total", "Admission reviews by kind and verdict"),
            &["kind", "verdict"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(turtles_created_total.clone()))?;
        registry.register(Box::new(stage_failures_total.clone()))?;
        registry.register(Box::new(child_writes_total.clone()))?;
        registry.register(Box::new(admission_total.clone()))?;

        Ok(Metrics {
            registry,
            reconcile_total,
            turtles_created_total,
            stage_failures_total,
            child_writes_total,
            admission_total,
        })
    }

    pub fn reconciled(&self, controller: &str, result: &Result<(), ControllerError>) {
        let label = match result {
            Ok(()) => "success",
            Err(e) => e.kind(),
        };
        self.reconcile_total.with_label_values(&[controller, label]).inc();
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ControllerError::Internal(format!("metrics encoding: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| ControllerError::Internal(format!("metrics encoding: {e}")))
    }
}
