//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Auth Metrics
    pub static ref SIGN_INS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authdemo_sign_ins_total", "Social sign-in attempts by provider and outcome"),
        &["provider", "status"]
    ).expect("metric can be created");
    pub static ref SIGN_OUTS_TOTAL: IntCounter = IntCounter::new(
        "authdemo_sign_outs_total",
        "Total number of sign-outs"
    ).expect("metric can be created");
    pub static ref SESSION_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authdemo_session_lookups_total", "Session reads by source"),
        &["source"]
    ).expect("metric can be created");
    pub static ref SESSIONS_PURGED_TOTAL: IntCounter = IntCounter::new(
        "authdemo_sessions_purged_total",
        "Expired sessions removed by the cleanup task"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authdemo_errors_total", "Total number of errors"),
        &["error_code"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; registration happens on the first call.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(SIGN_INS_TOTAL.clone()))
            .expect("SIGN_INS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SIGN_OUTS_TOTAL.clone()))
            .expect("SIGN_OUTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SESSION_LOOKUPS_TOTAL.clone()))
            .expect("SESSION_LOOKUPS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SESSIONS_PURGED_TOTAL.clone()))
            .expect("SESSIONS_PURGED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}
