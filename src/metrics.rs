//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Relationship mutation metrics
    pub static ref FOLLOWS_TOTAL: IntCounter = IntCounter::new(
        "followgraph_follows_total",
        "Total number of follow edges created"
    ).expect("metric can be created");
    pub static ref UNFOLLOWS_TOTAL: IntCounter = IntCounter::new(
        "followgraph_unfollows_total",
        "Total number of follow edges removed"
    ).expect("metric can be created");
    pub static ref FOLLOW_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("followgraph_follow_rejections_total", "Total number of rejected follow attempts"),
        &["reason"]
    ).expect("metric can be created");

    // Cooldown metrics
    pub static ref COOLDOWN_PAIRS_ACTIVE: IntGauge = IntGauge::new(
        "followgraph_cooldown_pairs_active",
        "Current number of tracked cooldown pairs"
    ).expect("metric can be created");

    // Cache metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("followgraph_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("followgraph_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_SIZE: IntGauge = IntGauge::new(
        "followgraph_cache_size",
        "Current number of cached values"
    ).expect("metric can be created");
    pub static ref CACHE_INVALIDATIONS_TOTAL: IntCounter = IntCounter::new(
        "followgraph_cache_invalidations_total",
        "Total number of cache entries removed by tag invalidation"
    ).expect("metric can be created");

    // Suggestion metrics
    pub static ref SUGGESTIONS_COMPUTED_TOTAL: IntCounter = IntCounter::new(
        "followgraph_suggestions_computed_total",
        "Total number of suggestion lists computed (cache misses)"
    ).expect("metric can be created");

    // Event metrics
    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("followgraph_events_published_total", "Total number of relationship events published"),
        &["event_type"]
    ).expect("metric can be created");

    // Audit metrics
    pub static ref AUDIT_WRITE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "followgraph_audit_write_failures_total",
        "Total number of audit entries dropped on write failure"
    ).expect("metric can be created");

    // Reconciliation metrics
    pub static ref COUNTERS_RECONCILED_TOTAL: IntCounter = IntCounter::new(
        "followgraph_counters_reconciled_total",
        "Total number of account counter rows corrected by reconciliation"
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(FOLLOWS_TOTAL.clone()))
        .expect("FOLLOWS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(UNFOLLOWS_TOTAL.clone()))
        .expect("UNFOLLOWS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FOLLOW_REJECTIONS_TOTAL.clone()))
        .expect("FOLLOW_REJECTIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(COOLDOWN_PAIRS_ACTIVE.clone()))
        .expect("COOLDOWN_PAIRS_ACTIVE can be registered");
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .expect("CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .expect("CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_SIZE.clone()))
        .expect("CACHE_SIZE can be registered");
    REGISTRY
        .register(Box::new(CACHE_INVALIDATIONS_TOTAL.clone()))
        .expect("CACHE_INVALIDATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SUGGESTIONS_COMPUTED_TOTAL.clone()))
        .expect("SUGGESTIONS_COMPUTED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(EVENTS_PUBLISHED_TOTAL.clone()))
        .expect("EVENTS_PUBLISHED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(AUDIT_WRITE_FAILURES_TOTAL.clone()))
        .expect("AUDIT_WRITE_FAILURES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(COUNTERS_RECONCILED_TOTAL.clone()))
        .expect("COUNTERS_RECONCILED_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
