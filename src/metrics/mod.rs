//! Metrics module
//!
//! Process-wide Prometheus counters, registered on first use and exposed by
//! the server at `GET /metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

use crate::error::{Error, Result};

pub static SLICES_PUSHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "provestor_slices_pushed_total",
        "Slice pushes by outcome",
        &["result"]
    )
    .expect("metric can be registered")
});

pub static SLICES_PULLED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "provestor_slices_pulled_total",
        "Slice pulls by outcome",
        &["result"]
    )
    .expect("metric can be registered")
});

pub static PUSH_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("provestor_push_retries_total", "Push retry attempts")
        .expect("metric can be registered")
});

pub static PUSH_RELOCATIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "provestor_push_relocations_total",
        "Slices re-encrypted for a different node after retries failed"
    )
    .expect("metric can be registered")
});

pub static CHALLENGES_REQUESTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "provestor_challenges_requested_total",
        "Challenge requests by algorithm",
        &["algorithm"]
    )
    .expect("metric can be registered")
});

pub static CHALLENGES_ANSWERED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "provestor_challenges_answered_total",
        "Challenge answers by resulting status",
        &["status"]
    )
    .expect("metric can be registered")
});

pub static MIGRATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "provestor_slice_migrations_total",
        "Slice migrations and expansions by outcome",
        &["kind", "result"]
    )
    .expect("metric can be registered")
});

pub static HEARTBEATS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "provestor_heartbeats_total",
        "Heartbeats sent by outcome",
        &["result"]
    )
    .expect("metric can be registered")
});

pub static SLICES_REAPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("provestor_slices_reaped_total", "Expired slices deleted")
        .expect("metric can be registered")
});

/// Label value for a `Result`.
pub fn outcome<T>(r: &Result<T>) -> &'static str {
    if r.is_ok() {
        "ok"
    } else {
        "error"
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> Result<(Vec<u8>, String)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| Error::internal(format!("failed to encode metrics: {}", e)))?;
    Ok((buffer, encoder.format_type().to_string()))
}
