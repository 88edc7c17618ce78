use std::fmt::Write as _;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    // Revisions
    pub revisions_materialized_total: AtomicU64,
    pub revisions_null_slots_total: AtomicU64,

    // Identity map
    pub identity_conflicts_total: AtomicU64,

    // Lazy operations
    pub lazy_evaluations_total: AtomicU64,

    // Deferred commands
    pub deferred_commands_total: AtomicU64,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

pub fn render_prometheus() -> String {
    let m = metrics();
    let counters = [
        ("revisions_materialized_total", &m.revisions_materialized_total),
        ("revisions_null_slots_total", &m.revisions_null_slots_total),
        ("identity_conflicts_total", &m.identity_conflicts_total),
        ("lazy_evaluations_total", &m.lazy_evaluations_total),
        ("deferred_commands_total", &m.deferred_commands_total),
    ];
    let mut s = String::new();
    for (name, counter) in counters {
        let _ = writeln!(
            s,
            "# TYPE {name} counter\n{name} {}",
            counter.load(Ordering::Relaxed)
        );
    }
    s
}
