//! Webhook settlement instruments.
//!
//! Lazily bound to the global meter provider; before the binary installs
//! one they record into a no-op meter, which is what tests see.

use std::sync::LazyLock;

use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::{KeyValue, global};

static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("marketplace"));

/// Webhooks that produced a new ledger entry.
pub static WEBHOOK_SETTLED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("marketplace.webhook.settled")
        .with_description("Webhooks that recorded a payment or refund")
        .build()
});

/// Redeliveries absorbed as idempotent success.
pub static WEBHOOK_REDELIVERED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("marketplace.webhook.redelivered")
        .with_description("Webhook redeliveries answered without a write")
        .build()
});

/// Webhooks refused at the trust boundary or by a state rule.
pub static WEBHOOK_REJECTED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("marketplace.webhook.rejected")
        .with_description("Webhooks rejected before or during settlement")
        .build()
});

/// Conflicting second payments and orphaned seller identities.
pub static RECONCILIATION_ANOMALIES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("marketplace.reconciliation.anomalies")
        .with_description("Provider-side facts the ledger could not absorb")
        .build()
});

/// `event` label: `payment` or `refund`.
pub fn event_attr(event: &'static str) -> KeyValue {
    KeyValue::new("event", event)
}

/// `reason` label for rejections and anomalies.
pub fn reason_attr(reason: &'static str) -> KeyValue {
    KeyValue::new("reason", reason)
}
