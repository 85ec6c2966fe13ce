use std::future::Future;
use std::time::{Duration, Instant};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse};
use actix_web::{Error, HttpResponse};
use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, TextEncoder};

fn register<M: Collector + Clone + 'static>(metric: M) -> M {
    prometheus::default_registry()
        .register(Box::new(metric.clone()))
        .expect("relay metric registered twice");
    metric
}

fn counter(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    register(IntCounterVec::new(Opts::new(name, help), labels).expect("valid counter definition"))
}

/// Latency per route; the `_count` series doubles as the request total
static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register(
        HistogramVec::new(
            HistogramOpts::new(
                "notification_relay_http_request_duration_seconds",
                "Trigger surface request latency by route and status",
            )
            .buckets(vec![0.001, 0.005, 0.025, 0.1, 0.5, 2.5]),
            &["method", "route", "status"],
        )
        .expect("valid histogram definition"),
    )
});

static CONNECTED_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    register(
        IntGauge::new(
            "notification_relay_connected_clients",
            "Sessions currently present in the connection registry",
        )
        .expect("valid gauge definition"),
    )
});

static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter(
        "notification_relay_notifications_total",
        "Dispatch attempts by caller-visible status code",
        &["status"],
    )
});

static ACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter(
        "notification_relay_acks_total",
        "Client acknowledgments of pushed notifications by outcome",
        &["outcome"],
    )
});

static REGISTRATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter(
        "notification_relay_registrations_total",
        "Registration handshakes by outcome",
        &["outcome"],
    )
});

static STATUS_REPORTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter(
        "notification_relay_status_reports_total",
        "Client status reports sent to the status endpoint by result",
        &["reason", "result"],
    )
});

pub fn set_connected_clients(count: usize) {
    CONNECTED_CLIENTS.set(count as i64);
}

pub fn record_dispatch(status: u16) {
    NOTIFICATIONS_TOTAL
        .with_label_values(&[&status.to_string()])
        .inc();
}

pub fn record_ack(outcome: &str) {
    ACKS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_registration(outcome: &str) {
    REGISTRATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_status_report(reason: &str, result: &str) {
    STATUS_REPORTS_TOTAL
        .with_label_values(&[reason, result])
        .inc();
}

fn observe_http_request(method: &str, route: &str, status: u16, elapsed: Duration) {
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, route, &status.to_string()])
        .observe(elapsed.as_secs_f64());
}

/// Times one request through the app; install with `App::wrap_fn`.
///
/// Requests are labelled by route pattern, so `/socket?sessionID=...`
/// upgrades never create per-session series.
pub fn track_request<S, B>(
    req: ServiceRequest,
    srv: &S,
) -> impl Future<Output = Result<ServiceResponse<B>, Error>>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
{
    let method = req.method().to_string();
    let route = req
        .match_pattern()
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = srv.call(req);
    async move {
        let result = response.await;
        let status = match &result {
            Ok(res) => res.status().as_u16(),
            Err(_) => 500,
        };
        observe_http_request(&method, &route, status, start.elapsed());
        result
    }
}

/// GET /metrics
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(buffer),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_histogram_counts_requests() {
        let before = HTTP_REQUEST_DURATION_SECONDS
            .with_label_values(&["GET", "/health", "200"])
            .get_sample_count();

        observe_http_request("GET", "/health", 200, Duration::from_millis(3));

        let after = HTTP_REQUEST_DURATION_SECONDS
            .with_label_values(&["GET", "/health", "200"])
            .get_sample_count();
        assert_eq!(after, before + 1);
    }
}
