use axum::{routing::get, Router};
use oracle_common::health::HealthRegistry;
use oracle_common::metrics::setup_metrics_router;

/// Builds the combined metrics + health router served on `metrics.bind`.
pub fn app(liveness: HealthRegistry, readiness: HealthRegistry) -> Router {
    setup_metrics_router()
        .route(
            "/_liveness",
            get(move || {
                let liveness = liveness.clone();
                async move { liveness.get_status() }
            }),
        )
        .route(
            "/_readiness",
            get(move || {
                let readiness = readiness.clone();
                async move { readiness.get_status() }
            }),
        )
}
