// DANS : src/monitoring/logging.rs
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Installe le subscriber global. Le filtre vient de `RUST_LOG` ("info" par défaut).
/// Sans effet si un subscriber est déjà en place (tests, double appel).
pub fn setup_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true);

    // Le JSON pour la prod (agrégateurs de logs), le format lisible en local.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
