use crate::sample::TelemetrySample;
use dyno_core::prelude::BenchResult;

/// A source of per-device telemetry.
///
/// Backends are created on the sampler thread and never leave it, so they need not be `Send`.
pub trait TelemetryBackend {
    /// Short name used in logs and the run manifest.
    fn name(&self) -> &'static str;

    /// Column layout of the rows this backend produces.
    fn header(&self) -> &'static [&'static str];

    /// Read every device once.
    ///
    /// Returning an error skips this tick. Metrics that fail individually should be filled in
    /// rather than failing the whole sample.
    fn sample(&mut self) -> BenchResult<Vec<TelemetrySample>>;
}

/// Creates the backend on the sampler thread.
pub type BackendFactory = Box<dyn FnOnce() -> Box<dyn TelemetryBackend> + Send>;

/// Try the primary backend, switching to the fallback for good if it cannot be initialised.
pub fn choose_backend<P, F>(primary: P, fallback: F) -> Box<dyn TelemetryBackend>
where
    P: FnOnce() -> BenchResult<Box<dyn TelemetryBackend>>,
    F: FnOnce() -> Box<dyn TelemetryBackend>,
{
    match primary() {
        Ok(backend) => {
            log::info!("Collecting telemetry with {}", backend.name());
            backend
        }
        Err(e) => {
            let backend = fallback();
            log::warn!("{e}, collecting telemetry with {} instead", backend.name());
            backend
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{FALLBACK_HEADER, PRIMARY_HEADER};
    use dyno_core::prelude::BenchError;

    struct Named(&'static str, &'static [&'static str]);

    impl TelemetryBackend for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn header(&self) -> &'static [&'static str] {
            self.1
        }

        fn sample(&mut self) -> BenchResult<Vec<TelemetrySample>> {
            Ok(vec![TelemetrySample::now(0)])
        }
    }

    #[test]
    fn keeps_primary_when_available() {
        let backend = choose_backend(
            || Ok(Box::new(Named("primary", &PRIMARY_HEADER)) as Box<dyn TelemetryBackend>),
            || panic!("fallback must not be built"),
        );

        assert_eq!(backend.name(), "primary");
    }

    #[test]
    fn switches_to_fallback_when_primary_is_unavailable() {
        let backend = choose_backend(
            || {
                Err(BenchError::BackendUnavailable {
                    backend: "primary",
                    cause: "no driver".to_string(),
                })
            },
            || Box::new(Named("fallback", &FALLBACK_HEADER)),
        );

        assert_eq!(backend.name(), "fallback");
        assert_eq!(backend.header().len(), FALLBACK_HEADER.len());
    }
}
