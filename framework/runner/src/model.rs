use std::time::Duration;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A model selected for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelUnderTest {
    pub name: String,
    pub size_bytes: Option<u64>,
    /// How long the runtime is expected to need to load the model
    pub load_estimate: Duration,
}

impl ModelUnderTest {
    pub fn new(name: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            load_estimate: estimate_load_time(size_bytes),
        }
    }
}

/// Ten seconds plus eight per GiB, never less than fifteen. Thirty when the size is unknown.
pub fn estimate_load_time(size_bytes: Option<u64>) -> Duration {
    match size_bytes {
        Some(bytes) if bytes > 0 => {
            let gib = bytes as f64 / BYTES_PER_GIB;
            let seconds = (10.0 + gib * 8.0).floor() as u64;
            Duration::from_secs(seconds.max(15))
        }
        _ => Duration::from_secs(30),
    }
}

/// Whether two model references name the same model, treating a missing tag as `latest`.
pub fn same_model(a: &str, b: &str) -> bool {
    fn normalise(name: &str) -> (&str, &str) {
        name.split_once(':').unwrap_or((name, "latest"))
    }

    normalise(a.trim()) == normalise(b.trim())
}
