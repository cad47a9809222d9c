use serde_json::Value;

/// Coarse physical-plausibility bound for one numeric field, addressed by
/// JSON pointer (RFC 6901).
#[derive(Debug, Clone, PartialEq)]
pub struct PlausibilityRule {
    pub pointer: String,
    pub min: f64,
    pub max: f64,
    pub fallback: f64,
}

impl PlausibilityRule {
    pub fn new(pointer: impl Into<String>, min: f64, max: f64, fallback: f64) -> Self {
        Self {
            pointer: pointer.into(),
            min,
            max,
            fallback,
        }
    }

    pub fn accepts(&self, reading: f64) -> bool {
        reading.is_finite() && reading >= self.min && reading <= self.max
    }
}

/// Sanitizes freshly fetched payloads before they enter the cache.
///
/// Out-of-range readings are replaced by the rule's fallback instead of
/// discarding the whole fetch. Fields absent from the payload are left alone.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: Vec<PlausibilityRule>,
}

impl Validator {
    pub fn new(rules: Vec<PlausibilityRule>) -> Self {
        Self { rules }
    }

    pub fn sanitize(&self, key: &str, mut payload: Value) -> Value {
        for rule in &self.rules {
            let Some(field) = payload.pointer_mut(&rule.pointer) else {
                continue;
            };

            if field.as_f64().is_some_and(|reading| rule.accepts(reading)) {
                continue;
            }

            tracing::warn!(
                "Implausible reading for {} at {}: {}, replacing with {}",
                key,
                rule.pointer,
                field,
                rule.fallback
            );
            *field = Value::from(rule.fallback);
        }

        payload
    }
}
