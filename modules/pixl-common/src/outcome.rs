use std::fmt;

/// The error taxonomy from the error-handling design: every adapter-level
/// failure is translated into one of these kinds before it reaches the
/// coordinator or the anonymisation engine. Only the taxonomy is acted on
/// upstream — no transport-specific error ever leaks past an adapter.
#[derive(Debug)]
pub enum PixlOutcome {
    /// Transient upstream condition: negative-ack with requeue.
    Requeue(String),
    /// The study can never be processed: positive-ack, log, move on.
    Discard(String),
    /// Upload attempted for an already-exported image: treated as success.
    AlreadyExported,
    /// Missing project config or unknown tag-scheme op: fatal to the task.
    Configuration(String),
    /// Contract violation: fatal to the task, message is NOT acked.
    Programmer(String),
}

impl fmt::Display for PixlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixlOutcome::Requeue(m) => write!(f, "requeue: {m}"),
            PixlOutcome::Discard(m) => write!(f, "discard: {m}"),
            PixlOutcome::AlreadyExported => write!(f, "already exported"),
            PixlOutcome::Configuration(m) => write!(f, "configuration error: {m}"),
            PixlOutcome::Programmer(m) => write!(f, "programmer error: {m}"),
        }
    }
}

impl std::error::Error for PixlOutcome {}

impl PixlOutcome {
    /// Whether the consumer should positive-ack the message (the study will
    /// never be retried by redelivery of this message).
    pub fn should_ack(&self) -> bool {
        matches!(
            self,
            PixlOutcome::Discard(_) | PixlOutcome::AlreadyExported
        )
    }

    /// Whether the consumer should negative-ack with requeue.
    pub fn should_requeue(&self) -> bool {
        matches!(self, PixlOutcome::Requeue(_))
    }
}

/// Tracks unknown-error occurrences per study key so that the consumer loop
/// can apply the escalation policy from the error-handling design: Requeue
/// on first occurrence, Discard after `threshold` occurrences.
#[derive(Debug, Clone)]
pub struct UnknownErrorPolicy {
    threshold: u32,
}

impl Default for UnknownErrorPolicy {
    fn default() -> Self {
        Self { threshold: 3 }
    }
}

impl UnknownErrorPolicy {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    /// Classify an unrecognised error given how many times this study has
    /// already hit one.
    pub fn classify(&self, prior_occurrences: u32, message: &str) -> PixlOutcome {
        if prior_occurrences + 1 >= self.threshold {
            PixlOutcome::Discard(format!(
                "unknown error after {} occurrences: {message}",
                prior_occurrences + 1
            ))
        } else {
            PixlOutcome::Requeue(message.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_to_discard_after_threshold() {
        let policy = UnknownErrorPolicy::new(3);
        assert!(matches!(
            policy.classify(0, "boom"),
            PixlOutcome::Requeue(_)
        ));
        assert!(matches!(
            policy.classify(1, "boom"),
            PixlOutcome::Requeue(_)
        ));
        assert!(matches!(
            policy.classify(2, "boom"),
            PixlOutcome::Discard(_)
        ));
    }
}
