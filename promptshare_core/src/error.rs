use thiserror::Error;

/// A non-success response from one of the remote collaborators, kept typed so
/// [`classify`] can inspect the status without parsing messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an empty response")]
    EmptyResponse { service: &'static str },

    #[error("generation attempt timed out after {secs}s")]
    TimedOut { secs: u64 },
}

/// How a failed remote call should be treated by retry and rollback logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Credential missing or rejected. Retrying with another model is pointless.
    FatalAuth,
    /// Overloaded, unavailable, unknown model, quota.
    Transient,
    Unknown,
}

impl FailureClass {
    /// Only authentication failures stop a fallback loop; unknown failures keep
    /// trying the remaining candidates.
    pub fn is_fatal(self) -> bool {
        matches!(self, FailureClass::FatalAuth)
    }
}

const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "forbidden",
    "invalid api key",
    "api key not valid",
    "invalid_api_key",
    "invalid credential",
    "permission denied",
    "permission_denied",
];

const TRANSIENT_MARKERS: &[&str] = &[
    "overloaded",
    "unavailable",
    "not found",
    "not_found",
    "quota",
    "rate limit",
    "resource_exhausted",
    "timed out",
    "timeout",
];

fn classify_status(status: u16) -> FailureClass {
    match status {
        401 | 403 => FailureClass::FatalAuth,
        404 | 408 | 429 | 500..=599 => FailureClass::Transient,
        _ => FailureClass::Unknown,
    }
}

/// Maps an error chain onto a [`FailureClass`]. Typed statuses win over
/// message markers; auth markers win over transient ones.
pub fn classify(err: &anyhow::Error) -> FailureClass {
    for cause in err.chain() {
        if let Some(service) = cause.downcast_ref::<ServiceError>() {
            match service {
                ServiceError::Status { status, .. } => {
                    let class = classify_status(*status);
                    if class != FailureClass::Unknown {
                        return class;
                    }
                }
                ServiceError::TimedOut { .. } => return FailureClass::Transient,
                ServiceError::EmptyResponse { .. } => {}
            }
        }
        if let Some(status) = cause
            .downcast_ref::<reqwest::Error>()
            .and_then(|e| e.status())
        {
            let class = classify_status(status.as_u16());
            if class != FailureClass::Unknown {
                return class;
            }
        }
    }

    let message = format!("{err:#}").to_lowercase();
    if AUTH_MARKERS.iter().any(|marker| message.contains(marker)) {
        FailureClass::FatalAuth
    } else if TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker)) {
        FailureClass::Transient
    } else {
        FailureClass::Unknown
    }
}
