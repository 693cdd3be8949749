use std::fmt;
use std::sync::Mutex;

use reqwest::StatusCode;
use smugmug_core::SmugError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Network,
    RateLimited,
    NotFound,
    NameCollision,
    TypeMismatch,
    MixedContent,
    PayloadTooLarge,
    LocalIo,
    Canceled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Network => "network",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::NotFound => "not-found",
            ErrorKind::NameCollision => "name-collision",
            ErrorKind::TypeMismatch => "type-mismatch",
            ErrorKind::MixedContent => "mixed-content",
            ErrorKind::PayloadTooLarge => "payload-too-large",
            ErrorKind::LocalIo => "local-io",
            ErrorKind::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub path: String,
    pub kind: ErrorKind,
    pub detail: String,
}

impl TaskFailure {
    pub fn new(path: impl Into<String>, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            detail: detail.into(),
        }
    }
}

/// Run-wide failure collector. Failures never abort sibling tasks; the
/// process exit status reflects whether the report stayed empty.
#[derive(Debug, Default)]
pub struct RunReport {
    failures: Mutex<Vec<TaskFailure>>,
}

impl RunReport {
    pub fn record(&self, failure: TaskFailure) {
        eprintln!(
            "{}: {}: {}",
            failure.path, failure.kind, failure.detail
        );
        self.failures
            .lock()
            .expect("report mutex poisoned")
            .push(failure);
    }

    pub fn is_clean(&self) -> bool {
        self.failures
            .lock()
            .expect("report mutex poisoned")
            .is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.lock().expect("report mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_clean()
    }

    pub fn failures(&self) -> Vec<TaskFailure> {
        self.failures
            .lock()
            .expect("report mutex poisoned")
            .clone()
    }
}

/// Maps a client error onto the user-facing failure taxonomy. Network and
/// rate-limit conditions only reach here once the client's retry budget is
/// exhausted.
pub fn kind_for_api(err: &SmugError) -> ErrorKind {
    match err.status() {
        Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => ErrorKind::Auth,
        Some(StatusCode::TOO_MANY_REQUESTS) => ErrorKind::RateLimited,
        Some(StatusCode::NOT_FOUND) => ErrorKind::NotFound,
        Some(StatusCode::CONFLICT) => ErrorKind::NameCollision,
        Some(StatusCode::PAYLOAD_TOO_LARGE) => ErrorKind::PayloadTooLarge,
        Some(status) if status.is_server_error() => ErrorKind::Network,
        Some(_) => ErrorKind::Network,
        None => match err {
            SmugError::Io(_) => ErrorKind::LocalIo,
            _ => ErrorKind::Network,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_failures() {
        let report = RunReport::default();
        assert!(report.is_clean());
        report.record(TaskFailure::new(
            "/photos/a.jpg",
            ErrorKind::MixedContent,
            "directory holds both files and folders",
        ));
        assert!(!report.is_clean());
        assert_eq!(report.len(), 1);
        assert_eq!(report.failures()[0].kind, ErrorKind::MixedContent);
    }

    #[test]
    fn api_errors_map_to_kinds() {
        let err = SmugError::Api {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };
        assert_eq!(kind_for_api(&err), ErrorKind::NotFound);

        let err = SmugError::Api {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            body: String::new(),
        };
        assert_eq!(kind_for_api(&err), ErrorKind::PayloadTooLarge);

        let err = SmugError::Api {
            status: StatusCode::CONFLICT,
            body: String::new(),
        };
        assert_eq!(kind_for_api(&err), ErrorKind::NameCollision);
    }
}
