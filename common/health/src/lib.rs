use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;
use tracing::warn;

/// Health reporting for components of a service.
///
/// A worker process contains one or more asynchronous loops, and the
/// process can only be trusted with data if all of them are running and
/// reporting. Components register against a `HealthRegistry` with a
/// reporting deadline; the process is healthy only while every
/// component has reported healthy within its own deadline.
///
/// Liveness and readiness are deliberately not merged into one state:
/// give each probe its own registry instance.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Automatically set when a component is newly registered.
    Starting,
    /// Recently reported healthy, will need to report again before the date.
    HealthyUntil(OffsetDateTime),
    /// Reported unhealthy.
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_healthy(&self) -> bool {
        match self {
            ComponentStatus::HealthyUntil(until) => until.gt(&OffsetDateTime::now_utc()),
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct HealthStatus {
    /// The overall status: true if all components are healthy.
    pub healthy: bool,
    /// Current status of each registered component, for display.
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    /// Maps the overall health to an HTTP status code, printing each
    /// component status in the body for debugging.
    fn into_response(self) -> Response {
        let body = format!("{self:?}");
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

type ComponentMap = Arc<RwLock<HashMap<String, ComponentStatus>>>;

/// A handle held by a single component to report its own status.
#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: ComponentMap,
}

impl HealthHandle {
    /// Report as healthy until the component's deadline elapses. Must be
    /// called more frequently than the registered deadline.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().add(self.deadline),
        ))
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.write() {
            Ok(mut map) => {
                map.insert(self.component.clone(), status);
            }
            Err(err) => warn!(
                component = self.component,
                "failed to report health status: {}", err
            ),
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: ComponentMap,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    /// Register a new component. The returned handle must report healthy
    /// at least every `deadline` for the registry to stay healthy.
    pub fn register(&self, component: String, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component,
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Compute the aggregate status from the last-reported component states.
    pub fn get_status(&self) -> HealthStatus {
        let components = match self.components.read() {
            Ok(map) => map.clone(),
            Err(err) => {
                warn!(registry = self.name, "failed to read health status: {}", err);
                return HealthStatus::default();
            }
        };
        let healthy = !components.is_empty() && components.values().all(|c| c.is_healthy());
        HealthStatus {
            healthy,
            components,
        }
    }
}
