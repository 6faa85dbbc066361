//! Routers pick the next node for conditional edges.

use relaygraph_core::State;

/// Output of a router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// One of the router's declared labels (checked against the edge mapping).
    Label(String),
    /// The terminal marker.
    End,
}

impl Route {
    pub fn label(label: impl Into<String>) -> Self {
        Route::Label(label.into())
    }
}

/// Maps the merged state to a route.
///
/// `labels` declares every label `route` can return; the graph builder
/// requires a mapping entry for each of them.
pub trait Router: Send + Sync {
    fn labels(&self) -> Vec<String>;

    fn route(&self, state: &State) -> Route;
}

/// Router backed by a closure and an explicit label list.
pub struct FnRouter<F> {
    labels: Vec<String>,
    f: F,
}

pub fn router_fn<I, S, F>(labels: I, f: F) -> FnRouter<F>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    F: Fn(&State) -> Route + Send + Sync,
{
    FnRouter {
        labels: labels.into_iter().map(Into::into).collect(),
        f,
    }
}

impl<F> Router for FnRouter<F>
where
    F: Fn(&State) -> Route + Send + Sync,
{
    fn labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    fn route(&self, state: &State) -> Route {
        (self.f)(state)
    }
}

/// Routes on the value of a text field, such as a `next_node` field written
/// by a supervisor.
///
/// When the field equals the configured end value the route is terminal.
/// A missing or non-text field yields an empty label, which no mapping
/// contains, so the run stops with a routing error.
#[derive(Debug, Clone)]
pub struct FieldRouter {
    field: String,
    labels: Vec<String>,
    end_value: Option<String>,
}

impl FieldRouter {
    pub fn new<I, S>(field: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            labels: labels.into_iter().map(Into::into).collect(),
            end_value: None,
        }
    }

    pub fn with_end_value(mut self, value: impl Into<String>) -> Self {
        self.end_value = Some(value.into());
        self
    }
}

impl Router for FieldRouter {
    fn labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    fn route(&self, state: &State) -> Route {
        let value = state.get_str(&self.field).unwrap_or_default();
        if self.end_value.as_deref() == Some(value) {
            Route::End
        } else {
            Route::label(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_router() {
        let router = FieldRouter::new("next_node", ["supervisor", "call_market_research"])
            .with_end_value("end");

        let state = State::new().with_field("next_node", "call_market_research");
        assert_eq!(router.route(&state), Route::label("call_market_research"));

        let state = State::new().with_field("next_node", "end");
        assert_eq!(router.route(&state), Route::End);

        assert_eq!(router.route(&State::new()), Route::label(""));
        assert_eq!(router.labels().len(), 2);
    }

    #[test]
    fn test_fn_router() {
        let router = router_fn(["feedback_collection"], |state: &State| {
            if state.get_bool("feedback_needed").unwrap_or(false) {
                Route::label("feedback_collection")
            } else {
                Route::End
            }
        });
        assert_eq!(router.route(&State::new()), Route::End);
        assert_eq!(
            router.route(&State::new().with_field("feedback_needed", true)),
            Route::label("feedback_collection")
        );
    }
}
