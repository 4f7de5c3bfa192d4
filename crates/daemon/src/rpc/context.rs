// Per-request context: a trace id plus the calling user, when the params name one.
//
// The trace id comes from `trace_id` at the top level or in `params`, else a
// fresh uuid. Both values ride a task-local for the life of the request so
// storage failures can be tied back to who asked and under which trace.

use std::future::Future;

use serde_json::Value;
use uuid::Uuid;

tokio::task_local! {
    static CONTEXT: RequestContext;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub trace_id: String,
    pub user: Option<String>,
}

impl RequestContext {
    /// Best-effort read of an undecoded request. Garbage still gets a trace id.
    pub fn from_raw(raw: &[u8]) -> Self {
        let value = serde_json::from_slice::<Value>(raw).unwrap_or(Value::Null);
        let params = value.get("params");
        let trace_id = non_blank(value.get("trace_id"))
            .or_else(|| non_blank(params.and_then(|p| p.get("trace_id"))))
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let user = non_blank(params.and_then(|p| p.get("user")));
        Self { trace_id, user }
    }

    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CONTEXT.scope(self, future).await
    }

    pub fn current() -> Option<Self> {
        CONTEXT.try_with(Clone::clone).ok()
    }
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_owned())
}
