use std::sync::Arc;

use labnote_common::protocol::jsonrpc::{
    is_supported_protocol_version, Request, RequestId, Response, RpcError, ACCESS_DENIED,
    DOCUMENT_ALREADY_EDITED, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    NOT_FOUND, OPERATION_IN_PROGRESS, PARSE_ERROR, SUPPORTED_PROTOCOL_VERSIONS, VALIDATION_FAILED,
};
use labnote_common::protocol::rpc_methods::{
    AUTOSAVE_CANCEL, AUTOSAVE_FIELD, AUTOSAVE_LIST, DAEMON_SHUTDOWN, RECORD_CHANGES_SINCE,
    RECORD_CREATE, RECORD_DELETE, RECORD_EDIT, RECORD_GRANT, RECORD_REVOKE, RECORD_SAVE,
    RECORD_UNLOCK, RECORD_VIEW, RPC_PING, SESSION_HEARTBEAT, SESSION_LOGIN, SESSION_LOGOUT,
};
use labnote_common::types::{FieldId, ModificationDate, Permission, RecordId};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::editing::EditingService;
use crate::error::EditError;
use crate::rpc::context::RequestContext;
use crate::store::records::NewField;
use crate::workspace::WorkspaceService;

// ── State ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RpcServerState {
    editing: Arc<EditingService>,
    workspace: Arc<WorkspaceService>,
    shutdown_notifier: Option<broadcast::Sender<()>>,
}

impl RpcServerState {
    pub fn new(editing: Arc<EditingService>, workspace: Arc<WorkspaceService>) -> Self {
        Self { editing, workspace, shutdown_notifier: None }
    }

    pub fn with_shutdown_notifier(mut self, shutdown_notifier: broadcast::Sender<()>) -> Self {
        self.shutdown_notifier = Some(shutdown_notifier);
        self
    }

}

// ── Params ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoginParams {
    user: String,
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    session_id: String,
    user: String,
}

#[derive(Debug, Deserialize)]
struct CreateRecordParams {
    user: String,
    name: String,
    #[serde(default)]
    parent_id: Option<RecordId>,
    #[serde(default)]
    fields: Vec<NewField>,
}

#[derive(Debug, Deserialize)]
struct GrantParams {
    record_id: RecordId,
    user: String,
    grantee: String,
    permission: Permission,
}

#[derive(Debug, Deserialize)]
struct RecordParams {
    record_id: RecordId,
    user: String,
}

#[derive(Debug, Deserialize)]
struct SaveParams {
    record_id: RecordId,
    user: String,
    #[serde(default)]
    release_lock: bool,
    #[serde(default)]
    baseline: Option<ModificationDate>,
}

#[derive(Debug, Deserialize)]
struct ChangesSinceParams {
    record_id: RecordId,
    user: String,
    modification_date: ModificationDate,
}

#[derive(Debug, Deserialize)]
struct AutosaveFieldParams {
    field_id: FieldId,
    user: String,
    content: String,
}

// ── Entry points ────────────────────────────────────────────────────

pub async fn handle_raw_request(raw: &[u8], state: &RpcServerState) -> Response {
    RequestContext::from_raw(raw).scope(async {
        let request = match serde_json::from_slice::<Request>(raw) {
            Ok(request) => request,
            Err(error) => {
                return Response::error(
                    RequestId::Null,
                    RpcError::new(PARSE_ERROR, "Parse error")
                        .with_data(json!({ "reason": error.to_string() })),
                );
            }
        };

        if request.jsonrpc != "2.0" {
            return Response::error(request.id, RpcError::new(INVALID_REQUEST, "Invalid Request"));
        }

        if let Some(version) = request.protocol_version.as_deref() {
            if !is_supported_protocol_version(version) {
                return Response::error(
                    request.id,
                    RpcError::new(INVALID_REQUEST, "Unsupported protocol version").with_data(
                        json!({ "requested": version, "supported": SUPPORTED_PROTOCOL_VERSIONS }),
                    ),
                );
            }
        }

        dispatch_request(request, state).await
    })
    .await
}

pub async fn dispatch_request(request: Request, state: &RpcServerState) -> Response {
    let context = RequestContext::current();
    debug!(
        method = %request.method,
        trace_id = context.as_ref().map_or("", |c| c.trace_id.as_str()),
        "rpc request"
    );

    match request.method.as_str() {
        RPC_PING => Response::success(request.id, json!({ "ok": true })),
        DAEMON_SHUTDOWN => {
            if let Some(notifier) = &state.shutdown_notifier {
                let _ = notifier.send(());
            }
            Response::success(request.id, json!({ "ok": true }))
        }
        SESSION_LOGIN => handle_session_login(request, state),
        SESSION_HEARTBEAT => handle_session_heartbeat(request, state),
        SESSION_LOGOUT => handle_session_logout(request, state),
        RECORD_CREATE => handle_record_create(request, state),
        RECORD_GRANT => handle_record_grant(request, state),
        RECORD_REVOKE => handle_record_revoke(request, state),
        RECORD_VIEW => handle_record_view(request, state),
        RECORD_EDIT => handle_record_edit(request, state),
        RECORD_SAVE => handle_record_save(request, state),
        RECORD_UNLOCK => handle_record_unlock(request, state),
        RECORD_DELETE => handle_record_delete(request, state),
        RECORD_CHANGES_SINCE => handle_record_changes_since(request, state),
        AUTOSAVE_FIELD => handle_autosave_field(request, state),
        AUTOSAVE_LIST => handle_autosave_list(request, state),
        AUTOSAVE_CANCEL => handle_autosave_cancel(request, state),
        _ => Response::error(request.id, RpcError::new(METHOD_NOT_FOUND, "Method not found")),
    }
}

// ── Session and workspace handlers ──────────────────────────────────

fn handle_session_login(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<LoginParams>(SESSION_LOGIN, request.params, request.id.clone())
    {
        Ok(params) => params,
        Err(response) => return response,
    };
    if params.user.trim().is_empty() {
        return invalid_params_response(request.id, "user must not be empty".to_string());
    }

    respond(request.id, state.workspace.login(&params.user))
}

fn handle_session_heartbeat(request: Request, state: &RpcServerState) -> Response {
    let params =
        match parse_params::<SessionParams>(SESSION_HEARTBEAT, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    respond(request.id, state.workspace.heartbeat(&params.session_id, &params.user))
}

fn handle_session_logout(request: Request, state: &RpcServerState) -> Response {
    let params =
        match parse_params::<SessionParams>(SESSION_LOGOUT, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    respond(request.id, state.workspace.logout(&params.session_id, &params.user))
}

fn handle_record_create(request: Request, state: &RpcServerState) -> Response {
    let params =
        match parse_params::<CreateRecordParams>(RECORD_CREATE, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };
    if params.name.trim().is_empty() {
        return invalid_params_response(request.id, "name must not be empty".to_string());
    }

    respond(
        request.id,
        state.workspace.create_record(&params.user, params.name, params.parent_id, params.fields),
    )
}

fn handle_record_grant(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<GrantParams>(RECORD_GRANT, request.params, request.id.clone())
    {
        Ok(params) => params,
        Err(response) => return response,
    };

    respond(
        request.id,
        state.workspace.grant(params.record_id, &params.user, &params.grantee, params.permission),
    )
}

fn handle_record_revoke(request: Request, state: &RpcServerState) -> Response {
    let params =
        match parse_params::<GrantParams>(RECORD_REVOKE, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    respond(
        request.id,
        state.workspace.revoke(params.record_id, &params.user, &params.grantee, params.permission),
    )
}

// ── Editing handlers ────────────────────────────────────────────────

fn handle_record_view(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<RecordParams>(RECORD_VIEW, request.params, request.id.clone())
    {
        Ok(params) => params,
        Err(response) => return response,
    };

    respond(request.id, state.editing.request_view(params.record_id, &params.user))
}

fn handle_record_edit(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<RecordParams>(RECORD_EDIT, request.params, request.id.clone())
    {
        Ok(params) => params,
        Err(response) => return response,
    };

    respond(request.id, state.editing.request_edit(params.record_id, &params.user))
}

fn handle_record_save(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<SaveParams>(RECORD_SAVE, request.params, request.id.clone()) {
        Ok(params) => params,
        Err(response) => return response,
    };

    respond(
        request.id,
        state.editing.save(params.record_id, &params.user, params.release_lock, params.baseline),
    )
}

fn handle_record_unlock(request: Request, state: &RpcServerState) -> Response {
    let params =
        match parse_params::<RecordParams>(RECORD_UNLOCK, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    Response::success(request.id, json!(state.editing.unlock(params.record_id, &params.user)))
}

fn handle_record_delete(request: Request, state: &RpcServerState) -> Response {
    let params =
        match parse_params::<RecordParams>(RECORD_DELETE, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    respond(request.id, state.editing.delete_record(params.record_id, &params.user))
}

fn handle_record_changes_since(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<ChangesSinceParams>(
        RECORD_CHANGES_SINCE,
        request.params,
        request.id.clone(),
    ) {
        Ok(params) => params,
        Err(response) => return response,
    };

    respond(
        request.id,
        state.editing.changes_since(params.record_id, &params.user, params.modification_date),
    )
}

fn handle_autosave_field(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<AutosaveFieldParams>(
        AUTOSAVE_FIELD,
        request.params,
        request.id.clone(),
    ) {
        Ok(params) => params,
        Err(response) => return response,
    };

    respond(
        request.id,
        state
            .editing
            .autosave_field(params.field_id, params.content, &params.user)
            .map(|()| json!({ "ok": true })),
    )
}

fn handle_autosave_list(request: Request, state: &RpcServerState) -> Response {
    let params =
        match parse_params::<RecordParams>(AUTOSAVE_LIST, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    respond(request.id, state.editing.get_autosaved_fields(params.record_id, &params.user))
}

fn handle_autosave_cancel(request: Request, state: &RpcServerState) -> Response {
    let params =
        match parse_params::<RecordParams>(AUTOSAVE_CANCEL, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    respond(
        request.id,
        state
            .editing
            .cancel_autosave(params.record_id, &params.user)
            .map(|navigation| json!({ "navigation": navigation })),
    )
}

// ── Helpers ─────────────────────────────────────────────────────────

fn parse_params<T: DeserializeOwned>(
    method: &str,
    params: Option<serde_json::Value>,
    request_id: RequestId,
) -> Result<T, Response> {
    let Some(params) = params else {
        return Err(invalid_params_response(request_id, format!("{method} requires params")));
    };

    serde_json::from_value::<T>(params).map_err(|error| {
        invalid_params_response(request_id, format!("failed to decode {method} params: {error}"))
    })
}

fn respond<T: serde::Serialize>(request_id: RequestId, result: Result<T, EditError>) -> Response {
    match result {
        Ok(value) => Response::success(request_id, json!(value)),
        Err(error) => Response::error(request_id, edit_error_to_rpc(&error)),
    }
}

/// Map an editing failure onto its wire error code.
pub fn edit_error_to_rpc(error: &EditError) -> RpcError {
    match error {
        EditError::Validation(validation) => RpcError::new(VALIDATION_FAILED, error.to_string())
            .with_data(json!({ "field_id": validation.field_id, "reason": validation.reason })),
        EditError::AccessDenied { record_id, .. } => {
            RpcError::new(ACCESS_DENIED, error.to_string()).with_data(json!({ "record_id": record_id }))
        }
        EditError::NotLockHolder { record_id, holder, .. } => RpcError::new(ACCESS_DENIED, error.to_string())
            .with_data(json!({ "record_id": record_id, "holder": holder })),
        EditError::DocumentAlreadyEdited { record_id, baseline, current } => {
            RpcError::new(DOCUMENT_ALREADY_EDITED, error.to_string()).with_data(json!({
                "record_id": record_id,
                "baseline": baseline,
                "current": current,
            }))
        }
        EditError::NotEditable { record_id } => RpcError::new(ACCESS_DENIED, error.to_string())
            .with_data(json!({ "record_id": record_id, "status": "CAN_NEVER_EDIT" })),
        EditError::OperationInProgress { record_id } => {
            RpcError::new(OPERATION_IN_PROGRESS, error.to_string())
                .with_data(json!({ "record_id": record_id }))
        }
        EditError::RecordNotFound(record_id) => {
            RpcError::new(NOT_FOUND, error.to_string()).with_data(json!({ "record_id": record_id }))
        }
        EditError::FieldNotFound(field_id) => {
            RpcError::new(NOT_FOUND, error.to_string()).with_data(json!({ "field_id": field_id }))
        }
        EditError::Storage(source) => {
            let context = RequestContext::current();
            let trace_id = context.as_ref().map(|c| c.trace_id.as_str());
            let user = context.as_ref().and_then(|c| c.user.as_deref());
            error!(
                error = ?source,
                trace_id = trace_id.unwrap_or(""),
                user = user.unwrap_or(""),
                "storage failure"
            );
            RpcError::new(INTERNAL_ERROR, "Internal error").with_data(json!({ "trace_id": trace_id }))
        }
    }
}

fn invalid_params_response(request_id: RequestId, reason: String) -> Response {
    Response::error(
        request_id,
        RpcError::new(INVALID_PARAMS, "Invalid params").with_data(json!({ "reason": reason })),
    )
}
