use crate::config::{load_school_policy, save_school_policy};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_required_str, with_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_policy_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let school_id = get_required_str(params, "schoolId")?;
        let policy = load_school_policy(conn, &school_id)?;
        Ok(json!({ "schoolId": school_id, "policy": policy }))
    })
}

fn handle_policy_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let school_id = get_required_str(params, "schoolId")?;
        let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
            return Err(HandlerErr::bad_params("patch must be an object"));
        };
        let mut policy = load_school_policy(conn, &school_id)?;
        policy.merge_patch(patch).map_err(HandlerErr::bad_params)?;
        save_school_policy(conn, &school_id, &policy).map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "settings" })),
        })?;
        tracing::info!(school_id = %school_id, "school policy updated");
        Ok(json!({ "schoolId": school_id, "policy": policy }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.policy.get" => Some(handle_policy_get(state, req)),
        "setup.policy.update" => Some(handle_policy_update(state, req)),
        _ => None,
    }
}
