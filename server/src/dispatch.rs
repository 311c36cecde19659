// Request dispatch
// Maps operation names onto engine calls and shapes the results back into
// JSON. The caller holds the engine lock for the whole request.

use crate::protocol::{i64_param, str_param, u64_param, Request, Response};
use log::debug;
use omnifs_core::{error_message, OmniError, Role};
use omnifs_engine::OmniFs;
use serde_json::{json, Value};

pub fn handle_request(fs: &mut OmniFs, request: &Request) -> Response {
    debug!("dispatching '{}'", request.operation);
    match perform(fs, request) {
        Ok(data) => Response::success(data),
        Err(e) => Response::error(&e),
    }
}

fn perform(fs: &mut OmniFs, request: &Request) -> Result<Value, OmniError> {
    let params = &request.parameters;
    let token = request.session_id.as_str();

    match request.operation.as_str() {
        "user_login" => {
            let username = str_param(params, "username")?;
            let password = str_param(params, "password")?;
            let session_id = fs.user_login(username, password)?;
            Ok(json!({ "session_id": session_id }))
        }
        "user_logout" => {
            fs.user_logout(token)?;
            Ok(json!({}))
        }
        "user_create" => {
            let username = str_param(params, "username")?;
            let password = str_param(params, "password")?;
            let role = role_param(params)?;
            fs.user_create(token, username, password, role)?;
            Ok(json!({}))
        }
        "user_delete" => {
            let username = str_param(params, "username")?;
            fs.user_delete(token, username)?;
            Ok(json!({}))
        }
        "user_list" => {
            let users = fs.user_list(token)?;
            Ok(json!({ "users": users }))
        }
        "get_session_info" => {
            let info = fs.get_session_info(token)?;
            Ok(json!({
                "username": info.username,
                "role": info.role.name(),
                "user_id": info.user_id,
                "login_time": info.login_time,
            }))
        }
        "dir_create" => {
            fs.dir_create(token, str_param(params, "path")?)?;
            Ok(json!({}))
        }
        "dir_list" => {
            let entries = fs.dir_list(token, str_param(params, "path")?)?;
            let entries: Vec<Value> = entries
                .into_iter()
                .map(|e| {
                    json!({
                        "name": e.name,
                        "is_directory": e.is_directory,
                        "size": e.size,
                    })
                })
                .collect();
            Ok(json!({ "entries": entries }))
        }
        "dir_delete" => {
            fs.dir_delete(token, str_param(params, "path")?)?;
            Ok(json!({}))
        }
        "dir_exists" => {
            let exists = fs.dir_exists(token, str_param(params, "path")?)?;
            Ok(json!({ "exists": exists }))
        }
        "file_create" => {
            let path = str_param(params, "path")?;
            let data = str_param(params, "data")?;
            fs.file_create(token, path, data.as_bytes())?;
            Ok(json!({}))
        }
        "file_read" => {
            let content = fs.file_read(token, str_param(params, "path")?)?;
            Ok(json!({ "content": String::from_utf8_lossy(&content) }))
        }
        "file_edit" => {
            let path = str_param(params, "path")?;
            let data = str_param(params, "data")?;
            let index = u64_param(params, "index")?;
            fs.file_edit(token, path, data.as_bytes(), index)?;
            Ok(json!({}))
        }
        "file_delete" => {
            fs.file_delete(token, str_param(params, "path")?)?;
            Ok(json!({}))
        }
        "file_truncate" => {
            fs.file_truncate(token, str_param(params, "path")?)?;
            Ok(json!({}))
        }
        "file_exists" => {
            let exists = fs.file_exists(token, str_param(params, "path")?)?;
            Ok(json!({ "exists": exists }))
        }
        "file_rename" => {
            let old_path = str_param(params, "old_path")?;
            let new_path = str_param(params, "new_path")?;
            fs.file_rename(token, old_path, new_path)?;
            Ok(json!({}))
        }
        "get_metadata" => {
            let meta = fs.get_metadata(token, str_param(params, "path")?)?;
            Ok(json!({
                "name": meta.name,
                "is_directory": meta.is_directory,
                "size": meta.size,
                "owner_id": meta.owner_id,
                "permissions": meta.permissions,
                "created": meta.created,
                "modified": meta.modified,
            }))
        }
        "set_permissions" => {
            let path = str_param(params, "path")?;
            let permissions = u64_param(params, "permissions")? as u32;
            fs.set_permissions(token, path, permissions)?;
            Ok(json!({}))
        }
        "get_stats" => {
            let stats = fs.get_stats(token)?;
            Ok(json!({
                "total_size": stats.total_size,
                "used_space": stats.used_space,
                "free_space": stats.free_space,
                "file_count": stats.file_count,
                "directory_count": stats.directory_count,
            }))
        }
        "get_error_message" => {
            let code = i64_param(params, "error_code")? as i32;
            Ok(json!({ "message": error_message(code) }))
        }
        other => Err(OmniError::InvalidArgument(format!(
            "unknown operation '{}'",
            other
        ))),
    }
}

/// Role from the wire: "admin"/"normal", or the persisted integer form.
fn role_param(params: &Value) -> Result<Role, OmniError> {
    let value = params
        .get("role")
        .ok_or_else(|| OmniError::InvalidArgument("missing parameter 'role'".to_string()))?;
    if let Some(name) = value.as_str() {
        return Role::parse(name)
            .ok_or_else(|| OmniError::InvalidArgument(format!("unknown role '{}'", name)));
    }
    if let Some(number) = value.as_u64() {
        if number <= u8::MAX as u64 {
            if let Some(role) = Role::from_u8(number as u8) {
                return Ok(role);
            }
        }
    }
    Err(OmniError::InvalidArgument("unknown role value".to_string()))
}
