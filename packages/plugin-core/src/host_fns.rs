//! Host functions linked into every Wasm plugin.
//!
//! Strings cross the boundary as Extism memory handles; structured values are
//! JSON text. Each call reaches the [`HostApi`] attached to the hook
//! invocation in flight, so permission checks apply exactly as for native
//! plugins.

use extism::{Function, PTR, UserData, host_fn};
use serde_json::{Value, json};
use tokio::runtime::Handle;

use crate::activity::LogLevel;
use crate::host_api::{HostHandle, Resource};

/// Host and runtime attached for the duration of one Wasm call.
pub(crate) type CallScope = Option<(HostHandle, Handle)>;

pub(crate) fn attach(scope: &UserData<CallScope>, value: CallScope) -> anyhow::Result<()> {
    let slot = scope.get()?;
    let mut guard = slot
        .lock()
        .map_err(|_| extism::Error::msg("host scope poisoned"))?;
    *guard = value;
    Ok(())
}

fn attached(user_data: &UserData<CallScope>) -> Result<(HostHandle, Handle), extism::Error> {
    let slot = user_data.get()?;
    let guard = slot
        .lock()
        .map_err(|_| extism::Error::msg("host scope poisoned"))?;
    guard
        .clone()
        .ok_or_else(|| extism::Error::msg("host functions are only available inside a hook"))
}

fn parse_json(text: &str) -> Result<Value, extism::Error> {
    serde_json::from_str(text).map_err(|e| extism::Error::msg(format!("Invalid JSON: {e}")))
}

fn parse_resource(name: &str) -> Result<Resource, extism::Error> {
    name.parse().map_err(extism::Error::msg)
}

host_fn!(pub host_log(user_data: CallScope; level: String, message: String) -> () {
    let (host, runtime) = attached(&user_data)?;
    let level: LogLevel = level.parse().map_err(extism::Error::msg)?;
    runtime.block_on(host.log(level, &message, json!({ "source": "wasm" })));
    Ok(())
});

host_fn!(pub storage_get(user_data: CallScope; key: String) -> String {
    let (host, runtime) = attached(&user_data)?;
    let value = runtime.block_on(host.storage_get(&key))?;
    Ok(value.unwrap_or(Value::Null).to_string())
});

host_fn!(pub storage_set(user_data: CallScope; key: String, value: String) -> () {
    let (host, runtime) = attached(&user_data)?;
    let value = parse_json(&value)?;
    runtime.block_on(host.storage_set(&key, value))?;
    Ok(())
});

host_fn!(pub send_email(user_data: CallScope; to: String, subject: String, body: String) -> () {
    let (host, runtime) = attached(&user_data)?;
    runtime.block_on(host.send_email(&to, &subject, &body))?;
    Ok(())
});

host_fn!(pub send_slack(user_data: CallScope; channel: String, message: String) -> () {
    let (host, runtime) = attached(&user_data)?;
    runtime.block_on(host.send_slack(&channel, &message))?;
    Ok(())
});

host_fn!(pub finance_list(user_data: CallScope; resource: String, filter: String) -> String {
    let (host, runtime) = attached(&user_data)?;
    let resource = parse_resource(&resource)?;
    let filter = parse_json(&filter)?;
    let rows = runtime.block_on(host.list(resource, &filter))?;
    Ok(Value::Array(rows).to_string())
});

host_fn!(pub finance_create(user_data: CallScope; resource: String, data: String) -> String {
    let (host, runtime) = attached(&user_data)?;
    let resource = parse_resource(&resource)?;
    let data = parse_json(&data)?;
    Ok(runtime.block_on(host.create(resource, &data))?.to_string())
});

host_fn!(pub finance_update(user_data: CallScope; resource: String, id: String, data: String) -> String {
    let (host, runtime) = attached(&user_data)?;
    let resource = parse_resource(&resource)?;
    let data = parse_json(&data)?;
    Ok(runtime.block_on(host.update(resource, &id, &data))?.to_string())
});

/// All host functions, sharing one scope slot.
pub(crate) fn functions(scope: &UserData<CallScope>) -> Vec<Function> {
    vec![
        Function::new("host_log", [PTR, PTR], [], scope.clone(), host_log),
        Function::new("storage_get", [PTR], [PTR], scope.clone(), storage_get),
        Function::new("storage_set", [PTR, PTR], [], scope.clone(), storage_set),
        Function::new("send_email", [PTR, PTR, PTR], [], scope.clone(), send_email),
        Function::new("send_slack", [PTR, PTR], [], scope.clone(), send_slack),
        Function::new("finance_list", [PTR, PTR], [PTR], scope.clone(), finance_list),
        Function::new("finance_create", [PTR, PTR], [PTR], scope.clone(), finance_create),
        Function::new(
            "finance_update",
            [PTR, PTR, PTR],
            [PTR],
            scope.clone(),
            finance_update,
        ),
    ]
}
