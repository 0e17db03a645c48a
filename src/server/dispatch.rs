//! Method table: JSON method name to handler function, the "dynamic
//! dispatch by JSON method name" design the spec asks for (Design Notes §9).

use fnv::FnvHashMap;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::dataset::ColumnType;
use crate::errors::{Result, StoreError};

use super::state::{ClientState, ServerState};

type MethodFn = fn(&mut ServerState, &mut ClientState, Value) -> Result<Value>;

static METHODS: Lazy<FnvHashMap<&'static str, MethodFn>> = Lazy::new(|| {
    let mut m: FnvHashMap<&'static str, MethodFn> = FnvHashMap::default();
    m.insert("dataset/list", dataset_list);
    m.insert("dataset/create", dataset_create);
    m.insert("dataset/open", dataset_open);
    m.insert("dataset/close", dataset_close);
    m.insert("dataset/info", dataset_info);
    m.insert("column/create", column_create);
    m.insert("column/open", column_open);
    m.insert("column/close", column_close);
    m.insert("column/values/set", column_values_set);
    m.insert("column/values/get", column_values_get);
    m
});

/// Looks up `method` and invokes it. `NotFound` covers both an unknown
/// dataset/column id surfaced from within a handler and an unknown method
/// name here (spec §7) — both become a `{"error": ...}` response, as
/// opposed to the unparseable-envelope case the connection layer drops
/// silently before ever reaching this function.
pub fn dispatch(state: &mut ServerState, client: &mut ClientState, method: &str, argument: Value) -> Result<Value> {
    let Some(handler) = METHODS.get(method) else {
        log::warn!("client {} named unknown method `{method}`", client.id);
        return Err(StoreError::NotFound(format!("method {method}")));
    };
    handler(state, client, argument)
}

fn current_dataset(client: &ClientState) -> Result<String> {
    client
        .current_dataset
        .clone()
        .ok_or_else(|| StoreError::PreconditionFailed("no dataset open".into()))
}

fn arg_str<'a>(argument: &'a Value, key: &str) -> Result<&'a str> {
    argument
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidArgument(format!("missing or non-string `{key}`")))
}

fn arg_usize(argument: &Value, key: &str) -> Result<usize> {
    argument
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| StoreError::InvalidArgument(format!("missing or non-integer `{key}`")))
}

fn arg_indices(argument: &Value, dataset_length: usize) -> Result<Vec<usize>> {
    let indices = match argument.get("indices") {
        None | Some(Value::Null) => (0..dataset_length).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| StoreError::InvalidArgument("`indices` must be integers".into()))
            })
            .collect::<Result<Vec<usize>>>()?,
        Some(_) => return Err(StoreError::InvalidArgument("`indices` must be an array".into())),
    };
    // RealColumn::get/set have no bounds check of their own (spec §4.3) — the
    // request layer is the caller that must validate before reaching the core.
    if let Some(&bad) = indices.iter().find(|&&i| i >= dataset_length) {
        return Err(StoreError::InvalidArgument(format!(
            "index {bad} out of range for dataset length {dataset_length}"
        )));
    }
    Ok(indices)
}

fn dataset_list(state: &mut ServerState, _client: &mut ClientState, _argument: Value) -> Result<Value> {
    Ok(state.list_datasets())
}

fn dataset_create(state: &mut ServerState, client: &mut ClientState, argument: Value) -> Result<Value> {
    let name = arg_str(&argument, "name")?.to_string();
    let length = arg_usize(&argument, "length")?;
    let id = state.create_dataset(name, length)?;
    state.subscribe_dataset(&id, &client.id)?;
    client.current_dataset = Some(id.clone());
    serde_json::to_value(state.dataset(&id)?.get_info()).map_err(|e| StoreError::ManifestCorrupt(e.to_string()))
}

fn dataset_open(state: &mut ServerState, client: &mut ClientState, argument: Value) -> Result<Value> {
    let id = arg_str(&argument, "id")?.to_string();
    let info = serde_json::to_value(state.dataset(&id)?.get_info())
        .map_err(|e| StoreError::ManifestCorrupt(e.to_string()))?;
    state.subscribe_dataset(&id, &client.id)?;
    client.current_dataset = Some(id);
    Ok(info)
}

fn dataset_close(state: &mut ServerState, client: &mut ClientState, _argument: Value) -> Result<Value> {
    let id = current_dataset(client)?;
    state.unsubscribe_dataset(&id, &client.id)?;
    client.current_dataset = None;
    Ok(Value::Null)
}

fn dataset_info(state: &mut ServerState, client: &mut ClientState, _argument: Value) -> Result<Value> {
    let id = current_dataset(client)?;
    serde_json::to_value(state.dataset(&id)?.get_info()).map_err(|e| StoreError::ManifestCorrupt(e.to_string()))
}

fn column_create(state: &mut ServerState, client: &mut ClientState, argument: Value) -> Result<Value> {
    let dataset_id = current_dataset(client)?;
    let name = arg_str(&argument, "name")?.to_string();
    let kind_str = arg_str(&argument, "type")?;
    let kind: ColumnType = serde_json::from_value(Value::String(kind_str.to_string()))
        .map_err(|_| StoreError::InvalidArgument(format!("unknown column type `{kind_str}`")))?;

    let column_id = state.dataset_mut(&dataset_id)?.column_create(name, kind)?;
    let column_info = serde_json::to_value(state.dataset(&dataset_id)?.get_column_info(&column_id)?)
        .map_err(|e| StoreError::ManifestCorrupt(e.to_string()))?;
    state.notify_column_created(&dataset_id, &client.id, &column_id, column_info);
    Ok(Value::String(column_id))
}

fn column_open(state: &mut ServerState, client: &mut ClientState, argument: Value) -> Result<Value> {
    let dataset_id = current_dataset(client)?;
    let column_id = arg_str(&argument, "column")?.to_string();
    state.dataset_mut(&dataset_id)?.column_open(&column_id)?;
    state.subscribe_column(&dataset_id, &column_id, &client.id)?;
    Ok(json!({ "id": column_id }))
}

fn column_close(state: &mut ServerState, client: &mut ClientState, argument: Value) -> Result<Value> {
    let dataset_id = current_dataset(client)?;
    let column_id = arg_str(&argument, "column")?.to_string();
    state.unsubscribe_column(&dataset_id, &column_id, &client.id)?;
    Ok(Value::Null)
}

fn column_values_set(state: &mut ServerState, client: &mut ClientState, argument: Value) -> Result<Value> {
    let dataset_id = current_dataset(client)?;
    let column_id = arg_str(&argument, "column")?.to_string();
    let explicit_indices = argument.get("indices").is_some_and(|v| !v.is_null());
    let length = state.dataset(&dataset_id)?.get_length();
    let indices = arg_indices(&argument, length)?;
    let values = argument
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::InvalidArgument("missing `values` array".into()))?;
    if values.len() != indices.len() {
        return Err(StoreError::InvalidArgument(format!(
            "{} values for {} indices",
            values.len(),
            indices.len()
        )));
    }

    let kind = state.dataset(&dataset_id)?.get_column_type(&column_id)?;
    let dataset = state.dataset_mut(&dataset_id)?;
    match kind {
        ColumnType::String => {
            let rows: Vec<Vec<u8>> = values
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(|s| s.as_bytes().to_vec())
                        .ok_or_else(|| StoreError::InvalidArgument("string column values must be strings".into()))
                })
                .collect::<Result<_>>()?;
            dataset.set_string_rows(&column_id, &indices, &rows)?;
        }
        ColumnType::Real => {
            let rows: Vec<f64> = values
                .iter()
                .map(|v| {
                    v.as_f64()
                        .ok_or_else(|| StoreError::InvalidArgument("real column values must be numbers".into()))
                })
                .collect::<Result<_>>()?;
            dataset.set_real_rows(&column_id, &indices, &rows)?;
        }
    }

    if !explicit_indices {
        return Ok(Value::Null);
    }
    let generation = state.dataset_mut(&dataset_id)?.bump_generation(&column_id)?;
    let values_value = Value::Array(values.clone());
    state.notify_values_set(&dataset_id, &column_id, &client.id, generation, &indices, &values_value);
    Ok(json!(generation))
}

fn column_values_get(state: &mut ServerState, client: &mut ClientState, argument: Value) -> Result<Value> {
    let dataset_id = current_dataset(client)?;
    let column_id = arg_str(&argument, "column")?.to_string();
    let length = state.dataset(&dataset_id)?.get_length();
    let indices = arg_indices(&argument, length)?;

    let kind = state.dataset(&dataset_id)?.get_column_type(&column_id)?;
    let dataset = state.dataset_mut(&dataset_id)?;
    let values = match kind {
        ColumnType::String => {
            let rows = dataset.get_string_rows(&column_id, &indices)?;
            Value::Array(
                rows.into_iter()
                    .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
                    .collect(),
            )
        }
        ColumnType::Real => {
            let rows = dataset.get_real_rows(&column_id, &indices)?;
            Value::Array(
                rows.into_iter()
                    .map(|v| {
                        serde_json::Number::from_f64(v).map(Value::Number).unwrap_or_else(|| {
                            log::warn!("real column {column_id} row is non-finite ({v}), encoding as 0");
                            json!(0)
                        })
                    })
                    .collect(),
            )
        }
    };
    Ok(values)
}
