use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::optional_str;
use crate::ipc::types::{AppState, Request};
use resultd::config::{self, Section};
use serde_json::{Map, Value};

fn parse_section(raw: &str) -> Result<Section, HandlerErr> {
    Section::parse(raw).ok_or_else(|| {
        HandlerErr::bad_params(format!("unknown setup section: {}", raw)).with_details(
            Value::from(Section::ALL.iter().map(|s| s.name()).collect::<Vec<_>>()),
        )
    })
}

fn setup_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    if let Some(raw) = optional_str(params, "section")? {
        return Ok(config::load_section(conn, parse_section(&raw)?)?);
    }
    let mut all = Map::new();
    for section in Section::ALL {
        all.insert(
            section.name().to_string(),
            config::load_section(conn, section)?,
        );
    }
    Ok(Value::Object(all))
}

fn setup_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let raw = optional_str(params, "section")?
        .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
    let section = parse_section(&raw)?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;
    Ok(config::update_section(conn, section, patch)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "setup.get" => setup_get(state, &req.params),
        "setup.update" => setup_update(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
