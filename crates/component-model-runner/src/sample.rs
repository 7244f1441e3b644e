use serde_json::{Map, Value as Json};

use component_model_core::model::ComponentModel;
use component_model_core::variable::Value;

/// Render a variable value as plain JSON: scalars as numbers, vectors as arrays.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Real(r) => Json::from(*r),
        Value::Vector(v) => Json::Array(v.iter().map(|c| Json::from(*c)).collect()),
    }
}

/// One output line: the communication point plus the named variables.
/// Variables the model cannot report are written as `null`.
pub fn sample(time: f64, model: &dyn ComponentModel, names: &[String]) -> Json {
    let mut row = Map::new();
    row.insert("time".to_string(), Json::from(time));
    for name in names {
        let value = match model.get(name) {
            Ok(v) => to_json(&v),
            Err(e) => {
                tracing::warn!(%e, "cannot sample variable");
                Json::Null
            },
        };
        row.insert(name.clone(), value);
    }
    Json::Object(row)
}
