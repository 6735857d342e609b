use crate::{
    error::ValidationError,
    schema::{
        Constraint, ConvertParams, ImageFormat, OptimizeParams, Operation, ParamKind, ParamSpec,
        PipelineDefinition, ResizeParams, Step,
    },
};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub fn validate(raw: &Value) -> Vec<ValidationError> {
    match parse_pipeline(raw) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    }
}

pub fn parse_pipeline(raw: &Value) -> Result<PipelineDefinition, Vec<ValidationError>> {
    let entries = match raw.as_array() {
        Some(entries) if !entries.is_empty() => entries,
        _ => return Err(vec![ValidationError::EmptyPipeline]),
    };

    let mut errors = Vec::new();
    let mut steps = Vec::with_capacity(entries.len());

    for (i, entry) in entries.iter().enumerate() {
        match check_step(i + 1, entry) {
            Ok(step) => steps.push(step),
            Err(mut step_errors) => errors.append(&mut step_errors),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    PipelineDefinition::new(steps).map_err(|e| vec![e])
}

#[derive(Debug, Clone)]
enum ParamValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

fn check_step(step: usize, entry: &Value) -> Result<Step, Vec<ValidationError>> {
    let Some(obj) = entry.as_object() else {
        return Err(vec![ValidationError::MalformedStep { step }]);
    };

    let op_name = match obj.get("operation").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name,
        _ => return Err(vec![ValidationError::MissingOperation { step }]),
    };

    let operation: Operation = op_name.parse().map_err(|_| {
        vec![ValidationError::UnsupportedOperation {
            step,
            operation: op_name.to_string(),
        }]
    })?;

    let values = check_params(step, operation, obj.get("params"))?;
    build_step(step, operation, &values)
}

pub fn parse_optimize_params(raw: &Value) -> Result<OptimizeParams, Vec<ValidationError>> {
    let values = check_params(1, Operation::Optimize, Some(raw))?;
    Ok(optimize_params(&values))
}

type ParamValues = HashMap<&'static str, ParamValue>;

fn check_params(
    step: usize,
    operation: Operation,
    raw: Option<&Value>,
) -> Result<ParamValues, Vec<ValidationError>> {
    let empty = Map::new();
    let params = match raw {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(map)) => map,
        Some(_) => return Err(vec![ValidationError::MalformedParams { step, operation }]),
    };

    let mut errors = Vec::new();
    let mut values = HashMap::new();

    for spec in operation.param_specs() {
        match params.get(spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    errors.push(ValidationError::InvalidParamValue {
                        step,
                        operation,
                        param: spec.name.to_string(),
                        reason: "is required".to_string(),
                    });
                }
            }
            Some(raw) => match check_param(step, operation, spec, raw) {
                Ok(v) => {
                    values.insert(spec.name, v);
                }
                Err(e) => errors.push(e),
            },
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

fn check_param(
    step: usize,
    operation: Operation,
    spec: &ParamSpec,
    raw: &Value,
) -> Result<ParamValue, ValidationError> {
    let wrong_type = || ValidationError::InvalidParamType {
        step,
        operation,
        param: spec.name.to_string(),
        expected: spec.kind,
    };
    let bad_value = |reason: String| ValidationError::InvalidParamValue {
        step,
        operation,
        param: spec.name.to_string(),
        reason,
    };

    let value = match spec.kind {
        ParamKind::Numeric => ParamValue::Number(as_numeric(raw).ok_or_else(wrong_type)?),
        ParamKind::String => ParamValue::Text(raw.as_str().ok_or_else(wrong_type)?.to_string()),
        ParamKind::Boolean => ParamValue::Flag(raw.as_bool().ok_or_else(wrong_type)?),
    };

    let violation = match (&spec.constraint, &value) {
        (Constraint::Range { min, max }, ParamValue::Number(n)) if *n < *min || *n > *max => {
            Some(format!("must be between {min} and {max}"))
        }
        (Constraint::Positive, ParamValue::Number(n)) if *n <= 0.0 => {
            Some("must be a positive number".to_string())
        }
        (Constraint::OneOf(allowed), ParamValue::Text(s))
            if !allowed.contains(&s.to_ascii_lowercase().as_str()) =>
        {
            Some(format!("must be one of: {}", allowed.join(", ")))
        }
        _ => None,
    };

    match violation {
        Some(reason) => Err(bad_value(reason)),
        None => Ok(value),
    }
}

fn as_numeric(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn number(values: &ParamValues, name: &str) -> Option<f64> {
    match values.get(name) {
        Some(ParamValue::Number(n)) => Some(*n),
        _ => None,
    }
}

fn text(values: &ParamValues, name: &str) -> Option<String> {
    match values.get(name) {
        Some(ParamValue::Text(s)) => Some(s.clone()),
        _ => None,
    }
}

fn format(values: &ParamValues, name: &str) -> Option<ImageFormat> {
    text(values, name).and_then(|s| s.parse().ok())
}

fn optimize_params(values: &ParamValues) -> OptimizeParams {
    OptimizeParams {
        quality: number(values, "quality"),
        format: format(values, "format"),
        lossless: match values.get("lossless") {
            Some(ParamValue::Flag(b)) => Some(*b),
            _ => None,
        },
    }
}

fn build_step(
    step: usize,
    operation: Operation,
    values: &ParamValues,
) -> Result<Step, Vec<ValidationError>> {
    Ok(match operation {
        Operation::Optimize => Step::Optimize(optimize_params(values)),
        Operation::Resize => Step::Resize(ResizeParams {
            width: number(values, "width"),
            height: number(values, "height"),
            mode: text(values, "mode"),
        }),
        Operation::Convert => {
            let Some(format) = format(values, "format") else {
                return Err(vec![ValidationError::InvalidParamValue {
                    step,
                    operation,
                    param: "format".to_string(),
                    reason: "is required".to_string(),
                }]);
            };
            Step::Convert(ConvertParams { format })
        }
        Operation::RemoveBackground => Step::RemoveBackground,
    })
}
