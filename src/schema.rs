use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Optimize,
    Resize,
    Convert,
    RemoveBackground,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Optimize,
        Operation::RemoveBackground,
        Operation::Resize,
        Operation::Convert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimize => "optimize",
            Self::Resize => "resize",
            Self::Convert => "convert",
            Self::RemoveBackground => "remove_background",
        }
    }

    pub fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(|op| op.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn param_specs(&self) -> &'static [ParamSpec] {
        match self {
            Self::Optimize => OPTIMIZE_PARAMS,
            Self::Resize => RESIZE_PARAMS,
            Self::Convert => CONVERT_PARAMS,
            Self::RemoveBackground => &[],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unsupported operation: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Numeric,
    String,
    Boolean,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Numeric => "numeric",
            Self::String => "string",
            Self::Boolean => "boolean",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    None,
    Range { min: f64, max: f64 },
    Positive,
    OneOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub constraint: Constraint,
}

pub const ALLOWED_FORMATS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "auto"];

const OPTIMIZE_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "quality",
        kind: ParamKind::Numeric,
        required: false,
        constraint: Constraint::Range { min: 0.0, max: 100.0 },
    },
    ParamSpec {
        name: "format",
        kind: ParamKind::String,
        required: false,
        constraint: Constraint::OneOf(ALLOWED_FORMATS),
    },
    ParamSpec {
        name: "lossless",
        kind: ParamKind::Boolean,
        required: false,
        constraint: Constraint::None,
    },
];

const RESIZE_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "width",
        kind: ParamKind::Numeric,
        required: false,
        constraint: Constraint::Positive,
    },
    ParamSpec {
        name: "height",
        kind: ParamKind::Numeric,
        required: false,
        constraint: Constraint::Positive,
    },
    ParamSpec {
        name: "mode",
        kind: ParamKind::String,
        required: false,
        constraint: Constraint::None,
    },
];

const CONVERT_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "format",
    kind: ParamKind::String,
    required: true,
    constraint: Constraint::OneOf(ALLOWED_FORMATS),
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    Jpeg,
    Png,
    Webp,
    Gif,
    Auto,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Auto => "auto",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" => Ok(Self::Jpg),
            "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "gif" => Ok(Self::Gif),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unsupported image format: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizeParams {
    pub quality: Option<f64>,
    pub format: Option<ImageFormat>,
    pub lossless: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResizeParams {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertParams {
    pub format: ImageFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", content = "params", rename_all = "snake_case")]
pub enum Step {
    Optimize(OptimizeParams),
    Resize(ResizeParams),
    Convert(ConvertParams),
    RemoveBackground,
}

impl Step {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Optimize(_) => Operation::Optimize,
            Self::Resize(_) => Operation::Resize,
            Self::Convert(_) => Operation::Convert,
            Self::RemoveBackground => Operation::RemoveBackground,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDefinition {
    steps: Vec<Step>,
}

impl PipelineDefinition {
    pub fn new(steps: Vec<Step>) -> Result<Self, crate::error::ValidationError> {
        if steps.is_empty() {
            return Err(crate::error::ValidationError::EmptyPipeline);
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}
