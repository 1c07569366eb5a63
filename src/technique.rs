//! Declarative render technique bindings.
//!
//! Techniques are a purely descriptive serialization concern: parameter,
//! attribute, uniform, and render state bindings for one program.
use glam::{Vec2, Vec4};
use indexmap::IndexMap;
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;

/// glTF parameter type constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Float = 5126,
    FloatVec2 = 35664,
    FloatVec3 = 35665,
    FloatVec4 = 35666,
    FloatMat3 = 35675,
    FloatMat4 = 35676,
    Sampler2d = 35678,
}

impl Serialize for ParameterType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(*self as u32)
    }
}

/// Semantic binding of a technique parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Semantic {
    #[strum(serialize = "POSITION")]
    Position,
    #[strum(serialize = "NORMAL")]
    Normal,
    #[strum(serialize = "TEXCOORD_0")]
    Texcoord0,
    #[strum(serialize = "TEXCOORD_1")]
    Texcoord1,
    #[strum(serialize = "TEXCOORD_2")]
    Texcoord2,
    #[strum(serialize = "TEXCOORD_3")]
    Texcoord3,
    #[strum(serialize = "MODELVIEW")]
    ModelView,
    #[strum(serialize = "CESIUM_RTC_MODELVIEW")]
    CesiumRtcModelView,
    #[strum(serialize = "PROJECTION")]
    Projection,
    #[strum(serialize = "MODELVIEWINVERSETRANSPOSE")]
    ModelViewInverseTranspose,
    #[strum(serialize = "JOINT")]
    Joint,
    #[strum(serialize = "WEIGHT")]
    Weight,
    #[strum(serialize = "JOINTMATRIX")]
    JointMatrix,
}

impl Serialize for Semantic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<Semantic>,
    /// Joint matrix array length for the JOINTMATRIX semantic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Shader attribute or uniform name bound to a parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub parameter: String,
}

/// A typed render state function value, serialized as a JSON array.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    Color([f32; 4]),
    Vector2(Vec2),
    Vector4(Vec4),
    IntArray(Vec<i32>),
    BoolArray(Vec<bool>),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(v) => [v].serialize(serializer),
            Value::Int(v) => [v].serialize(serializer),
            Value::Float(v) => [v].serialize(serializer),
            Value::Color(v) => v.serialize(serializer),
            Value::Vector2(v) => v.to_array().serialize(serializer),
            Value::Vector4(v) => v.to_array().serialize(serializer),
            Value::IntArray(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for i in v {
                    seq.serialize_element(i)?;
                }
                seq.end()
            }
            Value::BoolArray(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for b in v {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct States {
    /// Capabilities to enable, like 2929 (DEPTH_TEST) or 2884 (CULL_FACE).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enable: Vec<u32>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub functions: IndexMap<String, Value>,
}

/// Parameter, attribute, uniform, and state bindings for one program.
#[derive(Debug, Clone, PartialEq)]
pub struct Technique {
    pub name: String,
    pub program: String,
    pub parameters: Vec<Parameter>,
    pub attributes: Vec<Binding>,
    pub uniforms: Vec<Binding>,
    pub states: States,
}

impl Technique {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            parameters: Vec::new(),
            attributes: Vec::new(),
            uniforms: Vec::new(),
            states: States::default(),
        }
    }

    /// Install the modelview, projection, and normal matrix uniforms every
    /// technique needs. `rtc` selects the CESIUM_RTC_MODELVIEW semantic used
    /// for relative-to-center rendering.
    pub fn add_default_uniforms(&mut self, rtc: bool) {
        self.add_uniform_parameter(
            "modelViewMatrix",
            "u_modelViewMatrix",
            ParameterType::FloatMat4,
            Some(if rtc {
                Semantic::CesiumRtcModelView
            } else {
                Semantic::ModelView
            }),
        );
        self.add_uniform_parameter(
            "projectionMatrix",
            "u_projectionMatrix",
            ParameterType::FloatMat4,
            Some(Semantic::Projection),
        );
        self.add_uniform_parameter(
            "normalMatrix",
            "u_normalMatrix",
            ParameterType::FloatMat3,
            Some(Semantic::ModelViewInverseTranspose),
        );
    }

    pub fn add_uniform_parameter(
        &mut self,
        parameter: &str,
        uniform: &str,
        parameter_type: ParameterType,
        semantic: Option<Semantic>,
    ) {
        self.parameters.push(Parameter {
            name: parameter.to_string(),
            parameter_type,
            semantic,
            count: None,
        });
        self.uniforms.push(Binding {
            name: uniform.to_string(),
            parameter: parameter.to_string(),
        });
    }

    pub fn add_attribute_parameter(
        &mut self,
        parameter: &str,
        attribute: &str,
        parameter_type: ParameterType,
        semantic: Option<Semantic>,
    ) {
        self.parameters.push(Parameter {
            name: parameter.to_string(),
            parameter_type,
            semantic,
            count: None,
        });
        self.attributes.push(Binding {
            name: attribute.to_string(),
            parameter: parameter.to_string(),
        });
    }
}
