//! Function schemas in the shape the chat-completion endpoint expects:
//!
//! ```json
//! {"name": "...", "description": "...",
//!  "parameters": {"type": "object", "properties": {...}, "required": [...]}}
//! ```
//!
//! Properties are written in declaration order, which is why `FunctionSchema`
//! serializes by hand instead of going through a map type.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::errors::SchemaError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub allowed_values: Option<Vec<String>>,
    pub required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSchema {
    name: String,
    description: Option<String>,
    parameters: Vec<Parameter>,
}

impl FunctionSchema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }

    /// Names of required parameters, in declaration order. Each name appears once.
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|parameter| parameter.required)
            .map(|parameter| parameter.name.as_str())
            .collect()
    }
}

impl Serialize for FunctionSchema {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.name)?;
        if let Some(description) = &self.description {
            map.serialize_entry("description", description)?;
        }
        map.serialize_entry("parameters", &ParametersObject { schema: self })?;
        map.end()
    }
}

struct ParametersObject<'a> {
    schema: &'a FunctionSchema,
}

impl Serialize for ParametersObject<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("type", "object")?;
        map.serialize_entry("properties", &Properties { parameters: &self.schema.parameters })?;
        map.serialize_entry("required", &self.schema.required())?;
        map.end()
    }
}

struct Properties<'a> {
    parameters: &'a [Parameter],
}

impl Serialize for Properties<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.parameters.len()))?;
        for parameter in self.parameters {
            map.serialize_entry(
                &parameter.name,
                &PropertyBody {
                    kind: parameter.param_type.as_str(),
                    description: &parameter.description,
                    allowed_values: parameter.allowed_values.as_deref(),
                },
            )?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct PropertyBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    description: &'a str,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    allowed_values: Option<&'a [String]>,
}

/// Accumulates a schema. Declaring the same parameter twice keeps its original
/// position, takes the latest type/description/enum values and ORs the
/// required flag.
#[derive(Clone, Debug, Default)]
pub struct SchemaBuilder {
    name: String,
    description: Option<String>,
    parameters: Vec<Parameter>,
    required_names: Vec<String>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn parameter(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.upsert(Parameter {
            name: name.into(),
            param_type,
            description: description.into(),
            allowed_values: None,
            required,
        });
        self
    }

    pub fn enum_parameter<I, V>(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: I,
        required: bool,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.upsert(Parameter {
            name: name.into(),
            param_type: ParamType::String,
            description: description.into(),
            allowed_values: Some(values.into_iter().map(Into::into).collect()),
            required,
        });
        self
    }

    /// Marks an already declared parameter as required.
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required_names.push(name.into());
        self
    }

    pub fn build(self) -> Result<FunctionSchema, SchemaError> {
        let SchemaBuilder { name, description, mut parameters, required_names } = self;

        if name.trim().is_empty() {
            return Err(SchemaError::MissingName);
        }

        for parameter in &parameters {
            if parameter.name.trim().is_empty() {
                return Err(SchemaError::EmptyParameterName { function: name });
            }
            if parameter.allowed_values.as_ref().is_some_and(Vec::is_empty) {
                return Err(SchemaError::EmptyEnum {
                    function: name,
                    parameter: parameter.name.clone(),
                });
            }
        }

        for required_name in required_names {
            match parameters.iter_mut().find(|parameter| parameter.name == required_name) {
                Some(parameter) => parameter.required = true,
                None => {
                    return Err(SchemaError::UnknownRequiredParameter {
                        function: name,
                        parameter: required_name,
                    })
                }
            }
        }

        Ok(FunctionSchema { name, description, parameters })
    }

    fn upsert(&mut self, incoming: Parameter) {
        match self.parameters.iter_mut().find(|existing| existing.name == incoming.name) {
            Some(existing) => {
                existing.param_type = incoming.param_type;
                existing.description = incoming.description;
                existing.allowed_values = incoming.allowed_values;
                existing.required |= incoming.required;
            }
            None => self.parameters.push(incoming),
        }
    }
}
