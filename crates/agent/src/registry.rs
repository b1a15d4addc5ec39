use std::collections::HashMap;
use std::sync::Arc;

use switchboard_core::{FunctionSchema, RegistryError};

use crate::function::Function;

/// Immutable set of callable capabilities with their advertised schemas.
///
/// Schemas are built once when the registry is assembled, so every completion
/// request sees the same list in registration order.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: Vec<Arc<dyn Function>>,
    schemas: Vec<FunctionSchema>,
    index: HashMap<String, usize>,
}

impl FunctionRegistry {
    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.index.get(name).map(|position| &self.functions[*position])
    }

    pub fn schemas(&self) -> &[FunctionSchema] {
        &self.schemas
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(FunctionSchema::name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry").field("functions", &self.names().collect::<Vec<_>>()).finish()
    }
}

#[derive(Default)]
pub struct FunctionRegistryBuilder {
    functions: Vec<Arc<dyn Function>>,
}

impl FunctionRegistryBuilder {
    pub fn register<T>(&mut self, function: T) -> &mut Self
    where
        T: Function + 'static,
    {
        self.functions.push(Arc::new(function));
        self
    }

    pub fn register_arc(&mut self, function: Arc<dyn Function>) -> &mut Self {
        self.functions.push(function);
        self
    }

    pub fn build(self) -> Result<FunctionRegistry, RegistryError> {
        let mut registry = FunctionRegistry::default();

        for function in self.functions {
            let schema = function.schema()?;
            if schema.name() != function.name() {
                return Err(RegistryError::NameMismatch {
                    function: function.name().to_string(),
                    schema: schema.name().to_string(),
                });
            }
            if registry.index.contains_key(schema.name()) {
                return Err(RegistryError::DuplicateName(schema.name().to_string()));
            }

            registry.index.insert(schema.name().to_string(), registry.functions.len());
            registry.schemas.push(schema);
            registry.functions.push(function);
        }

        Ok(registry)
    }
}
