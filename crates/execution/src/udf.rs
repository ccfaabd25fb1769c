//! Scalar function contract and the registry expressions resolve names against.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arrow_schema::DataType;
use ssq_common::{Result, SsqError};

use crate::value::Value;

/// Row-level scalar function contract.
///
/// Implementations must be pure: `invoke` may be called concurrently from any
/// number of runtime threads.
pub trait ScalarFunction: Send + Sync {
    /// Function name as written in SQL (`UCASE`).
    fn name(&self) -> &str;
    /// Validate argument types and infer the return type.
    fn return_type(&self, arg_types: &[DataType]) -> Result<DataType>;
    /// Invoke on one row's argument values.
    fn invoke(&self, args: &[Value]) -> Result<Value>;
}

/// Resolves function names to scalar functions.
pub trait FunctionRegistry: Send + Sync {
    /// Lookup by case-insensitive name.
    fn get_scalar_function(&self, name: &str) -> Option<Arc<dyn ScalarFunction>>;

    /// Resolve `name` for the given argument types.
    ///
    /// Unknown names and rejected argument types are `TypeResolution` errors.
    fn resolve(
        &self,
        name: &str,
        arg_types: &[DataType],
    ) -> Result<(Arc<dyn ScalarFunction>, DataType)> {
        let func = self
            .get_scalar_function(name)
            .ok_or_else(|| SsqError::TypeResolution(format!("unknown function '{name}'")))?;
        let out = func.return_type(arg_types).map_err(|e| match e {
            SsqError::TypeResolution(m) => SsqError::TypeResolution(format!(
                "{}: {m}",
                name.to_ascii_uppercase()
            )),
            other => other,
        })?;
        Ok((func, out))
    }
}

type FunctionMap = HashMap<String, Arc<dyn ScalarFunction>>;

/// Function registry backed by an in-memory map.
#[derive(Default)]
pub struct InMemoryFunctionRegistry {
    inner: RwLock<FunctionMap>,
}

impl std::fmt::Debug for InMemoryFunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.inner.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("InMemoryFunctionRegistry")
            .field("functions", &count)
            .finish()
    }
}

impl InMemoryFunctionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in functions.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for f in crate::functions::builtin_functions() {
            registry.register(f);
        }
        registry
    }

    /// Register or replace a function.
    ///
    /// Returns `true` when an existing function with the same name was replaced.
    pub fn register(&self, func: Arc<dyn ScalarFunction>) -> bool {
        self.inner
            .write()
            .expect("function registry lock poisoned")
            .insert(func.name().to_ascii_uppercase(), func)
            .is_some()
    }

    /// Deregister a function by name.
    ///
    /// Returns `true` when an existing function was removed.
    pub fn deregister(&self, name: &str) -> bool {
        self.inner
            .write()
            .expect("function registry lock poisoned")
            .remove(&name.to_ascii_uppercase())
            .is_some()
    }

    /// Registered function names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .inner
            .read()
            .expect("function registry lock poisoned")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl FunctionRegistry for InMemoryFunctionRegistry {
    fn get_scalar_function(&self, name: &str) -> Option<Arc<dyn ScalarFunction>> {
        self.inner
            .read()
            .expect("function registry lock poisoned")
            .get(&name.to_ascii_uppercase())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::DataType;
    use ssq_common::Result;

    use super::{FunctionRegistry, InMemoryFunctionRegistry, ScalarFunction};
    use crate::value::Value;

    struct Twice;

    impl ScalarFunction for Twice {
        fn name(&self) -> &str {
            "twice"
        }

        fn return_type(&self, _arg_types: &[DataType]) -> Result<DataType> {
            Ok(DataType::Int64)
        }

        fn invoke(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::Int64(args[0].as_i64().unwrap_or_default() * 2))
        }
    }

    #[test]
    fn register_replace_and_deregister() {
        let registry = InMemoryFunctionRegistry::new();
        assert!(!registry.register(Arc::new(Twice)));
        assert!(registry.register(Arc::new(Twice)));
        assert!(registry.get_scalar_function("TWICE").is_some());
        assert_eq!(registry.names(), vec!["TWICE".to_string()]);
        assert!(registry.deregister("Twice"));
        assert!(registry.get_scalar_function("twice").is_none());
    }

    #[test]
    fn resolve_reports_unknown_and_mistyped_calls() {
        let registry = InMemoryFunctionRegistry::with_builtins();
        let err = match registry.resolve("nope", &[]) {
            Ok(_) => panic!("expected unknown function"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("unknown function 'nope'"), "{err}");

        let err = match registry.resolve("ucase", &[DataType::Int32]) {
            Ok(_) => panic!("expected type error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("UCASE"), "{err}");
        assert!(err.is_planning());
    }
}
