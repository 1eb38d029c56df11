//! Host namespace boundary
//!
//! Host-exposed values arrive as explicit descriptors: a name→value map
//! and a lib→(name→value) map, supplied once per build, plus a
//! canonical-name type registry that `HostType::Ref` entries resolve
//! through. The registry is how self-referential host type graphs are
//! expressed: a struct field can name its own struct and the bridge
//! terminates via its per-build cache.

use rustc_hash::FxHashMap;

/// Signature of a host-exposed callable
#[derive(Debug, Clone, PartialEq)]
pub struct HostFunction {
    pub name: String,
    pub params: Vec<HostType>,
    pub returns: Vec<HostType>,
    pub variadic: bool,
}

impl HostFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: Vec::new(),
            variadic: false,
        }
    }

    pub fn param(mut self, ty: HostType) -> Self {
        self.params.push(ty);
        self
    }

    pub fn ret(mut self, ty: HostType) -> Self {
        self.returns.push(ty);
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

/// One declared struct field
#[derive(Debug, Clone, PartialEq)]
pub struct HostField {
    pub name: String,
    pub ty: HostType,
    /// Anonymous/embedded field, tracked for promoted lookup
    pub embedded: bool,
}

/// A host record type with value- and pointer-receiver method sets
#[derive(Debug, Clone, PartialEq)]
pub struct HostStruct {
    pub name: String,
    pub fields: Vec<HostField>,
    pub methods: Vec<HostFunction>,
    pub ptr_methods: Vec<HostFunction>,
}

impl HostStruct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
            ptr_methods: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: HostType) -> Self {
        self.fields.push(HostField {
            name: name.into(),
            ty,
            embedded: false,
        });
        self
    }

    pub fn embedded(mut self, name: impl Into<String>, ty: HostType) -> Self {
        self.fields.push(HostField {
            name: name.into(),
            ty,
            embedded: true,
        });
        self
    }

    pub fn method(mut self, f: HostFunction) -> Self {
        self.methods.push(f);
        self
    }

    pub fn ptr_method(mut self, f: HostFunction) -> Self {
        self.ptr_methods.push(f);
        self
    }
}

/// A host capability type
#[derive(Debug, Clone, PartialEq)]
pub struct HostInterface {
    pub name: String,
    pub methods: Vec<HostFunction>,
}

impl HostInterface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, f: HostFunction) -> Self {
        self.methods.push(f);
        self
    }
}

/// Structural kind of a host-exposed type
#[derive(Debug, Clone, PartialEq)]
pub enum HostType {
    Bool,
    Int,
    Uint8,
    Float,
    String,
    Bytes,
    Slice(Box<HostType>),
    Map(Box<HostType>, Box<HostType>),
    Struct(HostStruct),
    Function(Box<HostFunction>),
    /// Pointer indirection; erased during derivation
    Pointer(Box<HostType>),
    /// Raw/untyped memory handle; lifts to an opaque named object
    RawHandle(String),
    Interface(HostInterface),
    Chan(Box<HostType>),
    /// Reference to a type registered in `HostEnv::types` by canonical
    /// name; the vehicle for recursive type graphs
    Ref(String),
    /// Named alias of another host type
    Alias { name: String, base: Box<HostType> },
}

impl HostType {
    /// Canonical name used as the derivation cache key
    pub fn canonical_name(&self) -> String {
        match self {
            HostType::Bool => "bool".to_string(),
            HostType::Int => "int".to_string(),
            HostType::Uint8 => "uint8".to_string(),
            HostType::Float => "float".to_string(),
            HostType::String => "string".to_string(),
            HostType::Bytes => "bytes".to_string(),
            HostType::Slice(elem) => format!("[]{}", elem.canonical_name()),
            HostType::Map(key, value) => format!(
                "map[{}]{}",
                key.canonical_name(),
                value.canonical_name()
            ),
            HostType::Struct(s) => s.name.clone(),
            HostType::Function(f) => {
                if f.name.is_empty() {
                    let ps: Vec<String> = f.params.iter().map(|p| p.canonical_name()).collect();
                    let rs: Vec<String> = f.returns.iter().map(|r| r.canonical_name()).collect();
                    format!("func({})({})", ps.join(","), rs.join(","))
                } else {
                    f.name.clone()
                }
            }
            HostType::Pointer(elem) => format!("*{}", elem.canonical_name()),
            HostType::RawHandle(name) => name.clone(),
            HostType::Interface(i) => i.name.clone(),
            HostType::Chan(elem) => format!("chan {}", elem.canonical_name()),
            HostType::Ref(name) => name.clone(),
            HostType::Alias { name, .. } => name.clone(),
        }
    }
}

/// One host-exposed value; callable iff its type is a function
#[derive(Debug, Clone, PartialEq)]
pub struct HostValue {
    pub ty: HostType,
}

impl HostValue {
    pub fn new(ty: HostType) -> Self {
        Self { ty }
    }

    pub fn function(f: HostFunction) -> Self {
        Self {
            ty: HostType::Function(Box::new(f)),
        }
    }
}

/// The two-level host namespace plus the named type registry, supplied
/// once per build
#[derive(Debug, Clone, Default)]
pub struct HostEnv {
    pub values: FxHashMap<String, HostValue>,
    pub libs: FxHashMap<String, FxHashMap<String, HostValue>>,
    pub types: FxHashMap<String, HostType>,
}

impl HostEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn with_lib_member(
        mut self,
        lib: impl Into<String>,
        name: impl Into<String>,
        value: HostValue,
    ) -> Self {
        self.libs
            .entry(lib.into())
            .or_default()
            .insert(name.into(), value);
        self
    }

    pub fn with_type(mut self, name: impl Into<String>, ty: HostType) -> Self {
        self.types.insert(name.into(), ty);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names() {
        assert_eq!(
            HostType::Slice(Box::new(HostType::Uint8)).canonical_name(),
            "[]uint8"
        );
        assert_eq!(
            HostType::Map(Box::new(HostType::String), Box::new(HostType::Int)).canonical_name(),
            "map[string]int"
        );
        assert_eq!(
            HostType::Chan(Box::new(HostType::Bool)).canonical_name(),
            "chan bool"
        );
        assert_eq!(HostType::Ref("node".to_string()).canonical_name(), "node");
    }

    #[test]
    fn test_env_builders() {
        let env = HostEnv::new()
            .with_value("println", HostValue::function(HostFunction::new("println")))
            .with_lib_member(
                "str",
                "join",
                HostValue::function(HostFunction::new("join")),
            )
            .with_type("node", HostType::Struct(HostStruct::new("node")));
        assert!(env.values.contains_key("println"));
        assert!(env.libs["str"].contains_key("join"));
        assert!(env.types.contains_key("node"));
    }
}
