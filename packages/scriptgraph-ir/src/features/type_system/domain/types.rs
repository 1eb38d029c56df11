//! IR type descriptors
//!
//! A closed set of type kinds covering everything the scripting language
//! and the host bridge can produce: primitives, aliases, slices, maps,
//! structs/objects, functions, channels, interfaces, and an explicit
//! opaque object kind used as the lossy fallback for host structures that
//! exceed the derivation depth bound.
//!
//! Types are interned in a per-build `TypeStore` and addressed by
//! `TypeId`, so self-referential type graphs (a struct whose field points
//! back at itself) stay finite: the struct is registered under its
//! canonical name *before* its members are derived, and the member
//! derivation resolves the name to the already-allocated id.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// Handle into a `TypeStore`. Types are never removed within a build, so
/// a plain index is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Type kind categorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Top type; also the type of call side-effect values
    Any,
    Nil,
    Boolean,
    Number,
    String,
    Bytes,
    /// Element-typed sequence
    Slice { elem: TypeId },
    /// Key/value-typed mapping
    Map { key: TypeId, value: TypeId },
    /// Aggregate with named fields in declared order; embedded fields are
    /// tracked separately for promoted-field lookup
    Struct {
        fields: Vec<(String, TypeId)>,
        anonymous: Vec<TypeId>,
    },
    Function {
        params: Vec<TypeId>,
        returns: Vec<TypeId>,
        variadic: bool,
    },
    /// Channel wrapping the element type
    Chan { elem: TypeId },
    /// Named capability type; methods live in `TypeData::methods`
    Interface,
    /// Named alias of a base type
    Alias { base: TypeId },
    /// Opaque named object; the lossy fallback kind
    Object,
}

/// One interned type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeData {
    pub kind: TypeKind,
    pub name: Option<String>,
    /// Method name → function type. Populated by the host bridge for
    /// struct/interface/alias types.
    pub methods: FxHashMap<String, TypeId>,
    /// Set on the final parameter type of a variadic function
    pub variadic_param: bool,
}

impl TypeData {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            name: None,
            methods: FxHashMap::default(),
            variadic_param: false,
        }
    }

    pub fn named(kind: TypeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: Some(name.into()),
            methods: FxHashMap::default(),
            variadic_param: false,
        }
    }
}

/// Pre-interned primitive ids, in allocation order of `TypeStore::new`
const BASIC_ANY: u32 = 0;
const BASIC_NIL: u32 = 1;
const BASIC_BOOLEAN: u32 = 2;
const BASIC_NUMBER: u32 = 3;
const BASIC_STRING: u32 = 4;
const BASIC_BYTES: u32 = 5;

static BASIC_TYPE_NAMES: Lazy<FxHashMap<&'static str, u32>> = Lazy::new(|| {
    let mut m = FxHashMap::default();
    m.insert("any", BASIC_ANY);
    m.insert("nil", BASIC_NIL);
    m.insert("bool", BASIC_BOOLEAN);
    m.insert("boolean", BASIC_BOOLEAN);
    m.insert("number", BASIC_NUMBER);
    m.insert("int", BASIC_NUMBER);
    m.insert("int64", BASIC_NUMBER);
    m.insert("float", BASIC_NUMBER);
    m.insert("float64", BASIC_NUMBER);
    m.insert("string", BASIC_STRING);
    m.insert("bytes", BASIC_BYTES);
    m
});

/// Per-build type interner
#[derive(Debug)]
pub struct TypeStore {
    types: Vec<TypeData>,
    /// Canonical type name → id, the cache that makes self-referential
    /// derivation terminate
    named: FxHashMap<String, TypeId>,
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = Self {
            types: Vec::with_capacity(16),
            named: FxHashMap::default(),
        };
        // allocation order must match the BASIC_* constants
        store.alloc(TypeData::named(TypeKind::Any, "any"));
        store.alloc(TypeData::named(TypeKind::Nil, "nil"));
        store.alloc(TypeData::named(TypeKind::Boolean, "boolean"));
        store.alloc(TypeData::named(TypeKind::Number, "number"));
        store.alloc(TypeData::named(TypeKind::String, "string"));
        store.alloc(TypeData::named(TypeKind::Bytes, "bytes"));
        store
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn any(&self) -> TypeId {
        TypeId(BASIC_ANY)
    }

    pub fn nil(&self) -> TypeId {
        TypeId(BASIC_NIL)
    }

    pub fn boolean(&self) -> TypeId {
        TypeId(BASIC_BOOLEAN)
    }

    pub fn number(&self) -> TypeId {
        TypeId(BASIC_NUMBER)
    }

    pub fn string(&self) -> TypeId {
        TypeId(BASIC_STRING)
    }

    pub fn bytes(&self) -> TypeId {
        TypeId(BASIC_BYTES)
    }

    /// Resolve a primitive by its source-level spelling
    pub fn lookup_basic(&self, name: &str) -> Option<TypeId> {
        BASIC_TYPE_NAMES.get(name).map(|&idx| TypeId(idx))
    }

    pub fn alloc(&mut self, data: TypeData) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(data);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeData {
        &self.types[id.index()]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeData {
        &mut self.types[id.index()]
    }

    /// Register a type under its canonical name. First registration wins;
    /// re-registering an existing name is a no-op returning the cached id.
    pub fn register_named(&mut self, name: impl Into<String>, id: TypeId) -> TypeId {
        let name = name.into();
        *self.named.entry(name).or_insert(id)
    }

    pub fn lookup_named(&self, name: &str) -> Option<TypeId> {
        self.named.get(name).copied()
    }

    pub fn slice_of(&mut self, elem: TypeId) -> TypeId {
        self.alloc(TypeData::new(TypeKind::Slice { elem }))
    }

    pub fn map_of(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.alloc(TypeData::new(TypeKind::Map { key, value }))
    }

    pub fn chan_of(&mut self, elem: TypeId) -> TypeId {
        self.alloc(TypeData::new(TypeKind::Chan { elem }))
    }

    pub fn function(
        &mut self,
        name: impl Into<String>,
        params: Vec<TypeId>,
        returns: Vec<TypeId>,
        variadic: bool,
    ) -> TypeId {
        self.alloc(TypeData::named(
            TypeKind::Function {
                params,
                returns,
                variadic,
            },
            name,
        ))
    }

    pub fn alias(&mut self, name: impl Into<String>, base: TypeId) -> TypeId {
        self.alloc(TypeData::named(TypeKind::Alias { base }, name))
    }

    pub fn interface(&mut self, name: impl Into<String>) -> TypeId {
        self.alloc(TypeData::named(TypeKind::Interface, name))
    }

    /// Opaque object; `name` is optional ("object" when absent)
    pub fn object(&mut self, name: Option<String>) -> TypeId {
        let mut data = TypeData::new(TypeKind::Object);
        data.name = name;
        self.alloc(data)
    }

    /// Allocate an empty struct so its id can be cached before the field
    /// types are derived. Fill fields afterwards through `add_field`.
    pub fn struct_placeholder(&mut self, name: impl Into<String>) -> TypeId {
        self.alloc(TypeData::named(
            TypeKind::Struct {
                fields: Vec::new(),
                anonymous: Vec::new(),
            },
            name,
        ))
    }

    pub fn add_field(&mut self, target: TypeId, field: impl Into<String>, ty: TypeId) {
        if let TypeKind::Struct { fields, .. } = &mut self.get_mut(target).kind {
            fields.push((field.into(), ty));
        }
    }

    pub fn add_anonymous_field(&mut self, target: TypeId, ty: TypeId) {
        if let TypeKind::Struct { anonymous, .. } = &mut self.get_mut(target).kind {
            anonymous.push(ty);
        }
    }

    pub fn set_methods(&mut self, target: TypeId, methods: FxHashMap<String, TypeId>) {
        self.get_mut(target).methods = methods;
    }

    pub fn method(&self, target: TypeId, name: &str) -> Option<TypeId> {
        self.get(target).methods.get(name).copied()
    }

    /// Look up a struct field, falling back to embedded fields
    /// (promoted-field lookup). Depth-guarded against pathological
    /// embedding chains.
    pub fn field_type(&self, target: TypeId, name: &str) -> Option<TypeId> {
        self.field_type_at(target, name, 0)
    }

    fn field_type_at(&self, target: TypeId, name: &str, depth: usize) -> Option<TypeId> {
        if depth > 8 {
            return None;
        }
        match &self.get(target).kind {
            TypeKind::Struct { fields, anonymous } => fields
                .iter()
                .find(|(f, _)| f == name)
                .map(|(_, t)| *t)
                .or_else(|| {
                    anonymous
                        .iter()
                        .find_map(|a| self.field_type_at(*a, name, depth + 1))
                }),
            TypeKind::Alias { base } => self.field_type_at(*base, name, depth + 1),
            _ => None,
        }
    }

    /// Human-readable rendering. Named composites render by name, which
    /// keeps self-referential structs printable.
    pub fn render(&self, id: TypeId) -> String {
        let data = self.get(id);
        match &data.kind {
            TypeKind::Any
            | TypeKind::Nil
            | TypeKind::Boolean
            | TypeKind::Number
            | TypeKind::String
            | TypeKind::Bytes => data.name.clone().unwrap_or_else(|| "?".to_string()),
            TypeKind::Slice { elem } => format!("[]{}", self.render(*elem)),
            TypeKind::Map { key, value } => {
                format!("map[{}]{}", self.render(*key), self.render(*value))
            }
            TypeKind::Chan { elem } => format!("chan {}", self.render(*elem)),
            TypeKind::Struct { fields, .. } => match &data.name {
                Some(name) => name.clone(),
                None => {
                    let body: Vec<String> = fields
                        .iter()
                        .map(|(f, t)| format!("{}: {}", f, self.render(*t)))
                        .collect();
                    format!("struct {{{}}}", body.join(", "))
                }
            },
            TypeKind::Function {
                params,
                returns,
                variadic,
            } => {
                let mut ps: Vec<String> = params.iter().map(|p| self.render(*p)).collect();
                if *variadic {
                    if let Some(last) = ps.last_mut() {
                        *last = format!("...{}", last);
                    }
                }
                let rs: Vec<String> = returns.iter().map(|r| self.render(*r)).collect();
                let ret = match rs.len() {
                    0 => "()".to_string(),
                    1 => rs.into_iter().next().unwrap_or_default(),
                    _ => format!("({})", rs.join(", ")),
                };
                format!("({}) -> {}", ps.join(", "), ret)
            }
            TypeKind::Interface => data
                .name
                .clone()
                .unwrap_or_else(|| "interface {}".to_string()),
            TypeKind::Alias { base } => data
                .name
                .clone()
                .unwrap_or_else(|| self.render(*base)),
            TypeKind::Object => match &data.name {
                Some(name) => format!("object<{}>", name),
                None => "object".to_string(),
            },
        }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_lookup() {
        let store = TypeStore::new();
        assert_eq!(store.lookup_basic("number"), Some(store.number()));
        assert_eq!(store.lookup_basic("int"), Some(store.number()));
        assert_eq!(store.lookup_basic("bytes"), Some(store.bytes()));
        assert_eq!(store.lookup_basic("socket"), None);
    }

    #[test]
    fn test_render_composites() {
        let mut store = TypeStore::new();
        let s = store.string();
        let n = store.number();
        let slice = store.slice_of(n);
        let map = store.map_of(s, slice);
        assert_eq!(store.render(slice), "[]number");
        assert_eq!(store.render(map), "map[string][]number");

        let f = store.function("f", vec![s, slice], vec![n], true);
        assert_eq!(store.render(f), "(string, ...[]number) -> number");
    }

    #[test]
    fn test_named_registration_first_wins() {
        let mut store = TypeStore::new();
        let a = store.object(Some("conn".to_string()));
        let b = store.object(Some("conn".to_string()));
        assert_eq!(store.register_named("conn", a), a);
        // second registration is a no-op returning the cached id
        assert_eq!(store.register_named("conn", b), a);
        assert_eq!(store.lookup_named("conn"), Some(a));
    }

    // self-referential struct stays finite: the placeholder id is handed
    // out before the field pointing back at it exists
    #[test]
    fn test_self_referential_struct() {
        let mut store = TypeStore::new();
        let node = store.struct_placeholder("node");
        store.register_named("node", node);
        store.add_field(store.lookup_named("node").unwrap(), "next", node);
        assert_eq!(store.render(node), "node");
        assert_eq!(store.field_type(node, "next"), Some(node));
    }

    #[test]
    fn test_promoted_field_lookup() {
        let mut store = TypeStore::new();
        let base = store.struct_placeholder("base");
        let n = store.number();
        store.add_field(base, "count", n);

        let derived = store.struct_placeholder("derived");
        let s = store.string();
        store.add_field(derived, "name", s);
        store.add_anonymous_field(derived, base);

        assert_eq!(store.field_type(derived, "name"), Some(s));
        // promoted through the embedded base
        assert_eq!(store.field_type(derived, "count"), Some(n));
        assert_eq!(store.field_type(derived, "missing"), None);
    }
}
