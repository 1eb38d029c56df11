//! Host value/type bridging
//!
//! Lifts externally supplied values and type descriptors into IR values
//! and `TypeStore` ids, exactly one canonical representation per unique
//! external identifier per build. Derivation recurses structurally with
//! two independent termination guards:
//!
//! - every derived composite is registered in the per-build cache keyed
//!   by canonical type name *before* its members are derived, so a type
//!   that references itself through its own fields terminates via cache
//!   hit;
//! - a fixed depth bound collapses anything deeper to an opaque object
//!   type. This is a deliberate lossy fallback for pathological host
//!   graphs, not a cycle detector.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::features::ssa::domain::{ConstValue, Node, NodeKind, ValueId};
use crate::features::ssa::ports::{HostFunction, HostType, HostValue};
use crate::features::type_system::{TypeId, TypeKind};

use super::builder::ProgramBuilder;

/// Recursion bound for host type derivation
pub const MAX_TYPE_LEVEL: usize = 15;

fn is_reserved(id: &str) -> bool {
    id.starts_with('$') || id.starts_with('_')
}

impl ProgramBuilder<'_> {
    /// Resolve an external identifier to its canonical IR value. Returns
    /// `None` for unknown or reserved identifiers.
    pub fn try_build_extern_value(&mut self, id: &str) -> Option<ValueId> {
        if let Some(&cached) = self.extern_values.get(id) {
            return Some(cached);
        }
        if let Some(hv) = self.host.values.get(id).cloned() {
            return self.build_value_from_host(id, &hv);
        }
        if self.host.libs.contains_key(id) {
            if is_reserved(id) {
                return None;
            }
            // the lib itself surfaces as an extern leaf; members are
            // bridged lazily through `build_extern_lib_member`
            let ty = self.types.object(Some(id.to_string()));
            let mut node = Node::new(NodeKind::Parameter {
                is_free_value: false,
            });
            node.variable = Some(id.to_string());
            node.is_extern = true;
            node.types = vec![ty];
            let value = self.alloc_value(node, None);
            self.extern_values.insert(id.to_string(), value);
            debug!(lib = id, "extern lib leaf created");
            return Some(value);
        }
        None
    }

    /// Bridge one member of a host lib, cached under `lib.member`
    pub fn build_extern_lib_member(&mut self, lib: &str, key: &str) -> Option<ValueId> {
        let qualified = format!("{}.{}", lib, key);
        if let Some(&cached) = self.extern_values.get(&qualified) {
            return Some(cached);
        }
        let hv = self.host.libs.get(lib)?.get(key)?.clone();
        self.build_value_from_host(&qualified, &hv)
    }

    /// Closest registered member name of `lib` by edit-distance
    /// similarity; for driver-side "did you mean" diagnostics
    pub fn suggest_lib_key(&self, lib: &str, key: &str) -> Option<String> {
        let table = self.host.libs.get(lib)?;
        let mut best_score = 0.0f64;
        let mut best: Option<String> = None;
        for candidate in table.keys() {
            let score = similarity(key, candidate);
            if score > best_score {
                best_score = score;
                best = Some(candidate.clone());
            }
        }
        best
    }

    pub(crate) fn build_value_from_host(&mut self, id: &str, hv: &HostValue) -> Option<ValueId> {
        if let Some(&cached) = self.extern_values.get(id) {
            return Some(cached);
        }
        if is_reserved(id) {
            return None;
        }
        let value = match &hv.ty {
            HostType::Function(f) => {
                // callables become a function-typed constant
                let ty = self.derive_function_type(f, 0);
                let mut node = Node::new(NodeKind::Const {
                    value: ConstValue::Func(id.to_string()),
                });
                node.types = vec![ty];
                node.is_extern = true;
                self.alloc_value(node, None)
            }
            other => {
                // everything else is an extern parameter-like leaf
                let ty = self.derive_host_type(other, 0);
                let mut node = Node::new(NodeKind::Parameter {
                    is_free_value: false,
                });
                node.variable = Some(id.to_string());
                node.is_extern = true;
                node.types = vec![ty];
                self.alloc_value(node, None)
            }
        };
        self.extern_values.insert(id.to_string(), value);
        trace!(id, "extern value bridged");
        Some(value)
    }

    /// Structural derivation of a host type into the type store
    pub fn derive_host_type(&mut self, ty: &HostType, level: usize) -> TypeId {
        if level >= MAX_TYPE_LEVEL {
            // beyond the bound everything collapses to opaque
            return self.types.object(None);
        }
        let level = level + 1;

        let mut name = ty.canonical_name();
        if name == "[]uint8" {
            name = "bytes".to_string();
        }
        if let Some(&cached) = self.extern_types.get(&name) {
            return cached;
        }
        if let Some(basic) = self.types.lookup_basic(&name) {
            return basic;
        }

        let derived = match ty {
            HostType::Bool => self.types.boolean(),
            HostType::Int | HostType::Uint8 | HostType::Float => self.types.number(),
            HostType::String => self.types.string(),
            HostType::Bytes => self.types.bytes(),
            HostType::Slice(elem) => {
                let elem = self.derive_host_type(elem, level);
                self.types.slice_of(elem)
            }
            HostType::Map(key, value) => {
                let key = self.derive_host_type(key, level);
                let value = self.derive_host_type(value, level);
                self.types.map_of(key, value)
            }
            HostType::Struct(s) => {
                let placeholder = self.types.struct_placeholder(&s.name);
                // register before recursing so self-references terminate
                self.extern_types.insert(name.clone(), placeholder);
                self.types.register_named(&s.name, placeholder);
                for field in &s.fields {
                    let field_ty = self.derive_host_type(&field.ty, level);
                    self.types.add_field(placeholder, &field.name, field_ty);
                    if field.embedded
                        && matches!(
                            self.types.get(field_ty).kind,
                            TypeKind::Struct { .. } | TypeKind::Object
                        )
                    {
                        self.types.add_anonymous_field(placeholder, field_ty);
                    }
                }
                let methods = self.derive_method_set(&s.methods, &s.ptr_methods, None, level);
                self.types.set_methods(placeholder, methods);
                placeholder
            }
            HostType::Function(f) => self.derive_function_type(f, level),
            // pointer indirection is erased in the IR type
            HostType::Pointer(elem) => return self.derive_host_type(elem, level),
            HostType::RawHandle(handle) => self.types.object(Some(handle.clone())),
            HostType::Interface(i) => {
                let iface = self.types.interface(&i.name);
                self.extern_types.insert(name.clone(), iface);
                self.types.register_named(&i.name, iface);
                let methods = self.derive_method_set(&i.methods, &[], Some(iface), level);
                self.types.set_methods(iface, methods);
                iface
            }
            HostType::Chan(elem) => {
                let elem = self.derive_host_type(elem, level);
                self.types.chan_of(elem)
            }
            HostType::Ref(target) => match self.host.types.get(target).cloned() {
                Some(resolved) => self.derive_host_type(&resolved, level),
                // unknown reference: opaque fallback, not fatal
                None => self.types.object(Some(target.clone())),
            },
            HostType::Alias { name: alias, base } => {
                let base = self.derive_host_type(base, level);
                self.types.alias(alias.clone(), base)
            }
        };

        self.extern_types.insert(name, derived);
        derived
    }

    /// Method sets of the value type and its pointer-equivalent merged;
    /// pointer methods override on name conflict. For interfaces the
    /// receiver is implicitly prepended as the first parameter.
    fn derive_method_set(
        &mut self,
        methods: &[HostFunction],
        ptr_methods: &[HostFunction],
        receiver: Option<TypeId>,
        level: usize,
    ) -> FxHashMap<String, TypeId> {
        let mut out = FxHashMap::default();
        for m in methods.iter().chain(ptr_methods.iter()) {
            let func_ty = self.derive_function_type(m, level);
            if let Some(receiver) = receiver {
                if let TypeKind::Function { params, .. } = &mut self.types.get_mut(func_ty).kind {
                    params.insert(0, receiver);
                }
            }
            out.insert(m.name.clone(), func_ty);
        }
        out
    }

    pub(crate) fn derive_function_type(&mut self, f: &HostFunction, level: usize) -> TypeId {
        let params: Vec<TypeId> = f
            .params
            .iter()
            .map(|p| self.derive_host_type(p, level))
            .collect();
        let returns: Vec<TypeId> = f
            .returns
            .iter()
            .map(|r| self.derive_host_type(r, level))
            .collect();
        if f.variadic {
            // the final parameter is a variadic aggregate; only sequence
            // kinds accept the mark
            if let Some(&last) = params.last() {
                if matches!(
                    self.types.get(last).kind,
                    TypeKind::Slice { .. } | TypeKind::Object
                ) {
                    self.types.get_mut(last).variadic_param = true;
                }
            }
        }
        self.types
            .function(f.name.clone(), params, returns, f.variadic)
    }
}

/// Normalized edit-distance similarity in [0, 1]
fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ssa::domain::Program;
    use crate::features::ssa::ports::{HostEnv, HostStruct};

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("split", "split"), 0);
    }

    #[test]
    fn test_similarity_prefers_closest() {
        assert!(similarity("Splt", "Split") > similarity("Splt", "Join"));
        assert!((similarity("x", "x") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_extern_value_is_cached_per_identifier() {
        let env = HostEnv::new().with_value("timeout", HostValue::new(HostType::Int));
        let mut program = Program::new();
        program.build(env, |b| {
            let first = b.try_build_extern_value("timeout");
            let second = b.try_build_extern_value("timeout");
            assert!(first.is_some());
            // deterministic and cached: the identical instance comes back
            assert_eq!(first, second);
        });
    }

    #[test]
    fn test_reserved_markers_are_rejected() {
        let env = HostEnv::new()
            .with_value("$internal", HostValue::new(HostType::Int))
            .with_value("_hidden", HostValue::new(HostType::Int));
        let mut program = Program::new();
        program.build(env, |b| {
            assert_eq!(b.try_build_extern_value("$internal"), None);
            assert_eq!(b.try_build_extern_value("_hidden"), None);
        });
    }

    #[test]
    fn test_callable_becomes_function_typed_const() {
        let env = HostEnv::new().with_value(
            "println",
            HostValue::function(
                HostFunction::new("println")
                    .param(HostType::String)
                    .variadic(),
            ),
        );
        let mut program = Program::new();
        let mut value = None;
        program.build(env, |b| {
            value = b.try_build_extern_value("println");
        });
        let node = program.nodes.get(value.unwrap()).unwrap();
        assert!(node.is_extern);
        assert!(matches!(
            node.kind,
            NodeKind::Const {
                value: ConstValue::Func(_)
            }
        ));
    }

    #[test]
    fn test_lib_member_bridged_lazily() {
        let env = HostEnv::new().with_lib_member(
            "str",
            "Join",
            HostValue::function(HostFunction::new("Join")),
        );
        let mut program = Program::new();
        program.build(env, |b| {
            let lib = b.try_build_extern_value("str");
            assert!(lib.is_some());
            let member = b.build_extern_lib_member("str", "Join");
            assert!(member.is_some());
            assert_eq!(member, b.build_extern_lib_member("str", "Join"));
            assert_eq!(b.build_extern_lib_member("str", "Missing"), None);
        });
    }

    #[test]
    fn test_suggest_lib_key() {
        let env = HostEnv::new()
            .with_lib_member("str", "Join", HostValue::new(HostType::Int))
            .with_lib_member("str", "Split", HostValue::new(HostType::Int));
        let mut program = Program::new();
        program.build(env, |b| {
            assert_eq!(b.suggest_lib_key("str", "Splt"), Some("Split".to_string()));
            assert_eq!(b.suggest_lib_key("net", "Splt"), None);
        });
    }

    // a record whose field points back at itself must terminate
    #[test]
    fn test_self_referential_struct_terminates() {
        let node_ty = HostType::Struct(
            HostStruct::new("node")
                .field("value", HostType::Int)
                .field("next", HostType::Pointer(Box::new(HostType::Ref("node".into())))),
        );
        let env = HostEnv::new()
            .with_type("node", node_ty)
            .with_value("root", HostValue::new(HostType::Ref("node".into())));
        let mut program = Program::new();
        program.build(env, |b| {
            let root = b.try_build_extern_value("root").unwrap();
            let ty = b.program().nodes.get(root).unwrap().types[0];
            // pointer indirection erased: the field is the struct itself
            assert_eq!(b.types.field_type(ty, "next"), Some(ty));
            assert_eq!(b.types.field_type(ty, "value"), Some(b.types.number()));
            // second derivation hits the cache
            let again = b.derive_host_type(&HostType::Ref("node".into()), 0);
            assert_eq!(again, ty);
        });
    }

    #[test]
    fn test_depth_bound_collapses_to_opaque() {
        let mut deep = HostType::Int;
        for _ in 0..(MAX_TYPE_LEVEL + 5) {
            deep = HostType::Slice(Box::new(deep));
        }
        let env = HostEnv::new();
        let mut program = Program::new();
        program.build(env, |b| {
            let ty = b.derive_host_type(&deep, 0);
            // walk down the slice spine; it must bottom out in an opaque
            // object before the host nesting is exhausted
            let mut current = ty;
            let mut depth = 0;
            loop {
                match b.types.get(current).kind {
                    crate::features::type_system::TypeKind::Slice { elem } => {
                        current = elem;
                        depth += 1;
                    }
                    crate::features::type_system::TypeKind::Object => break,
                    ref other => panic!("unexpected kind {:?}", other),
                }
                assert!(depth <= MAX_TYPE_LEVEL);
            }
        });
    }

    #[test]
    fn test_pointer_methods_override_value_methods() {
        let conn = HostType::Struct(
            HostStruct::new("conn")
                .field("addr", HostType::String)
                .method(HostFunction::new("Close"))
                .method(HostFunction::new("Read").ret(HostType::Bytes))
                .ptr_method(HostFunction::new("Read").ret(HostType::Int)),
        );
        let env = HostEnv::new().with_value("conn", HostValue::new(conn));
        let mut program = Program::new();
        program.build(env, |b| {
            let v = b.try_build_extern_value("conn").unwrap();
            let ty = b.program().nodes.get(v).unwrap().types[0];
            let read = b.types.method(ty, "Read").unwrap();
            let crate::features::type_system::TypeKind::Function { returns, .. } =
                &b.types.get(read).kind
            else {
                panic!("expected function type");
            };
            // the pointer receiver's signature won
            assert_eq!(returns, &vec![b.types.number()]);
            assert!(b.types.method(ty, "Close").is_some());
        });
    }

    #[test]
    fn test_interface_methods_get_receiver_prepended() {
        let closer = HostType::Interface(
            crate::features::ssa::ports::HostInterface::new("closer")
                .method(HostFunction::new("Close").ret(HostType::Bool)),
        );
        let env = HostEnv::new().with_value("c", HostValue::new(closer));
        let mut program = Program::new();
        program.build(env, |b| {
            let v = b.try_build_extern_value("c").unwrap();
            let ty = b.program().nodes.get(v).unwrap().types[0];
            let close = b.types.method(ty, "Close").unwrap();
            let crate::features::type_system::TypeKind::Function { params, .. } =
                &b.types.get(close).kind
            else {
                panic!("expected function type");
            };
            assert_eq!(params.first(), Some(&ty));
        });
    }

    #[test]
    fn test_byte_slice_normalizes_to_bytes() {
        let env = HostEnv::new();
        let mut program = Program::new();
        program.build(env, |b| {
            let ty = b.derive_host_type(&HostType::Slice(Box::new(HostType::Uint8)), 0);
            assert_eq!(ty, b.types.bytes());
        });
    }
}
