//! Call construction and closure wiring
//!
//! A call is recorded against the current block with its target and
//! arguments and no captured bindings. The binding step runs later,
//! explicitly, once the callee's free-variable and mutation sets are
//! known:
//!
//! - *free-value capture*: each name the callee captures is resolved to
//!   its reaching definition in the caller at the call site; failing
//!   that, a free-value placeholder is materialized from an enclosing
//!   scope; failing both, the call gets a "binding not found" diagnostic
//!   and construction continues.
//! - *side-effect propagation*: each name the callee mutates gets a
//!   synthetic definition positioned immediately after the call, typed
//!   `any`, recorded as the new reaching definition and substituted for
//!   the pre-call value in existing users.

use tracing::trace;

use crate::features::ssa::domain::{Node, NodeKind, ValueId};
use crate::shared::models::{Diagnostic, DiagnosticTag};

use super::builder::ProgramBuilder;

/// Dispatch flags recorded on a call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallFlags {
    /// Asynchronous dispatch requested
    pub is_async: bool,
    /// Variadic unpack requested
    pub unpack: bool,
    /// Ellipsis-spread of the final argument
    pub is_ellipsis: bool,
    /// Drop-error behavior requested (`~` form)
    pub drop_error: bool,
}

impl ProgramBuilder<'_> {
    /// Record a call with no captured bindings yet
    pub fn emit_call(&mut self, target: ValueId, args: Vec<ValueId>, flags: CallFlags) -> ValueId {
        self.emit_node(Node::new(NodeKind::Call {
            target,
            args,
            binding: Vec::new(),
            is_async: flags.is_async,
            unpack: flags.unpack,
            is_ellipsis: flags.is_ellipsis,
            drop_error: flags.drop_error,
        }))
    }

    /// Attach closure behavior to an already-emitted call: capture the
    /// callee's free variables and propagate its known side effects.
    pub fn bind_closure(&mut self, call: ValueId, free_names: &[&str], side_effects: &[&str]) {
        for &name in free_names {
            let resolved = self.read_variable_before(name, call).or_else(|| {
                if self.can_build_free_value(name) {
                    Some(self.build_free_value(name))
                } else {
                    None
                }
            });
            match resolved {
                Some(value) => {
                    if let Some(node) = self.program.nodes.get_mut(call) {
                        if let NodeKind::Call { binding, .. } = &mut node.kind {
                            binding.push(value);
                        }
                    }
                    self.program.nodes.add_user(value, call);
                }
                None => {
                    let span = self
                        .program
                        .nodes
                        .get(call)
                        .and_then(|n| n.span);
                    if let Some(node) = self.program.nodes.get_mut(call) {
                        let mut diag = Diagnostic::error(
                            DiagnosticTag::Binding,
                            format!("binding not found: {}", name),
                        );
                        if let Some(span) = span {
                            diag = diag.with_span(span);
                        }
                        node.diags.push(diag);
                    }
                }
            }
        }

        for &name in side_effects {
            // no pre-call definition: nothing to propagate
            let Some(pre) = self.read_variable_before(name, call) else {
                continue;
            };
            let effect = self.emit_side_effect_after(call, name);
            let site = {
                let node = self.program.nodes.get(call);
                node.and_then(|n| n.func).zip(node.and_then(|n| n.block))
            };
            if let Some((func, block)) = site {
                self.write_variable_at(func, block, name.to_string(), effect);
            }
            // substitute the post-call value for the pre-call one in
            // existing users; the call and the effect itself keep reading
            // the pre-call state
            self.program
                .nodes
                .replace_all_uses_except(pre, effect, &[call, effect]);
            trace!(variable = name, call = %call, "side effect propagated");
        }
    }

    /// Synthesize the post-call definition, positioned immediately after
    /// the call in its block
    fn emit_side_effect_after(&mut self, call: ValueId, name: &str) -> ValueId {
        let (func, block, span) = {
            let node = self.program.nodes.get(call);
            (
                node.and_then(|n| n.func),
                node.and_then(|n| n.block),
                node.and_then(|n| n.span),
            )
        };
        let mut node = Node::new(NodeKind::SideEffect { call });
        node.func = func;
        node.block = block;
        node.span = span;
        node.variable = Some(name.to_string());
        node.types = vec![self.types.any()];
        let effect = self.program.nodes.alloc(node);
        self.program.nodes.add_user(call, effect);
        if let Some(block) = block {
            let insts = &mut self.program.block_mut(block).insts;
            match insts.iter().position(|&i| i == call) {
                Some(pos) => insts.insert(pos + 1, effect),
                None => insts.push(effect),
            }
        }
        effect
    }
}
